//! The denoiser orchestrator.
//!
//! [`Denoiser`] builds every GPU object the compute pass needs for one
//! swapchain configuration, replays the pre-recorded command buffer on each
//! [`submit`](Denoiser::submit), and rebuilds everything when the swapchain
//! changes.
//!
//! # Lifecycle
//!
//! ```text
//! new ──> Built ──submit──> InFlight ──signal_consumed──> Built
//!           │                  │
//!           └──── rebuild ─────┴──> Built   (Destroyed if the rebuild fails)
//!           └──── destroy / drop ──────────> Destroyed
//! ```

use std::sync::Arc;

use crate::backend::{ComputeBackend, QueueKind, SemaphoreHandle, Submission};
use crate::command::{CommandRecorder, CommandScript};
use crate::config::DenoiserParameters;
use crate::descriptor::DescriptorSetPool;
use crate::error::{DenoiseError, DenoiseResult};
use crate::external::{DenoiserInputs, SwapchainInfo};
use crate::output::{OutputImage, output_descriptor};
use crate::pipeline::{ComputePipeline, ComputeStage};
use crate::profile_scope;
use crate::resources::{ImageId, ResourceArena};
use crate::sync::{SemaphoreWait, SignalSemaphore};
use crate::types::ImageSlot;

/// Externally observable state of a [`Denoiser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenoiserState {
    /// All objects exist and the signal semaphore is free.
    Built,
    /// A submission signalled the semaphore and the signal was not consumed yet.
    InFlight,
    /// Objects were torn down, or a rebuild failed.
    Destroyed,
}

/// Everything built for one swapchain configuration.
///
/// Fields are filled in build order so a failed build can be unwound by
/// [`FrameResources::teardown`].
#[derive(Debug, Default)]
struct FrameResources {
    arena: ResourceArena,
    output: Option<ImageId>,
    pipeline: Option<ComputePipeline>,
    descriptors: Option<DescriptorSetPool>,
    recorder: Option<CommandRecorder>,
    signal: Option<SignalSemaphore>,
}

impl FrameResources {
    fn build(
        backend: &dyn ComputeBackend,
        swapchain: &SwapchainInfo,
        inputs: &DenoiserInputs,
        params: &DenoiserParameters,
    ) -> DenoiseResult<Self> {
        profile_scope!("denoiser_build");

        let mut frame = Self::default();
        match frame.populate(backend, swapchain, inputs, params) {
            Ok(()) => Ok(frame),
            Err(e) => {
                log::error!("Failed to build denoiser resources: {}", e);
                frame.teardown(backend);
                Err(e)
            }
        }
    }

    fn populate(
        &mut self,
        backend: &dyn ComputeBackend,
        swapchain: &SwapchainInfo,
        inputs: &DenoiserInputs,
        params: &DenoiserParameters,
    ) -> DenoiseResult<()> {
        let color = self.arena.register_external("color", &inputs.color);
        let normals = self.arena.register_external("normals", &inputs.normals);
        let positions = self.arena.register_external("positions", &inputs.positions);

        let output = self
            .arena
            .create_image(backend, &output_descriptor(&params.label, swapchain))?;
        self.output = Some(output);

        let views = [
            (ImageSlot::Color.binding(), self.view(color)?),
            (ImageSlot::Output.binding(), self.view(output)?),
            (ImageSlot::Normals.binding(), self.view(normals)?),
            (ImageSlot::Positions.binding(), self.view(positions)?),
        ];

        let stage = ComputeStage::new(
            &params.shader,
            &params.entry_point,
            params.workgroup_size.as_array(),
        )
        .with_label(&params.label);
        let pipeline = self.pipeline.insert(ComputePipeline::build(
            backend,
            &ImageSlot::bindings(),
            &[stage],
        )?);

        let descriptors = self.descriptors.insert(DescriptorSetPool::allocate_and_bind(
            backend,
            pipeline,
            &views,
            swapchain.image_count,
        )?);
        let set = descriptors
            .get(params.descriptor_set_index)
            .ok_or_else(|| {
                DenoiseError::InvalidParameter(format!(
                    "descriptor set index {} out of range",
                    params.descriptor_set_index
                ))
            })?;

        let groups = params
            .workgroup_size
            .dispatch_for(swapchain.extent, params.rounding);
        self.recorder = Some(CommandRecorder::record(
            backend,
            &mut self.arena,
            &[output, color, positions, normals],
            pipeline,
            set,
            groups,
            params.upstream_wait_stage,
        )?);

        self.signal = Some(SignalSemaphore::new(backend)?);
        Ok(())
    }

    fn view(&self, id: ImageId) -> DenoiseResult<crate::backend::ImageViewHandle> {
        self.arena
            .get(id)
            .map(|image| image.view())
            .ok_or_else(|| DenoiseError::InvalidParameter(format!("unknown image {:?}", id)))
    }

    /// Destroy everything in dependency order.
    ///
    /// The caller must ensure the compute and graphics queues are idle.
    fn teardown(&mut self, backend: &dyn ComputeBackend) {
        if let Some(mut recorder) = self.recorder.take() {
            recorder.destroy(backend);
        }
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.destroy(backend);
        }
        if let Some(mut descriptors) = self.descriptors.take() {
            descriptors.destroy(backend);
        }
        if let Some(mut signal) = self.signal.take() {
            signal.destroy(backend);
        }
        self.output = None;
        self.arena.release(backend);
    }
}

/// Compute-pass orchestrator for the denoiser shader.
pub struct Denoiser {
    backend: Arc<dyn ComputeBackend>,
    params: DenoiserParameters,
    swapchain: SwapchainInfo,
    inputs: DenoiserInputs,
    frame: Option<FrameResources>,
}

impl Denoiser {
    /// Build the output image, pipeline object, descriptor sets, command
    /// buffer and signal semaphore for `swapchain`.
    ///
    /// Blocks until the compute queue is idle before recording. On failure
    /// everything created so far is destroyed.
    pub fn new(
        backend: Arc<dyn ComputeBackend>,
        swapchain: SwapchainInfo,
        inputs: DenoiserInputs,
        params: DenoiserParameters,
    ) -> DenoiseResult<Self> {
        swapchain.validate()?;
        params.validate(swapchain.image_count)?;
        inputs.check_extent(swapchain.extent);

        let frame = FrameResources::build(backend.as_ref(), &swapchain, &inputs, &params)?;
        log::info!(
            "Denoiser '{}' built on {} backend: {} {:?}, {} swapchain image(s)",
            params.label,
            backend.name(),
            swapchain.extent,
            swapchain.format,
            swapchain.image_count
        );

        Ok(Self {
            backend,
            params,
            swapchain,
            inputs,
            frame: Some(frame),
        })
    }

    /// Enqueue the pre-recorded command buffer on the compute queue.
    ///
    /// The queue waits on `upstream` (normally the ray-tracing pass's
    /// completion semaphore) before the dispatch and signals
    /// [`signal_semaphore`](Self::signal_semaphore) after it. Does not block.
    pub fn submit(&mut self, upstream: Option<SemaphoreWait>) -> DenoiseResult<()> {
        profile_scope!("denoiser_submit");

        let frame = self.frame.as_mut().ok_or(DenoiseError::Destroyed)?;
        let (Some(recorder), Some(signal)) = (frame.recorder.as_ref(), frame.signal.as_mut())
        else {
            return Err(DenoiseError::Destroyed);
        };
        signal.ensure_ready()?;
        if let (Some(wait), Some(src_stage)) = (upstream, recorder.script().barrier_src_stage())
            && !wait.chains_into(src_stage)
        {
            return Err(DenoiseError::InvalidParameter(format!(
                "upstream wait at {:?} is not ordered before the recorded barriers ({:?})",
                wait.stage, src_stage
            )));
        }

        let submission = Submission {
            command_buffer: recorder.command_buffer(),
            wait: upstream,
            signal: signal.handle(),
        };
        self.backend.submit(QueueKind::Compute, &submission)?;
        signal.mark_signaled();

        log::trace!(
            "Submitted denoiser command buffer {:?} (wait {:?}, signal {:?})",
            submission.command_buffer,
            upstream.map(|w| w.semaphore),
            submission.signal
        );
        Ok(())
    }

    /// Acknowledge that the frame driver enqueued a wait on the signal semaphore.
    ///
    /// Returns false if no signal was pending.
    pub fn signal_consumed(&mut self) -> bool {
        self.frame
            .as_mut()
            .and_then(|frame| frame.signal.as_mut())
            .is_some_and(SignalSemaphore::consume)
    }

    /// Semaphore signalled after each dispatch.
    pub fn signal_semaphore(&self) -> DenoiseResult<SemaphoreHandle> {
        self.frame
            .as_ref()
            .and_then(|frame| frame.signal.as_ref())
            .map(SignalSemaphore::handle)
            .ok_or(DenoiseError::Destroyed)
    }

    /// The denoised output image.
    ///
    /// Its contents are valid only once the signal semaphore has been waited on.
    pub fn output_image(&self) -> DenoiseResult<OutputImage> {
        let frame = self.frame.as_ref().ok_or(DenoiseError::Destroyed)?;
        frame
            .output
            .and_then(|id| frame.arena.get(id))
            .map(OutputImage::from)
            .ok_or(DenoiseError::Destroyed)
    }

    /// Idle the compute and graphics queues, destroy every owned object and build again.
    ///
    /// If building fails the denoiser is left destroyed.
    pub fn rebuild(&mut self, swapchain: SwapchainInfo, inputs: DenoiserInputs) -> DenoiseResult<()> {
        profile_scope!("denoiser_rebuild");

        swapchain.validate()?;
        self.params.validate(swapchain.image_count)?;
        self.wait_queues_idle()?;

        if let Some(mut frame) = self.frame.take() {
            frame.teardown(self.backend.as_ref());
        }
        self.swapchain = swapchain;
        self.inputs = inputs;
        inputs.check_extent(swapchain.extent);

        let frame = FrameResources::build(self.backend.as_ref(), &swapchain, &inputs, &self.params)?;
        self.frame = Some(frame);
        log::info!(
            "Denoiser '{}' rebuilt: {} {:?}, {} swapchain image(s)",
            self.params.label,
            swapchain.extent,
            swapchain.format,
            swapchain.image_count
        );
        Ok(())
    }

    /// Idle the compute and graphics queues and destroy every owned object.
    ///
    /// Called automatically on drop. Calling it twice is a no-op.
    pub fn destroy(&mut self) {
        let Some(mut frame) = self.frame.take() else {
            return;
        };
        if let Err(e) = self.wait_queues_idle() {
            log::error!("Failed to idle queues before denoiser teardown: {}", e);
        }
        frame.teardown(self.backend.as_ref());
        log::info!("Denoiser '{}' destroyed", self.params.label);
    }

    /// Wait for the compute queue and the graphics queue that consumes the
    /// output and the signal semaphore.
    fn wait_queues_idle(&self) -> DenoiseResult<()> {
        self.backend.queue_wait_idle(QueueKind::Compute)?;
        self.backend.queue_wait_idle(QueueKind::Graphics)
    }

    pub fn state(&self) -> DenoiserState {
        match self.frame.as_ref().and_then(|frame| frame.signal.as_ref()) {
            None => DenoiserState::Destroyed,
            Some(signal) if signal.is_pending() => DenoiserState::InFlight,
            Some(_) => DenoiserState::Built,
        }
    }

    /// Number of descriptor sets, one per swapchain image.
    pub fn descriptor_set_count(&self) -> usize {
        self.frame
            .as_ref()
            .and_then(|frame| frame.descriptors.as_ref())
            .map_or(0, DescriptorSetPool::len)
    }

    /// The commands recorded into the command buffer.
    pub fn command_script(&self) -> Option<&CommandScript> {
        self.frame
            .as_ref()
            .and_then(|frame| frame.recorder.as_ref())
            .map(CommandRecorder::script)
    }

    pub fn swapchain(&self) -> &SwapchainInfo {
        &self.swapchain
    }

    pub fn inputs(&self) -> &DenoiserInputs {
        &self.inputs
    }

    pub fn params(&self) -> &DenoiserParameters {
        &self.params
    }

    pub fn backend(&self) -> &Arc<dyn ComputeBackend> {
        &self.backend
    }
}

impl std::fmt::Debug for Denoiser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Denoiser")
            .field("backend", &self.backend.name())
            .field("label", &self.params.label)
            .field("swapchain", &self.swapchain)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Denoiser {
    fn drop(&mut self) {
        self.destroy();
    }
}
