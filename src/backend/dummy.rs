//! Dummy GPU backend for testing and development.
//!
//! This backend performs no GPU work but simulates enough of a device to
//! check how the denoiser drives it. It tracks every live handle, replays
//! recorded scripts on submit (image layouts, bound objects, the pixel
//! region each dispatch writes), tracks binary semaphore state and reports
//! validation-style messages for misuse: layout mismatches, incompatible
//! descriptor sets, double destroys, double signals, waits that could never
//! complete and waits the recorded barriers are not ordered after.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::command::{CommandScript, ComputeCommand};
use crate::error::{DenoiseError, DenoiseResult};
use crate::shader::SPIRV_MAGIC;
use crate::types::{DescriptorBinding, DescriptorKind, Extent2d, ImageDescriptor, ImageLayout};

use super::{
    CommandBufferHandle, CommandPoolHandle, ComputeBackend, ComputePipelineDescriptor,
    CreatedImage, DescriptorImageWrite, DescriptorPoolHandle, DescriptorPoolSize,
    DescriptorSetHandle, DescriptorSetLayoutHandle, ImageHandle, ImageViewHandle, PipelineHandle,
    PipelineLayoutHandle, QueueKind, SemaphoreHandle, ShaderModuleHandle, Submission,
};

/// Kind of object the dummy backend tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Image,
    ImageView,
    ShaderModule,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    DescriptorPool,
    DescriptorSet,
    CommandPool,
    CommandBuffer,
    Semaphore,
}

#[derive(Debug)]
struct SimImage {
    label: Option<String>,
    extent: Extent2d,
    layout: ImageLayout,
    /// Region written by the last dispatch that bound the image writable.
    written: Option<Extent2d>,
}

#[derive(Debug)]
struct SimPipeline {
    layout: u64,
    workgroup_size: [u32; 3],
}

#[derive(Debug)]
struct SimDescriptorPool {
    max_sets: u32,
    remaining: Vec<DescriptorPoolSize>,
    sets: Vec<u64>,
}

#[derive(Debug)]
struct SimDescriptorSet {
    layout: u64,
    /// Binding slot to (view, expected layout).
    writes: BTreeMap<u32, (u64, ImageLayout)>,
}

#[derive(Debug, Default)]
struct DummyState {
    next_id: u64,
    live: HashMap<u64, ObjectKind>,
    images: HashMap<u64, SimImage>,
    /// View to the image it was created for.
    views: HashMap<u64, u64>,
    set_layouts: HashMap<u64, Vec<DescriptorBinding>>,
    pipeline_layouts: HashMap<u64, Vec<u64>>,
    pipelines: HashMap<u64, SimPipeline>,
    descriptor_pools: HashMap<u64, SimDescriptorPool>,
    descriptor_sets: HashMap<u64, SimDescriptorSet>,
    command_pools: HashMap<u64, Vec<u64>>,
    command_buffers: HashMap<u64, Option<CommandScript>>,
    /// Semaphore to "has a pending signal".
    semaphores: HashMap<u64, bool>,
    destroyed: Vec<(ObjectKind, u64)>,
    messages: Vec<String>,
    fail_next: Vec<ObjectKind>,
    /// Queues idled, in call order.
    idled: Vec<QueueKind>,
    submissions: usize,
}

impl DummyState {
    fn report(&mut self, message: String) {
        log::warn!("DummyBackend validation: {}", message);
        self.messages.push(message);
    }

    fn take_injected_failure(&mut self, kind: ObjectKind) -> bool {
        match self.fail_next.iter().position(|k| *k == kind) {
            Some(index) => {
                self.fail_next.remove(index);
                true
            }
            None => false,
        }
    }

    fn create(&mut self, kind: ObjectKind) -> DenoiseResult<u64> {
        if self.take_injected_failure(kind) {
            log::debug!("DummyBackend: injected failure creating {:?}", kind);
            return Err(DenoiseError::ResourceCreationFailed(format!(
                "injected failure creating {:?}",
                kind
            )));
        }
        self.next_id += 1;
        let id = self.next_id;
        self.live.insert(id, kind);
        log::trace!("DummyBackend: created {:?} {}", kind, id);
        Ok(id)
    }

    fn is_live(&self, id: u64, kind: ObjectKind) -> bool {
        self.live.get(&id) == Some(&kind)
    }

    /// Release an object destroyed explicitly by the caller.
    fn destroy(&mut self, kind: ObjectKind, id: u64) -> bool {
        if self.is_live(id, kind) {
            self.live.remove(&id);
            self.destroyed.push((kind, id));
            log::trace!("DummyBackend: destroyed {:?} {}", kind, id);
            true
        } else {
            self.report(format!(
                "destroy of unknown or already destroyed {:?} {}",
                kind, id
            ));
            false
        }
    }

    /// Release an object freed implicitly with its parent.
    fn free_child(&mut self, id: u64) {
        self.live.remove(&id);
    }

    fn execute(&mut self, script: &CommandScript) {
        let mut bound_pipeline: Option<u64> = None;
        let mut bound_set: Option<u64> = None;

        for command in script {
            match command {
                ComputeCommand::PipelineBarrier { image_barriers, .. } => {
                    for barrier in image_barriers {
                        let raw = barrier.image.raw();
                        let Some(image) = self.images.get_mut(&raw) else {
                            self.report(format!("barrier references destroyed image {}", raw));
                            continue;
                        };
                        let current = image.layout;
                        image.layout = barrier.new_layout;
                        if barrier.old_layout != ImageLayout::Undefined
                            && barrier.old_layout != current
                        {
                            self.report(format!(
                                "layout mismatch: barrier on image {} expects {:?} but the image is in {:?}",
                                raw, barrier.old_layout, current
                            ));
                        }
                    }
                }
                ComputeCommand::BindPipeline(pipeline) => {
                    if self.pipelines.contains_key(&pipeline.raw()) {
                        bound_pipeline = Some(pipeline.raw());
                    } else {
                        self.report(format!("bind of destroyed pipeline {}", pipeline.raw()));
                    }
                }
                ComputeCommand::BindDescriptorSet { layout, set } => {
                    let Some(set_layout) =
                        self.descriptor_sets.get(&set.raw()).map(|s| s.layout)
                    else {
                        self.report(format!("bind of freed descriptor set {}", set.raw()));
                        continue;
                    };
                    let compatible = self
                        .pipeline_layouts
                        .get(&layout.raw())
                        .is_some_and(|layouts| layouts.first() == Some(&set_layout));
                    if !compatible {
                        self.report(format!(
                            "descriptor set {} is incompatible with pipeline layout {}",
                            set.raw(),
                            layout.raw()
                        ));
                    }
                    bound_set = Some(set.raw());
                }
                ComputeCommand::Dispatch { x, y, z } => {
                    self.dispatch(bound_pipeline, bound_set, [*x, *y, *z]);
                }
            }
        }
    }

    fn dispatch(&mut self, pipeline: Option<u64>, set: Option<u64>, groups: [u32; 3]) {
        let (Some(pipeline), Some(set)) = (pipeline, set) else {
            self.report("dispatch without a bound pipeline and descriptor set".to_string());
            return;
        };
        let Some((pipeline_layout, workgroup_size)) = self
            .pipelines
            .get(&pipeline)
            .map(|p| (p.layout, p.workgroup_size))
        else {
            return;
        };
        let Some(set_state) = self.descriptor_sets.get(&set) else {
            return;
        };
        let set_layout = set_state.layout;
        let writes: Vec<(u32, u64, ImageLayout)> = set_state
            .writes
            .iter()
            .map(|(&binding, &(view, layout))| (binding, view, layout))
            .collect();

        let pipeline_set_layout = self
            .pipeline_layouts
            .get(&pipeline_layout)
            .and_then(|layouts| layouts.first().copied());
        if pipeline_set_layout != Some(set_layout) {
            self.report(format!(
                "dispatch: descriptor set {} layout does not match pipeline {}",
                set, pipeline
            ));
        }

        let declared: Vec<(u32, bool)> = self
            .set_layouts
            .get(&set_layout)
            .map(|bindings| bindings.iter().map(|b| (b.binding, b.writable)).collect())
            .unwrap_or_default();
        for &(binding, _) in &declared {
            if !writes.iter().any(|(b, _, _)| *b == binding) {
                self.report(format!(
                    "dispatch: binding {} of descriptor set {} was never written",
                    binding, set
                ));
            }
        }

        for (binding, view, expected) in writes {
            let Some(image_raw) = self.views.get(&view).copied() else {
                self.report(format!(
                    "dispatch: binding {} references destroyed view {}",
                    binding, view
                ));
                continue;
            };
            let Some(image) = self.images.get_mut(&image_raw) else {
                continue;
            };
            let actual = image.layout;
            if declared.contains(&(binding, true)) {
                let written = Extent2d::new(
                    groups[0].saturating_mul(workgroup_size[0]),
                    groups[1].saturating_mul(workgroup_size[1]),
                )
                .min(image.extent);
                image.written = Some(written);
            }
            if actual != expected {
                let label = image.label.clone();
                self.report(format!(
                    "layout mismatch: image {} ({:?}) at binding {} is in {:?} but the descriptor expects {:?}",
                    image_raw, label, binding, actual, expected
                ));
            }
        }
    }
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next creation of `kind` fail.
    ///
    /// For `DescriptorSet` the failure is reported as pool exhaustion.
    pub fn fail_next(&self, kind: ObjectKind) {
        self.state.lock().fail_next.push(kind);
    }

    /// Number of live objects of all kinds.
    pub fn live_object_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Number of live objects of one kind.
    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.state
            .lock()
            .live
            .values()
            .filter(|k| **k == kind)
            .count()
    }

    /// Whether a raw handle refers to a live object.
    pub fn is_alive(&self, raw: u64) -> bool {
        self.state.lock().live.contains_key(&raw)
    }

    /// Explicitly destroyed objects, in destruction order.
    pub fn destruction_log(&self) -> Vec<(ObjectKind, u64)> {
        self.state.lock().destroyed.clone()
    }

    /// Validation messages reported so far.
    pub fn validation_messages(&self) -> Vec<String> {
        self.state.lock().messages.clone()
    }

    pub fn clear_validation_messages(&self) {
        self.state.lock().messages.clear();
    }

    /// Simulated layout of an image after the last executed submission.
    pub fn image_layout(&self, image: ImageHandle) -> Option<ImageLayout> {
        self.state.lock().images.get(&image.raw()).map(|i| i.layout)
    }

    /// Pretend another pass left `image` in `layout`.
    pub fn set_image_layout(&self, image: ImageHandle, layout: ImageLayout) {
        if let Some(sim) = self.state.lock().images.get_mut(&image.raw()) {
            sim.layout = layout;
        }
    }

    /// Pixel region written by the last dispatch that bound `image` writable.
    ///
    /// `None` if no dispatch has written the image.
    pub fn written_region(&self, image: ImageHandle) -> Option<Extent2d> {
        self.state
            .lock()
            .images
            .get(&image.raw())
            .and_then(|i| i.written)
    }

    /// Workgroup size a pipeline was specialized with.
    pub fn pipeline_workgroup_size(&self, pipeline: PipelineHandle) -> Option<[u32; 3]> {
        self.state
            .lock()
            .pipelines
            .get(&pipeline.raw())
            .map(|p| p.workgroup_size)
    }

    /// Views written into a descriptor set, by binding.
    pub fn descriptor_set_bindings(
        &self,
        set: DescriptorSetHandle,
    ) -> Option<Vec<(u32, ImageViewHandle)>> {
        self.state.lock().descriptor_sets.get(&set.raw()).map(|s| {
            s.writes
                .iter()
                .map(|(&binding, &(view, _))| (binding, ImageViewHandle::from_raw(view)))
                .collect()
        })
    }

    /// Whether a semaphore has a pending signal.
    pub fn semaphore_signaled(&self, semaphore: SemaphoreHandle) -> Option<bool> {
        self.state.lock().semaphores.get(&semaphore.raw()).copied()
    }

    /// Simulate another queue signalling `semaphore`.
    pub fn signal_semaphore(&self, semaphore: SemaphoreHandle) {
        let mut state = self.state.lock();
        match state.semaphores.get(&semaphore.raw()).copied() {
            None => state.report(format!("signal of unknown semaphore {}", semaphore.raw())),
            Some(true) => state.report(format!(
                "semaphore {} signalled while a previous signal is still pending",
                semaphore.raw()
            )),
            Some(false) => {
                state.semaphores.insert(semaphore.raw(), true);
            }
        }
    }

    /// Simulate another queue waiting on `semaphore`, consuming its signal.
    ///
    /// Returns false (and reports) if there was no pending signal.
    pub fn wait_semaphore(&self, semaphore: SemaphoreHandle) -> bool {
        let mut state = self.state.lock();
        consume_signal(&mut state, semaphore.raw())
    }

    /// Number of `queue_wait_idle` calls.
    pub fn queue_idle_count(&self) -> usize {
        self.state.lock().idled.len()
    }

    /// Queues passed to `queue_wait_idle`, in call order.
    pub fn idled_queues(&self) -> Vec<QueueKind> {
        self.state.lock().idled.clone()
    }

    /// Number of successful submissions.
    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions
    }
}

fn consume_signal(state: &mut DummyState, raw: u64) -> bool {
    match state.semaphores.get(&raw).copied() {
        Some(true) => {
            state.semaphores.insert(raw, false);
            true
        }
        Some(false) => {
            state.report(format!(
                "wait on semaphore {} that has no pending signal; the queue would never proceed",
                raw
            ));
            false
        }
        None => {
            state.report(format!("wait on unknown semaphore {}", raw));
            false
        }
    }
}

impl ComputeBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> DenoiseResult<CreatedImage> {
        let mut state = self.state.lock();
        let image = state.create(ObjectKind::Image)?;
        let view = match state.create(ObjectKind::ImageView) {
            Ok(view) => view,
            Err(e) => {
                state.free_child(image);
                return Err(e);
            }
        };
        log::trace!(
            "DummyBackend: creating image {:?} ({})",
            descriptor.label,
            descriptor.extent
        );
        state.images.insert(
            image,
            SimImage {
                label: descriptor.label.clone(),
                extent: descriptor.extent,
                layout: ImageLayout::Undefined,
                written: None,
            },
        );
        state.views.insert(view, image);
        Ok(CreatedImage {
            image: ImageHandle::from_raw(image),
            view: ImageViewHandle::from_raw(view),
        })
    }

    fn destroy_image(&self, image: CreatedImage) {
        let mut state = self.state.lock();
        if state.views.get(&image.view.raw()) != Some(&image.image.raw()) {
            state.report(format!(
                "view {} does not belong to image {}",
                image.view.raw(),
                image.image.raw()
            ));
        }
        if state.destroy(ObjectKind::ImageView, image.view.raw()) {
            state.views.remove(&image.view.raw());
        }
        if state.destroy(ObjectKind::Image, image.image.raw()) {
            state.images.remove(&image.image.raw());
        }
    }

    fn create_shader_module(&self, code: &[u32]) -> DenoiseResult<ShaderModuleHandle> {
        if code.first() != Some(&SPIRV_MAGIC) {
            return Err(DenoiseError::ShaderCompilationFailed(
                "module does not start with the SPIR-V magic number".to_string(),
            ));
        }
        let id = self.state.lock().create(ObjectKind::ShaderModule)?;
        Ok(ShaderModuleHandle::from_raw(id))
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        self.state
            .lock()
            .destroy(ObjectKind::ShaderModule, module.raw());
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> DenoiseResult<DescriptorSetLayoutHandle> {
        let mut state = self.state.lock();
        let id = state.create(ObjectKind::DescriptorSetLayout)?;
        state.set_layouts.insert(id, bindings.to_vec());
        Ok(DescriptorSetLayoutHandle::from_raw(id))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        let mut state = self.state.lock();
        let raw = layout.raw();
        let referenced = state
            .pipeline_layouts
            .values()
            .any(|layouts| layouts.contains(&raw));
        if referenced {
            state.report(format!(
                "descriptor-set layout {} destroyed while a pipeline layout still uses it",
                raw
            ));
        }
        if state.destroy(ObjectKind::DescriptorSetLayout, raw) {
            state.set_layouts.remove(&raw);
        }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
    ) -> DenoiseResult<PipelineLayoutHandle> {
        let mut state = self.state.lock();
        let raws: Vec<u64> = set_layouts.iter().map(|l| l.raw()).collect();
        if let Some(missing) = raws
            .iter()
            .find(|raw| !state.is_live(**raw, ObjectKind::DescriptorSetLayout))
        {
            return Err(DenoiseError::InvalidParameter(format!(
                "unknown descriptor-set layout {}",
                missing
            )));
        }
        let id = state.create(ObjectKind::PipelineLayout)?;
        state.pipeline_layouts.insert(id, raws);
        Ok(PipelineLayoutHandle::from_raw(id))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        let mut state = self.state.lock();
        let raw = layout.raw();
        if state.pipelines.values().any(|p| p.layout == raw) {
            state.report(format!(
                "pipeline layout {} destroyed while a pipeline still uses it",
                raw
            ));
        }
        if state.destroy(ObjectKind::PipelineLayout, raw) {
            state.pipeline_layouts.remove(&raw);
        }
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor<'_>,
    ) -> DenoiseResult<PipelineHandle> {
        let mut state = self.state.lock();
        if !state.is_live(descriptor.layout.raw(), ObjectKind::PipelineLayout) {
            return Err(DenoiseError::InvalidParameter(format!(
                "unknown pipeline layout {:?}",
                descriptor.layout
            )));
        }
        if !state.is_live(descriptor.module.raw(), ObjectKind::ShaderModule) {
            return Err(DenoiseError::InvalidParameter(format!(
                "unknown shader module {:?}",
                descriptor.module
            )));
        }
        let id = state.create(ObjectKind::Pipeline)?;
        state.pipelines.insert(
            id,
            SimPipeline {
                layout: descriptor.layout.raw(),
                workgroup_size: descriptor.workgroup_size,
            },
        );
        Ok(PipelineHandle::from_raw(id))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        let mut state = self.state.lock();
        if state.destroy(ObjectKind::Pipeline, pipeline.raw()) {
            state.pipelines.remove(&pipeline.raw());
        }
    }

    fn create_descriptor_pool(
        &self,
        sizes: &[DescriptorPoolSize],
        max_sets: u32,
    ) -> DenoiseResult<DescriptorPoolHandle> {
        let mut state = self.state.lock();
        let id = state.create(ObjectKind::DescriptorPool)?;
        state.descriptor_pools.insert(
            id,
            SimDescriptorPool {
                max_sets,
                remaining: sizes.to_vec(),
                sets: Vec::new(),
            },
        );
        Ok(DescriptorPoolHandle::from_raw(id))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        let mut state = self.state.lock();
        if !state.destroy(ObjectKind::DescriptorPool, pool.raw()) {
            return;
        }
        if let Some(sim) = state.descriptor_pools.remove(&pool.raw()) {
            for set in sim.sets {
                state.free_child(set);
                state.descriptor_sets.remove(&set);
            }
        }
    }

    fn allocate_descriptor_sets(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        count: u32,
    ) -> DenoiseResult<Vec<DescriptorSetHandle>> {
        let mut state = self.state.lock();
        if state.take_injected_failure(ObjectKind::DescriptorSet) {
            return Err(DenoiseError::DescriptorPoolExhausted(
                "injected failure allocating descriptor sets".to_string(),
            ));
        }
        let Some(bindings) = state.set_layouts.get(&layout.raw()).cloned() else {
            return Err(DenoiseError::InvalidParameter(format!(
                "unknown descriptor-set layout {:?}",
                layout
            )));
        };
        let Some(sim) = state.descriptor_pools.get_mut(&pool.raw()) else {
            return Err(DenoiseError::InvalidParameter(format!(
                "unknown descriptor pool {:?}",
                pool
            )));
        };

        if sim.sets.len() as u32 + count > sim.max_sets {
            return Err(DenoiseError::DescriptorPoolExhausted(format!(
                "pool holds {} of {} sets, {} more requested",
                sim.sets.len(),
                sim.max_sets,
                count
            )));
        }
        let mut remaining = sim.remaining.clone();
        for binding in &bindings {
            let needed = binding.count * count;
            match remaining.iter_mut().find(|size| size.kind == binding.kind) {
                Some(size) if size.count >= needed => size.count -= needed,
                _ => {
                    return Err(DenoiseError::DescriptorPoolExhausted(format!(
                        "not enough {:?} descriptors for binding {}",
                        binding.kind, binding.binding
                    )));
                }
            }
        }
        sim.remaining = remaining;

        let mut sets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            state.next_id += 1;
            let id = state.next_id;
            state.live.insert(id, ObjectKind::DescriptorSet);
            state.descriptor_sets.insert(
                id,
                SimDescriptorSet {
                    layout: layout.raw(),
                    writes: BTreeMap::new(),
                },
            );
            sets.push(id);
        }
        if let Some(sim) = state.descriptor_pools.get_mut(&pool.raw()) {
            sim.sets.extend(&sets);
        }
        Ok(sets.into_iter().map(DescriptorSetHandle::from_raw).collect())
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorImageWrite]) {
        let mut state = self.state.lock();
        for write in writes {
            let set_raw = write.set.raw();
            let Some(layout) = state.descriptor_sets.get(&set_raw).map(|s| s.layout) else {
                state.report(format!("write to freed descriptor set {}", set_raw));
                continue;
            };
            if !state.views.contains_key(&write.view.raw()) {
                state.report(format!(
                    "write of destroyed view {} to binding {}",
                    write.view.raw(),
                    write.binding
                ));
                continue;
            }
            let declared = state.set_layouts.get(&layout).and_then(|bindings| {
                bindings
                    .iter()
                    .find(|b| b.binding == write.binding)
                    .map(|b| b.kind)
            });
            if declared != Some(write.kind) {
                state.report(format!(
                    "write of {:?} to binding {} declared as {:?}",
                    write.kind, write.binding, declared
                ));
                continue;
            }
            if write.kind == DescriptorKind::StorageImage && !write.layout.allows_storage_access()
            {
                state.report(format!(
                    "storage image at binding {} written with layout {:?}",
                    write.binding, write.layout
                ));
            }
            if let Some(set) = state.descriptor_sets.get_mut(&set_raw) {
                set.writes
                    .insert(write.binding, (write.view.raw(), write.layout));
            }
        }
    }

    fn create_command_pool(&self, queue: QueueKind) -> DenoiseResult<CommandPoolHandle> {
        let mut state = self.state.lock();
        let id = state.create(ObjectKind::CommandPool)?;
        log::trace!("DummyBackend: command pool {} on {:?} queue", id, queue);
        state.command_pools.insert(id, Vec::new());
        Ok(CommandPoolHandle::from_raw(id))
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        let mut state = self.state.lock();
        if !state.destroy(ObjectKind::CommandPool, pool.raw()) {
            return;
        }
        if let Some(buffers) = state.command_pools.remove(&pool.raw()) {
            for buffer in buffers {
                state.free_child(buffer);
                state.command_buffers.remove(&buffer);
            }
        }
    }

    fn allocate_command_buffer(
        &self,
        pool: CommandPoolHandle,
    ) -> DenoiseResult<CommandBufferHandle> {
        let mut state = self.state.lock();
        if !state.is_live(pool.raw(), ObjectKind::CommandPool) {
            return Err(DenoiseError::InvalidParameter(format!(
                "unknown command pool {:?}",
                pool
            )));
        }
        let id = state.create(ObjectKind::CommandBuffer)?;
        state.command_buffers.insert(id, None);
        if let Some(buffers) = state.command_pools.get_mut(&pool.raw()) {
            buffers.push(id);
        }
        Ok(CommandBufferHandle::from_raw(id))
    }

    fn record_commands(
        &self,
        command_buffer: CommandBufferHandle,
        script: &CommandScript,
    ) -> DenoiseResult<()> {
        let mut state = self.state.lock();
        match state.command_buffers.get_mut(&command_buffer.raw()) {
            Some(slot) => {
                *slot = Some(script.clone());
                Ok(())
            }
            None => Err(DenoiseError::InvalidParameter(format!(
                "unknown command buffer {:?}",
                command_buffer
            ))),
        }
    }

    fn create_semaphore(&self) -> DenoiseResult<SemaphoreHandle> {
        let mut state = self.state.lock();
        let id = state.create(ObjectKind::Semaphore)?;
        state.semaphores.insert(id, false);
        Ok(SemaphoreHandle::from_raw(id))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        let mut state = self.state.lock();
        if state.destroy(ObjectKind::Semaphore, semaphore.raw()) {
            state.semaphores.remove(&semaphore.raw());
        }
    }

    fn queue_wait_idle(&self, queue: QueueKind) -> DenoiseResult<()> {
        log::trace!("DummyBackend: {:?} queue idle", queue);
        self.state.lock().idled.push(queue);
        Ok(())
    }

    fn submit(&self, queue: QueueKind, submission: &Submission) -> DenoiseResult<()> {
        let mut state = self.state.lock();
        let script = match state.command_buffers.get(&submission.command_buffer.raw()) {
            Some(Some(script)) => script.clone(),
            Some(None) => {
                return Err(DenoiseError::SubmissionFailed(format!(
                    "command buffer {:?} was never recorded",
                    submission.command_buffer
                )));
            }
            None => {
                return Err(DenoiseError::SubmissionFailed(format!(
                    "unknown command buffer {:?}",
                    submission.command_buffer
                )));
            }
        };
        if !state.semaphores.contains_key(&submission.signal.raw()) {
            return Err(DenoiseError::SubmissionFailed(format!(
                "unknown signal semaphore {:?}",
                submission.signal
            )));
        }

        if let Some(wait) = submission.wait {
            consume_signal(&mut state, wait.semaphore.raw());
            if let Some(src_stage) = script.barrier_src_stage()
                && !wait.chains_into(src_stage)
            {
                state.report(format!(
                    "semaphore {} is waited at {:?}, which does not chain into the barrier source stage {:?}",
                    wait.semaphore.raw(),
                    wait.stage,
                    src_stage
                ));
            }
        }

        state.execute(&script);

        let signal = submission.signal.raw();
        if state.semaphores.get(&signal) == Some(&true) {
            state.report(format!(
                "semaphore {} signalled while a previous signal is still pending",
                signal
            ));
        }
        state.semaphores.insert(signal, true);
        state.submissions += 1;
        log::trace!(
            "DummyBackend: executed {} command(s) on {:?} queue",
            script.len(),
            queue
        );
        Ok(())
    }
}

impl Drop for DummyBackend {
    fn drop(&mut self) {
        let state = self.state.lock();
        if !state.live.is_empty() {
            let mut counts: BTreeMap<ObjectKind, usize> = BTreeMap::new();
            for kind in state.live.values() {
                *counts.entry(*kind).or_default() += 1;
            }
            log::warn!("DummyBackend dropped with live objects: {:?}", counts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::ImageBarrier;
    use crate::sync::SemaphoreWait;
    use crate::types::{ImageFormat, ImageUsage};

    fn image(backend: &DummyBackend) -> CreatedImage {
        backend
            .create_image(&ImageDescriptor::new_2d(
                Extent2d::new(16, 16),
                ImageFormat::Rgba8Unorm,
                ImageUsage::STORAGE,
            ))
            .unwrap()
    }

    #[test]
    fn test_double_destroy_reported() {
        let backend = DummyBackend::new();
        let created = image(&backend);
        backend.destroy_image(created);
        assert!(backend.validation_messages().is_empty());
        backend.destroy_image(created);
        assert_eq!(backend.validation_messages().len(), 3);
        assert_eq!(backend.live_object_count(), 0);
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let backend = DummyBackend::new();
        backend.fail_next(ObjectKind::ImageView);
        let descriptor = ImageDescriptor::new_2d(
            Extent2d::new(4, 4),
            ImageFormat::Rgba8Unorm,
            ImageUsage::STORAGE,
        );
        assert!(backend.create_image(&descriptor).is_err());
        assert_eq!(backend.live_object_count(), 0);
        let created = backend.create_image(&descriptor).unwrap();
        backend.destroy_image(created);
    }

    #[test]
    fn test_semaphore_wait_and_signal() {
        let backend = DummyBackend::new();
        let semaphore = backend.create_semaphore().unwrap();

        assert!(!backend.wait_semaphore(semaphore));
        assert_eq!(backend.validation_messages().len(), 1);
        backend.clear_validation_messages();

        backend.signal_semaphore(semaphore);
        assert_eq!(backend.semaphore_signaled(semaphore), Some(true));
        backend.signal_semaphore(semaphore);
        assert_eq!(backend.validation_messages().len(), 1);
        assert!(backend.wait_semaphore(semaphore));
        assert_eq!(backend.semaphore_signaled(semaphore), Some(false));

        backend.destroy_semaphore(semaphore);
    }

    #[test]
    fn test_barrier_layout_mismatch() {
        let backend = DummyBackend::new();
        let created = image(&backend);
        let pool = backend.create_command_pool(QueueKind::Compute).unwrap();
        let cmd = backend.allocate_command_buffer(pool).unwrap();
        let signal = backend.create_semaphore().unwrap();

        let mut script = CommandScript::new();
        script.push(ComputeCommand::PipelineBarrier {
            src_stage: ImageLayout::ShaderReadOnly.src_stage(),
            dst_stage: ImageLayout::General.dst_stage(),
            image_barriers: vec![ImageBarrier::between(
                created.image,
                ImageLayout::ShaderReadOnly,
                ImageLayout::General,
            )],
        });
        backend.record_commands(cmd, &script).unwrap();
        backend
            .submit(
                QueueKind::Compute,
                &Submission {
                    command_buffer: cmd,
                    wait: None,
                    signal,
                },
            )
            .unwrap();

        let messages = backend.validation_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("layout mismatch"));
        assert_eq!(backend.image_layout(created.image), Some(ImageLayout::General));

        backend.destroy_command_pool(pool);
        assert_eq!(backend.live_count(ObjectKind::CommandBuffer), 0);
        backend.destroy_semaphore(signal);
        backend.destroy_image(created);
    }

    #[test]
    fn test_unchained_wait_reported() {
        let backend = DummyBackend::new();
        let created = image(&backend);
        let pool = backend.create_command_pool(QueueKind::Compute).unwrap();
        let cmd = backend.allocate_command_buffer(pool).unwrap();
        let upstream = backend.create_semaphore().unwrap();
        let signal = backend.create_semaphore().unwrap();

        let mut script = CommandScript::new();
        script.push(ComputeCommand::PipelineBarrier {
            src_stage: ImageLayout::Undefined.src_stage(),
            dst_stage: ImageLayout::General.dst_stage(),
            image_barriers: vec![ImageBarrier::between(
                created.image,
                ImageLayout::Undefined,
                ImageLayout::General,
            )],
        });
        backend.record_commands(cmd, &script).unwrap();

        backend.signal_semaphore(upstream);
        backend
            .submit(
                QueueKind::Compute,
                &Submission {
                    command_buffer: cmd,
                    wait: Some(SemaphoreWait::new(upstream)),
                    signal,
                },
            )
            .unwrap();
        let messages = backend.validation_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("does not chain"), "{}", messages[0]);

        backend.destroy_command_pool(pool);
        backend.destroy_semaphore(upstream);
        backend.destroy_semaphore(signal);
        backend.destroy_image(created);
    }

    #[test]
    fn test_unrecorded_submit_fails() {
        let backend = DummyBackend::new();
        let pool = backend.create_command_pool(QueueKind::Compute).unwrap();
        let cmd = backend.allocate_command_buffer(pool).unwrap();
        let signal = backend.create_semaphore().unwrap();
        let result = backend.submit(
            QueueKind::Compute,
            &Submission {
                command_buffer: cmd,
                wait: None,
                signal,
            },
        );
        assert!(matches!(result, Err(DenoiseError::SubmissionFailed(_))));
        backend.destroy_command_pool(pool);
        backend.destroy_semaphore(signal);
    }

    #[test]
    fn test_pool_capacity() {
        let backend = DummyBackend::new();
        let bindings = [DescriptorBinding::storage_image(0)];
        let layout = backend.create_descriptor_set_layout(&bindings).unwrap();
        let pool = backend
            .create_descriptor_pool(
                &[DescriptorPoolSize {
                    kind: DescriptorKind::StorageImage,
                    count: 2,
                }],
                2,
            )
            .unwrap();

        let sets = backend.allocate_descriptor_sets(pool, layout, 2).unwrap();
        assert_eq!(sets.len(), 2);
        assert!(matches!(
            backend.allocate_descriptor_sets(pool, layout, 1),
            Err(DenoiseError::DescriptorPoolExhausted(_))
        ));

        backend.destroy_descriptor_pool(pool);
        assert_eq!(backend.live_count(ObjectKind::DescriptorSet), 0);
        backend.destroy_descriptor_set_layout(layout);
        assert_eq!(backend.live_object_count(), 0);
    }
}
