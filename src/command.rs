//! Command recording for the denoiser dispatch.
//!
//! Recording happens in two steps. First a backend-neutral [`CommandScript`]
//! is built: one pipeline barrier covering every image, the pipeline bind,
//! the descriptor-set bind and the dispatch. The backend then translates the
//! script into a native command buffer. The script is kept so the recorded
//! work can be inspected after the fact.

use crate::backend::{
    CommandBufferHandle, CommandPoolHandle, ComputeBackend, DescriptorSetHandle, PipelineHandle,
    PipelineLayoutHandle, QueueKind,
};
use crate::barrier::{BarrierBatch, ImageBarrier};
use crate::error::DenoiseResult;
use crate::pipeline::ComputePipeline;
use crate::profile_scope;
use crate::resources::{ImageId, ResourceArena};
use crate::types::{ImageLayout, PipelineStages};

/// A single recorded compute command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeCommand {
    /// One pipeline-barrier command holding several image barriers.
    PipelineBarrier {
        src_stage: PipelineStages,
        dst_stage: PipelineStages,
        image_barriers: Vec<ImageBarrier>,
    },
    /// Bind a compute pipeline.
    BindPipeline(PipelineHandle),
    /// Bind a descriptor set at set index 0 of the pipeline layout.
    BindDescriptorSet {
        layout: PipelineLayoutHandle,
        set: DescriptorSetHandle,
    },
    /// Dispatch workgroups.
    Dispatch { x: u32, y: u32, z: u32 },
}

/// An ordered list of compute commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandScript {
    commands: Vec<ComputeCommand>,
}

impl CommandScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: ComputeCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[ComputeCommand] {
        &self.commands
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ComputeCommand> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// All image barriers in recording order.
    pub fn image_barriers(&self) -> impl Iterator<Item = &ImageBarrier> {
        self.commands.iter().flat_map(|command| match command {
            ComputeCommand::PipelineBarrier { image_barriers, .. } => image_barriers.as_slice(),
            _ => &[][..],
        })
    }

    /// Number of pipeline-barrier commands.
    pub fn barrier_command_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, ComputeCommand::PipelineBarrier { .. }))
            .count()
    }

    /// Source stage mask of the first pipeline barrier.
    pub fn barrier_src_stage(&self) -> Option<PipelineStages> {
        self.commands.iter().find_map(|command| match command {
            ComputeCommand::PipelineBarrier { src_stage, .. } => Some(*src_stage),
            _ => None,
        })
    }

    /// Workgroup counts of the first dispatch.
    pub fn dispatch(&self) -> Option<[u32; 3]> {
        self.commands.iter().find_map(|command| match command {
            ComputeCommand::Dispatch { x, y, z } => Some([*x, *y, *z]),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a CommandScript {
    type Item = &'a ComputeCommand;
    type IntoIter = std::slice::Iter<'a, ComputeCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Build the denoiser's command script.
///
/// `images` lists every image the shader touches, output first. Each gets
/// one barrier into `General`, issued through the arena so its tracked
/// layout follows. The barrier's source scope includes `upstream_stage`, the
/// stage the submission's semaphore wait blocks.
pub fn build_script(
    arena: &mut ResourceArena,
    images: &[ImageId],
    pipeline: &ComputePipeline,
    set: DescriptorSetHandle,
    groups: [u32; 3],
    upstream_stage: PipelineStages,
) -> DenoiseResult<CommandScript> {
    let mut batch = BarrierBatch::new();
    for &id in images {
        batch.add(arena.transition(id, ImageLayout::General)?);
    }
    batch.chain_after(upstream_stage);

    let mut script = CommandScript::new();
    if let Some(barrier) = batch.into_command() {
        script.push(barrier);
    }
    for &handle in pipeline.pipelines() {
        script.push(ComputeCommand::BindPipeline(handle));
    }
    script.push(ComputeCommand::BindDescriptorSet {
        layout: pipeline.pipeline_layout(),
        set,
    });
    script.push(ComputeCommand::Dispatch {
        x: groups[0],
        y: groups[1],
        z: groups[2],
    });
    Ok(script)
}

/// Owns the command pool and the pre-recorded command buffer.
#[derive(Debug)]
pub struct CommandRecorder {
    pool: CommandPoolHandle,
    command_buffer: CommandBufferHandle,
    script: CommandScript,
    destroyed: bool,
}

impl CommandRecorder {
    /// Record the dispatch into a new command buffer on the compute queue.
    ///
    /// Blocks until the compute queue is idle before recording.
    pub fn record(
        backend: &dyn ComputeBackend,
        arena: &mut ResourceArena,
        images: &[ImageId],
        pipeline: &ComputePipeline,
        set: DescriptorSetHandle,
        groups: [u32; 3],
        upstream_stage: PipelineStages,
    ) -> DenoiseResult<Self> {
        profile_scope!("denoiser_record");

        backend.queue_wait_idle(QueueKind::Compute)?;
        let script = build_script(arena, images, pipeline, set, groups, upstream_stage)?;

        let pool = backend.create_command_pool(QueueKind::Compute)?;
        let command_buffer = match backend
            .allocate_command_buffer(pool)
            .and_then(|cmd| backend.record_commands(cmd, &script).map(|()| cmd))
        {
            Ok(cmd) => cmd,
            Err(e) => {
                backend.destroy_command_pool(pool);
                return Err(e);
            }
        };

        log::debug!(
            "Recorded denoiser command buffer {:?}: {} command(s), {} image barrier(s), dispatch {:?}",
            command_buffer,
            script.len(),
            script.image_barriers().count(),
            groups
        );

        Ok(Self {
            pool,
            command_buffer,
            script,
            destroyed: false,
        })
    }

    pub fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    pub fn script(&self) -> &CommandScript {
        &self.script
    }

    /// Destroy the command pool, freeing the command buffer.
    ///
    /// The caller must ensure the command buffer is no longer executing.
    pub fn destroy(&mut self, backend: &dyn ComputeBackend) {
        if self.destroyed {
            return;
        }
        backend.destroy_command_pool(self.pool);
        self.destroyed = true;
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        if !self.destroyed {
            log::warn!("CommandRecorder dropped without calling destroy()");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, ObjectKind};
    use crate::backend::ImageHandle;
    use crate::pipeline::ComputeStage;
    use crate::shader::{ShaderSource, SPIRV_MAGIC};
    use crate::types::{
        AccessFlags, Extent2d, ImageDescriptor, ImageFormat, ImageSlot, ImageUsage,
    };

    fn setup(backend: &DummyBackend) -> (ResourceArena, Vec<ImageId>, ComputePipeline) {
        let mut arena = ResourceArena::new();
        let images = (0..4)
            .map(|i| {
                let descriptor = ImageDescriptor::new_2d(
                    Extent2d::new(64, 32),
                    ImageFormat::Rgba8Unorm,
                    ImageUsage::STORAGE,
                )
                .with_label(format!("image{i}"));
                arena.create_image(backend, &descriptor).unwrap()
            })
            .collect();
        let source = ShaderSource::Spirv(vec![SPIRV_MAGIC, 0x0001_0000]);
        let pipeline = ComputePipeline::build(
            backend,
            &ImageSlot::bindings(),
            &[ComputeStage::new(&source, "main", [16, 16, 1])],
        )
        .unwrap();
        (arena, images, pipeline)
    }

    #[test]
    fn test_script_order() {
        let backend = DummyBackend::new();
        let (mut arena, images, mut pipeline) = setup(&backend);
        let set = DescriptorSetHandle::from_raw(99);

        let script = build_script(
            &mut arena,
            &images,
            &pipeline,
            set,
            [4, 2, 1],
            PipelineStages::COMPUTE_SHADER,
        )
        .unwrap();
        let commands = script.commands();
        assert_eq!(commands.len(), 4);
        assert!(matches!(commands[0], ComputeCommand::PipelineBarrier { .. }));
        assert_eq!(commands[1], ComputeCommand::BindPipeline(pipeline.pipelines()[0]));
        assert_eq!(
            commands[2],
            ComputeCommand::BindDescriptorSet {
                layout: pipeline.pipeline_layout(),
                set
            }
        );
        assert_eq!(commands[3], ComputeCommand::Dispatch { x: 4, y: 2, z: 1 });
        assert_eq!(script.dispatch(), Some([4, 2, 1]));
        assert_eq!(script.barrier_command_count(), 1);
        assert_eq!(
            script.barrier_src_stage(),
            Some(PipelineStages::TOP_OF_PIPE | PipelineStages::COMPUTE_SHADER)
        );

        let barrier_images: Vec<ImageHandle> =
            script.image_barriers().map(|b| b.image).collect();
        let expected: Vec<ImageHandle> = images
            .iter()
            .map(|&id| arena.get(id).unwrap().image())
            .collect();
        assert_eq!(barrier_images, expected);

        for barrier in script.image_barriers() {
            assert_eq!(barrier.old_layout, ImageLayout::Undefined);
            assert_eq!(barrier.new_layout, ImageLayout::General);
            assert_eq!(
                barrier.dst_access,
                AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE
            );
        }
        for &id in &images {
            assert_eq!(arena.get(id).unwrap().layout(), ImageLayout::General);
        }

        pipeline.destroy(&backend);
        arena.release(&backend);
    }

    #[test]
    fn test_record_and_destroy() {
        let backend = DummyBackend::new();
        let (mut arena, images, mut pipeline) = setup(&backend);
        let set = DescriptorSetHandle::from_raw(1);

        let mut recorder = CommandRecorder::record(
            &backend,
            &mut arena,
            &images,
            &pipeline,
            set,
            [4, 2, 1],
            PipelineStages::COMPUTE_SHADER,
        )
        .unwrap();
        assert_eq!(backend.live_count(ObjectKind::CommandPool), 1);
        assert_eq!(backend.idled_queues(), vec![QueueKind::Compute]);
        assert_eq!(recorder.script().dispatch(), Some([4, 2, 1]));

        recorder.destroy(&backend);
        recorder.destroy(&backend);
        assert_eq!(backend.live_count(ObjectKind::CommandPool), 0);

        pipeline.destroy(&backend);
        arena.release(&backend);
        assert!(backend.validation_messages().is_empty());
    }

    #[test]
    fn test_record_failure_releases_pool() {
        let backend = DummyBackend::new();
        let (mut arena, images, mut pipeline) = setup(&backend);
        backend.fail_next(ObjectKind::CommandBuffer);

        let result = CommandRecorder::record(
            &backend,
            &mut arena,
            &images,
            &pipeline,
            DescriptorSetHandle::from_raw(1),
            [1, 1, 1],
            PipelineStages::COMPUTE_SHADER,
        );
        assert!(result.is_err());
        assert_eq!(backend.live_count(ObjectKind::CommandPool), 0);

        pipeline.destroy(&backend);
        arena.release(&backend);
    }
}
