//! Compute pipeline object.
//!
//! Owns the descriptor-set layout, the pipeline layout and one pipeline per
//! compute stage. Objects are destroyed in reverse dependency order:
//! pipelines, then the pipeline layout, then the descriptor-set layout.

use crate::backend::{
    ComputeBackend, ComputePipelineDescriptor, DescriptorSetLayoutHandle, PipelineHandle,
    PipelineLayoutHandle,
};
use crate::error::{DenoiseError, DenoiseResult};
use crate::profile_scope;
use crate::shader::ShaderSource;
use crate::types::DescriptorBinding;

/// One compute stage of a pipeline object.
#[derive(Debug, Clone, Copy)]
pub struct ComputeStage<'a> {
    pub source: &'a ShaderSource,
    pub entry_point: &'a str,
    pub workgroup_size: [u32; 3],
    pub label: Option<&'a str>,
}

impl<'a> ComputeStage<'a> {
    pub fn new(source: &'a ShaderSource, entry_point: &'a str, workgroup_size: [u32; 3]) -> Self {
        Self {
            source,
            entry_point,
            workgroup_size,
            label: None,
        }
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }
}

/// Pipeline object built from binding declarations and compute shaders.
#[derive(Debug)]
pub struct ComputePipeline {
    bindings: Vec<DescriptorBinding>,
    set_layout: DescriptorSetLayoutHandle,
    pipeline_layout: PipelineLayoutHandle,
    pipelines: Vec<PipelineHandle>,
    destroyed: bool,
}

impl ComputePipeline {
    /// Build the layouts and one pipeline per stage.
    ///
    /// `bindings` must enumerate every resource the shaders reference; the
    /// shaders are not reflected. On failure every object created so far is
    /// destroyed before the error is returned.
    pub fn build(
        backend: &dyn ComputeBackend,
        bindings: &[DescriptorBinding],
        stages: &[ComputeStage<'_>],
    ) -> DenoiseResult<Self> {
        profile_scope!("denoiser_build_pipeline");

        if stages.is_empty() {
            return Err(DenoiseError::InvalidParameter(
                "a compute pipeline needs at least one stage".to_string(),
            ));
        }
        check_bindings(bindings)?;

        let set_layout = backend.create_descriptor_set_layout(bindings)?;
        let pipeline_layout = backend
            .create_pipeline_layout(&[set_layout])
            .inspect_err(|_| backend.destroy_descriptor_set_layout(set_layout))?;

        let mut pipelines = Vec::with_capacity(stages.len());
        for stage in stages {
            match create_stage(backend, pipeline_layout, stage) {
                Ok(pipeline) => pipelines.push(pipeline),
                Err(e) => {
                    for pipeline in pipelines {
                        backend.destroy_pipeline(pipeline);
                    }
                    backend.destroy_pipeline_layout(pipeline_layout);
                    backend.destroy_descriptor_set_layout(set_layout);
                    return Err(e);
                }
            }
        }

        log::debug!(
            "Built compute pipeline object: {} binding(s), {} stage(s)",
            bindings.len(),
            pipelines.len()
        );

        Ok(Self {
            bindings: bindings.to_vec(),
            set_layout,
            pipeline_layout,
            pipelines,
            destroyed: false,
        })
    }

    /// Binding declarations the layouts were built from.
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    pub fn set_layout(&self) -> DescriptorSetLayoutHandle {
        self.set_layout
    }

    pub fn pipeline_layout(&self) -> PipelineLayoutHandle {
        self.pipeline_layout
    }

    /// One pipeline per stage, in the order the stages were passed.
    pub fn pipelines(&self) -> &[PipelineHandle] {
        &self.pipelines
    }

    /// Destroy pipelines, then the pipeline layout, then the set layout.
    ///
    /// The caller must ensure no submitted work still uses them.
    pub fn destroy(&mut self, backend: &dyn ComputeBackend) {
        if self.destroyed {
            return;
        }
        for pipeline in self.pipelines.drain(..) {
            backend.destroy_pipeline(pipeline);
        }
        backend.destroy_pipeline_layout(self.pipeline_layout);
        backend.destroy_descriptor_set_layout(self.set_layout);
        self.destroyed = true;
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        if !self.destroyed {
            log::warn!(
                "ComputePipeline dropped without calling destroy(). Resources may have leaked."
            );
        }
    }
}

fn check_bindings(bindings: &[DescriptorBinding]) -> DenoiseResult<()> {
    for (i, binding) in bindings.iter().enumerate() {
        if binding.count == 0 {
            return Err(DenoiseError::InvalidParameter(format!(
                "binding {} has a zero descriptor count",
                binding.binding
            )));
        }
        if bindings[..i].iter().any(|b| b.binding == binding.binding) {
            return Err(DenoiseError::InvalidParameter(format!(
                "binding {} declared twice",
                binding.binding
            )));
        }
    }
    Ok(())
}

/// Create one pipeline. The shader module only lives until the pipeline exists.
fn create_stage(
    backend: &dyn ComputeBackend,
    layout: PipelineLayoutHandle,
    stage: &ComputeStage<'_>,
) -> DenoiseResult<PipelineHandle> {
    let code = stage.source.load(stage.entry_point)?;
    let module = backend.create_shader_module(&code)?;

    let result = backend.create_compute_pipeline(&ComputePipelineDescriptor {
        label: stage.label,
        layout,
        module,
        entry_point: stage.entry_point,
        workgroup_size: stage.workgroup_size,
    });
    backend.destroy_shader_module(module);

    if let Ok(pipeline) = &result {
        log::debug!(
            "Created compute pipeline {:?} from {} (entry '{}', local size {:?})",
            pipeline,
            stage.source.describe(),
            stage.entry_point,
            stage.workgroup_size
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, ObjectKind};
    use crate::shader::SPIRV_MAGIC;
    use crate::types::ImageSlot;

    fn spirv() -> ShaderSource {
        ShaderSource::Spirv(vec![SPIRV_MAGIC, 0x0001_0000])
    }

    #[test]
    fn test_build_and_destroy_order() {
        let backend = DummyBackend::new();
        let source = spirv();
        let mut pipeline = ComputePipeline::build(
            &backend,
            &ImageSlot::bindings(),
            &[ComputeStage::new(&source, "main", [16, 16, 1])],
        )
        .unwrap();

        assert_eq!(pipeline.pipelines().len(), 1);
        assert_eq!(pipeline.bindings().len(), 4);
        // Shader module is released once the pipeline exists.
        assert_eq!(backend.live_count(ObjectKind::ShaderModule), 0);
        assert_eq!(
            backend.pipeline_workgroup_size(pipeline.pipelines()[0]),
            Some([16, 16, 1])
        );

        pipeline.destroy(&backend);
        let kinds: Vec<ObjectKind> = backend
            .destruction_log()
            .into_iter()
            .map(|(kind, _)| kind)
            .filter(|kind| *kind != ObjectKind::ShaderModule)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ObjectKind::Pipeline,
                ObjectKind::PipelineLayout,
                ObjectKind::DescriptorSetLayout
            ]
        );
        assert_eq!(backend.live_object_count(), 0);
        assert!(backend.validation_messages().is_empty());
    }

    #[test]
    fn test_one_pipeline_per_stage() {
        let backend = DummyBackend::new();
        let source = spirv();
        let stages = [
            ComputeStage::new(&source, "main", [16, 16, 1]),
            ComputeStage::new(&source, "main", [8, 8, 1]).with_label("small"),
        ];
        let mut pipeline =
            ComputePipeline::build(&backend, &ImageSlot::bindings(), &stages).unwrap();
        assert_eq!(pipeline.pipelines().len(), 2);
        pipeline.destroy(&backend);
    }

    #[test]
    fn test_failure_unwinds() {
        for kind in [
            ObjectKind::DescriptorSetLayout,
            ObjectKind::PipelineLayout,
            ObjectKind::ShaderModule,
            ObjectKind::Pipeline,
        ] {
            let backend = DummyBackend::new();
            backend.fail_next(kind);
            let source = spirv();
            let result = ComputePipeline::build(
                &backend,
                &ImageSlot::bindings(),
                &[ComputeStage::new(&source, "main", [16, 16, 1])],
            );
            assert!(result.is_err(), "{kind:?}");
            assert_eq!(backend.live_object_count(), 0, "{kind:?}");
        }
    }

    #[test]
    fn test_missing_shader_file_unwinds() {
        let backend = DummyBackend::new();
        let source = ShaderSource::SpirvFile("missing/Denoiser.comp.spv".into());
        let result = ComputePipeline::build(
            &backend,
            &ImageSlot::bindings(),
            &[ComputeStage::new(&source, "main", [16, 16, 1])],
        );
        assert!(matches!(result, Err(DenoiseError::ShaderLoadFailed { .. })));
        assert_eq!(backend.live_object_count(), 0);
    }

    #[test]
    fn test_invalid_bindings() {
        let backend = DummyBackend::new();
        let source = spirv();
        let stage = [ComputeStage::new(&source, "main", [16, 16, 1])];

        let duplicate = [
            DescriptorBinding::storage_image(0),
            DescriptorBinding::storage_image(0),
        ];
        assert!(ComputePipeline::build(&backend, &duplicate, &stage).is_err());

        let empty = [DescriptorBinding::storage_image(0).with_count(0)];
        assert!(ComputePipeline::build(&backend, &empty, &stage).is_err());

        assert!(ComputePipeline::build(&backend, &ImageSlot::bindings(), &[]).is_err());
        assert_eq!(backend.live_object_count(), 0);
    }
}
