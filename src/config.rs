//! Denoiser configuration.

use crate::error::{DenoiseError, DenoiseResult};
use crate::shader::ShaderSource;
use crate::types::{Extent2d, PipelineStages};

/// Local workgroup size of the compute shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkgroupSize {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }

    /// Number of workgroups needed to cover `extent` in one dispatch.
    pub fn dispatch_for(&self, extent: Extent2d, rounding: DispatchRounding) -> [u32; 3] {
        [
            rounding.group_count(extent.width, self.x),
            rounding.group_count(extent.height, self.y),
            1,
        ]
    }

    /// Pixels covered by `groups` workgroups, clamped to `extent`.
    pub fn covered(&self, groups: [u32; 3], extent: Extent2d) -> Extent2d {
        Extent2d::new(
            groups[0].saturating_mul(self.x),
            groups[1].saturating_mul(self.y),
        )
        .min(extent)
    }
}

impl Default for WorkgroupSize {
    fn default() -> Self {
        Self::new(16, 16, 1)
    }
}

/// How a dimension that is not a multiple of the workgroup size is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchRounding {
    /// Integer division. Trailing rows and columns are left unprocessed.
    #[default]
    Truncate,
    /// Round up. The shader must bounds-check its invocation id.
    Ceil,
}

impl DispatchRounding {
    pub fn group_count(self, pixels: u32, local_size: u32) -> u32 {
        match self {
            Self::Truncate => pixels / local_size,
            Self::Ceil => pixels.div_ceil(local_size),
        }
    }
}

/// Parameters for building a [`Denoiser`](crate::Denoiser).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenoiserParameters {
    /// Debug label prefix for created objects.
    pub label: String,
    /// Compute shader code.
    pub shader: ShaderSource,
    /// Compute entry point.
    pub entry_point: String,
    /// Local workgroup size.
    pub workgroup_size: WorkgroupSize,
    /// Rounding of the dispatch size.
    pub rounding: DispatchRounding,
    /// Which of the per-swapchain-image descriptor sets the command buffer binds.
    pub descriptor_set_index: u32,
    /// Stage the upstream semaphore wait blocks. The recorded barriers are
    /// ordered after it, so submissions must wait at an overlapping stage.
    pub upstream_wait_stage: PipelineStages,
}

impl Default for DenoiserParameters {
    fn default() -> Self {
        Self {
            label: "denoiser".to_string(),
            shader: ShaderSource::default(),
            entry_point: "main".to_string(),
            workgroup_size: WorkgroupSize::default(),
            rounding: DispatchRounding::default(),
            descriptor_set_index: 0,
            upstream_wait_stage: PipelineStages::COMPUTE_SHADER,
        }
    }
}

impl DenoiserParameters {
    /// Create parameters with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the shader source.
    pub fn with_shader(mut self, shader: ShaderSource) -> Self {
        self.shader = shader;
        self
    }

    /// Set the compute entry point.
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Set the local workgroup size.
    pub fn with_workgroup_size(mut self, workgroup_size: WorkgroupSize) -> Self {
        self.workgroup_size = workgroup_size;
        self
    }

    /// Set the dispatch rounding.
    pub fn with_rounding(mut self, rounding: DispatchRounding) -> Self {
        self.rounding = rounding;
        self
    }

    /// Set the descriptor set index bound by the command buffer.
    pub fn with_descriptor_set_index(mut self, index: u32) -> Self {
        self.descriptor_set_index = index;
        self
    }

    /// Set the stage the upstream semaphore wait blocks.
    pub fn with_upstream_wait_stage(mut self, stage: PipelineStages) -> Self {
        self.upstream_wait_stage = stage;
        self
    }

    /// Check the parameters against a swapchain image count.
    pub fn validate(&self, image_count: u32) -> DenoiseResult<()> {
        if self.workgroup_size.as_array().contains(&0) {
            return Err(DenoiseError::InvalidParameter(format!(
                "workgroup size {:?} has a zero dimension",
                self.workgroup_size
            )));
        }
        if self.entry_point.is_empty() || self.entry_point.contains('\0') {
            return Err(DenoiseError::InvalidParameter(format!(
                "invalid entry point {:?}",
                self.entry_point
            )));
        }
        if (self.upstream_wait_stage - PipelineStages::TOP_OF_PIPE).is_empty() {
            return Err(DenoiseError::InvalidParameter(format!(
                "upstream wait stage {:?} blocks no work",
                self.upstream_wait_stage
            )));
        }
        if self.descriptor_set_index >= image_count {
            return Err(DenoiseError::InvalidParameter(format!(
                "descriptor set index {} out of range for {} swapchain images",
                self.descriptor_set_index, image_count
            )));
        }
        Ok(())
    }
}
