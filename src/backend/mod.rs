//! GPU backend abstraction layer.
//!
//! The denoiser talks to the device only through the [`ComputeBackend`]
//! trait. Handles crossing the trait are opaque `u64` newtypes, so the
//! orchestrator never touches API-specific types.
//!
//! # Available Backends
//!
//! - `dummy` (always available): simulated device for tests and tooling
//! - `vulkan-backend` (default feature): native Vulkan backend using ash

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub mod dummy;

use std::sync::Arc;

use crate::command::CommandScript;
use crate::error::DenoiseResult;
use crate::sync::SemaphoreWait;
use crate::types::{DescriptorBinding, DescriptorKind, ImageDescriptor, ImageLayout};

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw backend handle.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw backend handle.
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

define_handle!(
    /// Handle to a GPU image.
    ImageHandle
);
define_handle!(
    /// Handle to a view over a GPU image.
    ImageViewHandle
);
define_handle!(
    /// Handle to a shader module.
    ShaderModuleHandle
);
define_handle!(
    /// Handle to a descriptor-set layout.
    DescriptorSetLayoutHandle
);
define_handle!(
    /// Handle to a pipeline layout.
    PipelineLayoutHandle
);
define_handle!(
    /// Handle to a compute pipeline.
    PipelineHandle
);
define_handle!(
    /// Handle to a descriptor pool.
    DescriptorPoolHandle
);
define_handle!(
    /// Handle to a descriptor set. Freed together with its pool.
    DescriptorSetHandle
);
define_handle!(
    /// Handle to a command pool.
    CommandPoolHandle
);
define_handle!(
    /// Handle to a command buffer. Freed together with its pool.
    CommandBufferHandle
);
define_handle!(
    /// Handle to a binary semaphore.
    SemaphoreHandle
);

/// Queue a command is submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Graphics,
    Compute,
}

/// An image created by the backend together with its default 2D view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreatedImage {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
}

/// Parameters for creating a compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor<'a> {
    /// Debug label for the pipeline.
    pub label: Option<&'a str>,
    /// Pipeline layout the pipeline is compatible with.
    pub layout: PipelineLayoutHandle,
    /// Compiled shader module.
    pub module: ShaderModuleHandle,
    /// Entry point name in the module.
    pub entry_point: &'a str,
    /// Local workgroup size, passed as specialization constants 0, 1 and 2.
    pub workgroup_size: [u32; 3],
}

/// Number of descriptors of one kind a pool must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorPoolSize {
    pub kind: DescriptorKind,
    pub count: u32,
}

/// A single image descriptor write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorImageWrite {
    pub set: DescriptorSetHandle,
    pub binding: u32,
    pub kind: DescriptorKind,
    pub view: ImageViewHandle,
    /// Layout the image will be in whenever the set is used.
    pub layout: ImageLayout,
}

/// A queue submission of one pre-recorded command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub command_buffer: CommandBufferHandle,
    /// Upstream semaphore the queue waits on before the command buffer runs.
    pub wait: Option<SemaphoreWait>,
    /// Semaphore signalled once the command buffer completes.
    pub signal: SemaphoreHandle,
}

/// Device abstraction consumed by the denoiser.
///
/// Creation methods return errors; destruction methods never fail. Every
/// handle must be destroyed exactly once through the matching method.
/// Descriptor sets and command buffers are freed with their pools.
pub trait ComputeBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a 2D image in device-local memory together with its view.
    fn create_image(&self, descriptor: &ImageDescriptor) -> DenoiseResult<CreatedImage>;

    /// Destroy an image and its view.
    fn destroy_image(&self, image: CreatedImage);

    /// Create a shader module from SPIR-V words.
    fn create_shader_module(&self, code: &[u32]) -> DenoiseResult<ShaderModuleHandle>;

    fn destroy_shader_module(&self, module: ShaderModuleHandle);

    /// Create a descriptor-set layout from binding declarations.
    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> DenoiseResult<DescriptorSetLayoutHandle>;

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    /// Create a pipeline layout with the given set layouts and no push constants.
    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
    ) -> DenoiseResult<PipelineLayoutHandle>;

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    /// Create a compute pipeline.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor<'_>,
    ) -> DenoiseResult<PipelineHandle>;

    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    /// Create a descriptor pool holding exactly `sizes` descriptors and `max_sets` sets.
    fn create_descriptor_pool(
        &self,
        sizes: &[DescriptorPoolSize],
        max_sets: u32,
    ) -> DenoiseResult<DescriptorPoolHandle>;

    /// Destroy a descriptor pool, freeing every set allocated from it.
    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);

    /// Allocate `count` sets with the same layout.
    fn allocate_descriptor_sets(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        count: u32,
    ) -> DenoiseResult<Vec<DescriptorSetHandle>>;

    /// Write image descriptors.
    fn update_descriptor_sets(&self, writes: &[DescriptorImageWrite]);

    /// Create a command pool on the given queue's family.
    fn create_command_pool(&self, queue: QueueKind) -> DenoiseResult<CommandPoolHandle>;

    /// Destroy a command pool, freeing every buffer allocated from it.
    fn destroy_command_pool(&self, pool: CommandPoolHandle);

    /// Allocate a primary command buffer.
    fn allocate_command_buffer(&self, pool: CommandPoolHandle)
    -> DenoiseResult<CommandBufferHandle>;

    /// Record a script into a command buffer, replacing previous contents.
    ///
    /// The buffer must stay valid for repeated submission.
    fn record_commands(
        &self,
        command_buffer: CommandBufferHandle,
        script: &CommandScript,
    ) -> DenoiseResult<()>;

    /// Create a binary semaphore.
    fn create_semaphore(&self) -> DenoiseResult<SemaphoreHandle>;

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    /// Block until the queue has finished all submitted work.
    fn queue_wait_idle(&self, queue: QueueKind) -> DenoiseResult<()>;

    /// Submit a command buffer without blocking the CPU.
    fn submit(&self, queue: QueueKind, submission: &Submission) -> DenoiseResult<()>;
}

/// Which backend [`create_backend`] should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendPreference {
    /// Vulkan when available, dummy otherwise.
    #[default]
    Auto,
    /// Only the Vulkan backend.
    Vulkan,
    /// Only the dummy backend.
    Dummy,
}

/// Selects and creates a backend.
///
/// `Auto` tries a headless Vulkan device first and falls back to the dummy
/// backend. `Vulkan` fails if no device can be created.
pub fn create_backend(
    preference: BackendPreference,
    validation: bool,
) -> DenoiseResult<Arc<dyn ComputeBackend>> {
    if preference == BackendPreference::Dummy {
        log::info!("Using dummy backend");
        return Ok(Arc::new(dummy::DummyBackend::new()));
    }

    #[cfg(feature = "vulkan-backend")]
    {
        match vulkan::VulkanBackend::headless(validation) {
            Ok(backend) => {
                log::info!("Using Vulkan backend (ash)");
                return Ok(Arc::new(backend));
            }
            Err(e) if preference == BackendPreference::Vulkan => return Err(e),
            Err(e) => {
                log::warn!("Failed to create Vulkan backend: {}", e);
            }
        }
    }

    #[cfg(not(feature = "vulkan-backend"))]
    {
        let _ = validation;
        if preference == BackendPreference::Vulkan {
            return Err(crate::error::DenoiseError::InitializationFailed(
                "vulkan-backend feature is disabled".to_string(),
            ));
        }
    }

    log::info!("Using dummy backend");
    Ok(Arc::new(dummy::DummyBackend::new()))
}

/// Check if a real GPU backend was compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "vulkan-backend")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_raw_round_trip() {
        let handle = ImageHandle::from_raw(42);
        assert_eq!(handle.raw(), 42);
        assert_ne!(handle, ImageHandle::from_raw(43));
    }

    #[test]
    fn test_dummy_preference() {
        let backend = create_backend(BackendPreference::Dummy, false).unwrap();
        assert_eq!(backend.name(), "Dummy Backend");
    }
}
