//! Common utilities for denoiser integration tests.
//!
//! Tests are parameterized over backends. The dummy backend is always
//! available and exposes its simulated state for detailed assertions. The
//! Vulkan backend runs on a headless device with validation enabled, when a
//! device exists and the `wgsl-shaders` feature can provide a real shader.

use std::sync::Arc;

use redlilium_denoiser::backend::dummy::DummyBackend;
#[cfg(feature = "vulkan-backend")]
use redlilium_denoiser::backend::vulkan::VulkanBackend;
use redlilium_denoiser::backend::{CreatedImage, ImageHandle, SemaphoreHandle};
use redlilium_denoiser::shader::SPIRV_MAGIC;
use redlilium_denoiser::types::{ImageDescriptor, ImageUsage};
use redlilium_denoiser::{
    ComputeBackend, DenoiserInputs, DenoiserParameters, Extent2d, ImageFormat, InputImage,
    QueueKind, ShaderSource, SwapchainInfo,
};

/// Denoiser shader used on real devices.
#[allow(dead_code)]
pub const DENOISER_WGSL: &str = r#"
@group(0) @binding(0) var color_image: texture_storage_2d<rgba8unorm, read>;
@group(0) @binding(1) var output_image: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var normals_image: texture_storage_2d<rgba16float, read>;
@group(0) @binding(3) var positions_image: texture_storage_2d<rgba32float, read>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(output_image);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let coord = vec2<i32>(id.xy);
    let color = textureLoad(color_image, coord);
    let normal = textureLoad(normals_image, coord);
    let position = textureLoad(positions_image, coord);
    let weight = 0.5 + 0.5 * abs(normal.z) + 0.0 * position.w;
    textureStore(output_image, coord, color * weight);
}
"#;

/// Install the test logger once.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (simulated device).
    Dummy,
    /// Vulkan backend (native via ash, headless).
    Vulkan,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "vulkan-backend")]
            Backend::Vulkan => true,
            #[cfg(not(feature = "vulkan-backend"))]
            Backend::Vulkan => false,
        }
    }

    /// Get the backend name for display.
    #[allow(dead_code)]
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Dummy => "dummy",
            Backend::Vulkan => "vulkan",
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// Input images created for a test, together with the handles to destroy.
pub struct TestInputs {
    pub inputs: DenoiserInputs,
    created: Vec<CreatedImage>,
}

/// Test context providing access to a backend and test resources.
pub struct TestContext {
    /// The backend being tested.
    #[allow(dead_code)]
    pub backend: Backend,
    /// Device the denoiser runs on.
    pub device: Arc<dyn ComputeBackend>,
    dummy: Option<Arc<DummyBackend>>,
    #[cfg(feature = "vulkan-backend")]
    vulkan: Option<Arc<VulkanBackend>>,
    shader: ShaderSource,
}

impl TestContext {
    /// Create a new test context for the given backend.
    ///
    /// Returns `None` if the backend is not available.
    pub fn new(backend: Backend) -> Option<Self> {
        init_logging();
        if !backend.is_available() {
            return None;
        }

        match backend {
            Backend::Dummy => {
                let dummy = Arc::new(DummyBackend::new());
                Some(Self {
                    backend,
                    device: dummy.clone(),
                    dummy: Some(dummy),
                    #[cfg(feature = "vulkan-backend")]
                    vulkan: None,
                    shader: ShaderSource::Spirv(vec![SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]),
                })
            }
            Backend::Vulkan => Self::vulkan(),
        }
    }

    #[cfg(all(feature = "vulkan-backend", feature = "wgsl-shaders"))]
    fn vulkan() -> Option<Self> {
        let vulkan = Arc::new(VulkanBackend::headless(true).ok()?);
        Some(Self {
            backend: Backend::Vulkan,
            device: vulkan.clone(),
            dummy: None,
            vulkan: Some(vulkan),
            shader: ShaderSource::Wgsl(DENOISER_WGSL.to_string()),
        })
    }

    #[cfg(not(all(feature = "vulkan-backend", feature = "wgsl-shaders")))]
    fn vulkan() -> Option<Self> {
        // No shader compiler to produce real SPIR-V.
        None
    }

    /// The dummy backend, for simulated-state assertions.
    pub fn dummy(&self) -> Option<&DummyBackend> {
        self.dummy.as_deref()
    }

    /// Validation problems reported so far by either backend.
    pub fn validation_issue_count(&self) -> usize {
        if let Some(dummy) = &self.dummy {
            return dummy.validation_messages().len();
        }
        #[cfg(feature = "vulkan-backend")]
        {
            if let Some(vulkan) = &self.vulkan {
                return vulkan.validation_message_count();
            }
        }
        0
    }

    /// Denoiser parameters using this backend's shader.
    pub fn params(&self) -> DenoiserParameters {
        DenoiserParameters::new()
            .with_label("test_denoiser")
            .with_shader(self.shader.clone())
    }

    /// Create the three input images the way a ray-tracing pass would.
    pub fn create_inputs(&self, extent: Extent2d) -> TestInputs {
        let formats = [
            ("color", ImageFormat::Rgba8Unorm),
            ("normals", ImageFormat::Rgba16Float),
            ("positions", ImageFormat::Rgba32Float),
        ];
        let created: Vec<CreatedImage> = formats
            .iter()
            .map(|(label, format)| {
                self.device
                    .create_image(
                        &ImageDescriptor::new_2d(extent, *format, ImageUsage::STORAGE)
                            .with_label(*label),
                    )
                    .expect("Failed to create input image")
            })
            .collect();

        let input = |index: usize| {
            InputImage::new(
                created[index].image,
                created[index].view,
                extent,
                formats[index].1,
            )
        };
        TestInputs {
            inputs: DenoiserInputs::new(input(0), input(1), input(2)),
            created,
        }
    }

    /// Destroy input images created by [`create_inputs`](Self::create_inputs).
    pub fn destroy_inputs(&self, inputs: TestInputs) {
        for created in inputs.created {
            self.device.destroy_image(created);
        }
    }

    /// Wait on `semaphore` the way the presenting queue would, then idle.
    #[allow(dead_code)]
    pub fn consume_semaphore(&self, semaphore: SemaphoreHandle) {
        self.enqueue_present_wait(semaphore);
        self.wait_idle();
    }

    /// Enqueue a graphics-queue wait on `semaphore` without blocking.
    #[allow(dead_code)]
    pub fn enqueue_present_wait(&self, semaphore: SemaphoreHandle) {
        if let Some(dummy) = &self.dummy {
            assert!(dummy.wait_semaphore(semaphore), "semaphore had no pending signal");
            return;
        }
        #[cfg(feature = "vulkan-backend")]
        {
            if let Some(vulkan) = &self.vulkan {
                use ash::vk::{self, Handle};

                let context = vulkan.context();
                let wait_semaphores = [vk::Semaphore::from_raw(semaphore.raw())];
                let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
                let submit_info = vk::SubmitInfo::default()
                    .wait_semaphores(&wait_semaphores)
                    .wait_dst_stage_mask(&wait_stages);
                unsafe {
                    context
                        .device
                        .queue_submit(context.graphics_queue, &[submit_info], vk::Fence::null())
                        .expect("Failed to submit semaphore wait");
                }
            }
        }
    }

    /// Signal `semaphore` from the graphics queue, as the ray-tracing pass would.
    #[allow(dead_code)]
    pub fn signal_from_graphics(&self, semaphore: SemaphoreHandle) {
        if let Some(dummy) = &self.dummy {
            dummy.signal_semaphore(semaphore);
            return;
        }
        #[cfg(feature = "vulkan-backend")]
        {
            if let Some(vulkan) = &self.vulkan {
                use ash::vk::{self, Handle};

                let context = vulkan.context();
                let signal_semaphores = [vk::Semaphore::from_raw(semaphore.raw())];
                let submit_info = vk::SubmitInfo::default().signal_semaphores(&signal_semaphores);
                unsafe {
                    context
                        .device
                        .queue_submit(context.graphics_queue, &[submit_info], vk::Fence::null())
                        .expect("Failed to submit semaphore signal");
                }
            }
        }
    }

    /// Block until the compute and graphics queues are idle.
    #[allow(dead_code)]
    pub fn wait_idle(&self) {
        for queue in [QueueKind::Compute, QueueKind::Graphics] {
            self.device
                .queue_wait_idle(queue)
                .expect("Failed to idle queue");
        }
    }
}

impl TestInputs {
    /// Handle of the color input image.
    #[allow(dead_code)]
    pub fn color_image(&self) -> ImageHandle {
        self.inputs.color.image
    }
}

/// Swapchain description with an RGBA8 format.
pub fn swapchain(width: u32, height: u32, image_count: u32) -> SwapchainInfo {
    SwapchainInfo::new(Extent2d::new(width, height), ImageFormat::Rgba8Unorm, image_count)
}
