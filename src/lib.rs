//! RedLilium Denoiser - compute-pipeline orchestration for a screen-space denoiser pass
//!
//! The denoiser consumes the color, normal and position images produced by a
//! ray-tracing pass and writes a denoised image of the swapchain's size. This
//! crate owns everything around the shader: the output image, the compute
//! pipeline object, one descriptor set per swapchain image, a pre-recorded
//! command buffer with the layout barriers and the dispatch, and the
//! semaphore that hands the result to the presenting queue.
//!
//! # Backends
//! - **Vulkan** (`vulkan-backend`, default): ash + gpu-allocator, either on a
//!   device shared with the host renderer or on a headless device
//! - **Dummy** (always available): a simulated device that tracks handles,
//!   image layouts and semaphores and reports misuse, used by the tests
//!
//! # Example
//!
//! ```ignore
//! use redlilium_denoiser::{
//!     BackendPreference, Denoiser, DenoiserInputs, DenoiserParameters, SemaphoreWait,
//!     SwapchainInfo, create_backend,
//! };
//!
//! let backend = create_backend(BackendPreference::Auto, cfg!(debug_assertions))?;
//! let mut denoiser = Denoiser::new(backend, swapchain, inputs, DenoiserParameters::new())?;
//!
//! // Each frame, after the ray-tracing pass was submitted:
//! denoiser.submit(Some(SemaphoreWait::new(ray_tracing_done)))?;
//! let wait_on = denoiser.signal_semaphore()?;
//! // ... enqueue a wait on `wait_on` before presenting, then:
//! denoiser.signal_consumed();
//! ```

pub mod backend;
pub mod barrier;
pub mod command;
pub mod config;
pub mod denoiser;
pub mod descriptor;
pub mod error;
pub mod external;
pub mod output;
pub mod pipeline;
pub mod profiling;
pub mod resources;
pub mod shader;
pub mod sync;
pub mod types;

pub use backend::{BackendPreference, ComputeBackend, QueueKind, create_backend, has_gpu_backend};
pub use config::{DenoiserParameters, DispatchRounding, WorkgroupSize};
pub use denoiser::{Denoiser, DenoiserState};
pub use error::{DenoiseError, DenoiseResult};
pub use external::{DenoiserInputs, InputImage, SwapchainInfo};
pub use output::OutputImage;
pub use shader::ShaderSource;
pub use sync::SemaphoreWait;
pub use types::{Extent2d, ImageFormat, ImageLayout, PipelineStages};
