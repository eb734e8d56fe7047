//! Common types and descriptors shared by the orchestrator and the backends.
//!
//! This module contains format enums, usage and synchronization flags, image
//! layouts and the descriptor binding declarations of the denoiser shader.

mod binding;
mod image;
mod layout;

pub use binding::{DescriptorBinding, DescriptorKind, ImageSlot, ShaderStages};
pub use image::{Extent2d, ImageDescriptor, ImageFormat, ImageUsage};
pub use layout::{AccessFlags, ImageLayout, PipelineStages};
