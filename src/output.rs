//! The denoised output image.

use crate::backend::{ImageHandle, ImageViewHandle};
use crate::external::SwapchainInfo;
use crate::resources::TrackedImage;
use crate::types::{Extent2d, ImageDescriptor, ImageFormat, ImageLayout, ImageUsage};

/// Usage of the output image: written by the shader, copied out by the frame driver.
pub const OUTPUT_USAGE: ImageUsage = ImageUsage::STORAGE.union(ImageUsage::TRANSFER_SRC);

/// Descriptor of the output image for a swapchain configuration.
pub fn output_descriptor(label: &str, swapchain: &SwapchainInfo) -> ImageDescriptor {
    ImageDescriptor::new_2d(swapchain.extent, swapchain.format, OUTPUT_USAGE)
        .with_label(format!("{label}_output"))
}

/// The denoised result as seen by the frame driver.
///
/// Contents are valid only after the signal semaphore has been waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputImage {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub extent: Extent2d,
    pub format: ImageFormat,
    /// Layout after the recorded command buffer has executed.
    pub layout: ImageLayout,
}

impl From<&TrackedImage> for OutputImage {
    fn from(image: &TrackedImage) -> Self {
        Self {
            image: image.image(),
            view: image.view(),
            extent: image.extent(),
            format: image.format(),
            layout: image.layout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_matches_swapchain() {
        let swapchain = SwapchainInfo::new(Extent2d::new(1600, 900), ImageFormat::Bgra8Unorm, 3);
        let descriptor = output_descriptor("denoiser", &swapchain);
        assert_eq!(descriptor.extent, swapchain.extent);
        assert_eq!(descriptor.format, ImageFormat::Bgra8Unorm);
        assert_eq!(
            descriptor.usage,
            ImageUsage::STORAGE | ImageUsage::TRANSFER_SRC
        );
        assert_eq!(descriptor.label.as_deref(), Some("denoiser_output"));
    }
}
