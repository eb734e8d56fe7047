//! Descriptions of the resources other parts of the frame graph hand to the denoiser.

use crate::backend::{CreatedImage, ImageHandle, ImageViewHandle};
use crate::error::{DenoiseError, DenoiseResult};
use crate::types::{Extent2d, ImageFormat, ImageLayout};

/// The parts of the swapchain configuration the denoiser depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapchainInfo {
    /// Size of the swapchain images, and of the output image.
    pub extent: Extent2d,
    /// Format of the swapchain images, and of the output image.
    pub format: ImageFormat,
    /// Number of swapchain images. One descriptor set is allocated per image.
    pub image_count: u32,
}

impl SwapchainInfo {
    pub fn new(extent: Extent2d, format: ImageFormat, image_count: u32) -> Self {
        Self {
            extent,
            format,
            image_count,
        }
    }

    /// Reject configurations the denoiser cannot be built for.
    pub fn validate(&self) -> DenoiseResult<()> {
        if self.extent.is_empty() {
            return Err(DenoiseError::InvalidParameter(format!(
                "swapchain extent {} is empty",
                self.extent
            )));
        }
        if self.image_count == 0 {
            return Err(DenoiseError::InvalidParameter(
                "swapchain image count is zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// An image produced by the ray-tracing pass.
///
/// The denoiser borrows it: the image and view are never destroyed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputImage {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub extent: Extent2d,
    pub format: ImageFormat,
    /// Layout the producer leaves the image in. `Undefined` lets the
    /// denoiser discard the previous layout when transitioning.
    pub layout: ImageLayout,
}

impl InputImage {
    pub fn new(
        image: ImageHandle,
        view: ImageViewHandle,
        extent: Extent2d,
        format: ImageFormat,
    ) -> Self {
        Self {
            image,
            view,
            extent,
            format,
            layout: ImageLayout::Undefined,
        }
    }

    /// Declare the layout the producer leaves the image in.
    pub fn with_layout(mut self, layout: ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    pub(crate) fn created(&self) -> CreatedImage {
        CreatedImage {
            image: self.image,
            view: self.view,
        }
    }
}

/// The three images the denoiser shader reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DenoiserInputs {
    /// Path-traced color.
    pub color: InputImage,
    /// Surface normals.
    pub normals: InputImage,
    /// World positions.
    pub positions: InputImage,
}

impl DenoiserInputs {
    pub fn new(color: InputImage, normals: InputImage, positions: InputImage) -> Self {
        Self {
            color,
            normals,
            positions,
        }
    }

    /// Inputs with their role names, in barrier order.
    pub fn named(&self) -> [(&'static str, &InputImage); 3] {
        [
            ("color", &self.color),
            ("positions", &self.positions),
            ("normals", &self.normals),
        ]
    }

    /// Warn about inputs that do not cover the output extent.
    ///
    /// Out-of-bounds storage reads return zero, so this is not fatal.
    pub fn check_extent(&self, extent: Extent2d) {
        for (name, input) in self.named() {
            if input.extent.width < extent.width || input.extent.height < extent.height {
                log::warn!(
                    "Denoiser input '{}' is {} but the output is {}",
                    name,
                    input.extent,
                    extent
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapchain_validation() {
        let ok = SwapchainInfo::new(Extent2d::new(1600, 900), ImageFormat::Rgba8Unorm, 3);
        assert!(ok.validate().is_ok());

        let empty = SwapchainInfo::new(Extent2d::new(0, 900), ImageFormat::Rgba8Unorm, 3);
        assert!(matches!(
            empty.validate(),
            Err(DenoiseError::InvalidParameter(_))
        ));

        let no_images = SwapchainInfo::new(Extent2d::new(1600, 900), ImageFormat::Rgba8Unorm, 0);
        assert!(no_images.validate().is_err());
    }

    #[test]
    fn test_input_layout_defaults_to_undefined() {
        let input = InputImage::new(
            ImageHandle::from_raw(1),
            ImageViewHandle::from_raw(2),
            Extent2d::new(8, 8),
            ImageFormat::Rgba32Float,
        );
        assert_eq!(input.layout, ImageLayout::Undefined);
        assert_eq!(
            input.with_layout(ImageLayout::General).layout,
            ImageLayout::General
        );
    }
}
