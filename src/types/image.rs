//! Image formats, extents and descriptors.

use bitflags::bitflags;

/// Image format enumeration.
///
/// Covers the swapchain formats the output image is created with and the
/// formats a ray-tracing pass typically writes its G-buffer channels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ImageFormat {
    /// 8-bit RGBA, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA, unsigned normalized, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA, unsigned normalized, sRGB.
    Bgra8UnormSrgb,
    /// 16-bit RGBA, float.
    Rgba16Float,
    /// 32-bit RGBA, float.
    Rgba32Float,
    /// 32-bit red channel, float.
    R32Float,
}

impl ImageFormat {
    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R32Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Returns true for sRGB-encoded formats.
    ///
    /// Most devices cannot bind these as storage images.
    pub fn is_srgb(&self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }
}

bitflags! {
    /// Usage flags for images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        /// Image can be bound as a storage image.
        const STORAGE = 1 << 0;
        /// Image can be sampled in a shader.
        const SAMPLED = 1 << 1;
        /// Image can be copied from.
        const TRANSFER_SRC = 1 << 2;
        /// Image can be copied to.
        const TRANSFER_DST = 1 << 3;
        /// Image can be used as a color attachment.
        const COLOR_ATTACHMENT = 1 << 4;
    }
}

impl Default for ImageUsage {
    fn default() -> Self {
        Self::STORAGE
    }
}

/// 2D extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2d {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered by this extent.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Component-wise minimum of two extents.
    pub fn min(self, other: Self) -> Self {
        Self::new(self.width.min(other.width), self.height.min(other.height))
    }
}

impl std::fmt::Display for Extent2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Descriptor for creating a 2D image together with its default view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    /// Debug label for the image.
    pub label: Option<String>,
    /// Size of the image.
    pub extent: Extent2d,
    /// Image format.
    pub format: ImageFormat,
    /// Usage flags.
    pub usage: ImageUsage,
}

impl ImageDescriptor {
    /// Create a new 2D image descriptor.
    pub fn new_2d(extent: Extent2d, format: ImageFormat, usage: ImageUsage) -> Self {
        Self {
            label: None,
            extent,
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size() {
        assert_eq!(ImageFormat::Rgba8Unorm.block_size(), 4);
        assert_eq!(ImageFormat::Rgba16Float.block_size(), 8);
        assert_eq!(ImageFormat::Rgba32Float.block_size(), 16);
    }

    #[test]
    fn test_extent() {
        let extent = Extent2d::new(1600, 900);
        assert!(!extent.is_empty());
        assert_eq!(extent.area(), 1_440_000);
        assert_eq!(extent.to_string(), "1600x900");
        assert!(Extent2d::new(0, 900).is_empty());
        assert_eq!(extent.min(Extent2d::new(2000, 800)), Extent2d::new(1600, 800));
    }

    #[test]
    fn test_descriptor_builder() {
        let desc = ImageDescriptor::new_2d(
            Extent2d::new(64, 64),
            ImageFormat::Rgba8Unorm,
            ImageUsage::STORAGE | ImageUsage::TRANSFER_SRC,
        )
        .with_label("output");
        assert_eq!(desc.label.as_deref(), Some("output"));
        assert!(desc.usage.contains(ImageUsage::TRANSFER_SRC));
    }
}
