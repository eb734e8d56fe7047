//! Images tracked together with their current layout.

use crate::backend::{CreatedImage, ImageHandle, ImageViewHandle};
use crate::types::{Extent2d, ImageFormat, ImageLayout};

/// Who destroys an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Created by the arena and destroyed by it.
    Owned,
    /// Produced by another pass. Never destroyed by the arena.
    Borrowed,
}

/// A GPU image, its view and the layout it will be in when the last
/// recorded barrier has executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedImage {
    label: Option<String>,
    image: ImageHandle,
    view: ImageViewHandle,
    extent: Extent2d,
    format: ImageFormat,
    ownership: Ownership,
    layout: ImageLayout,
}

impl TrackedImage {
    pub(super) fn new(
        label: Option<String>,
        created: CreatedImage,
        extent: Extent2d,
        format: ImageFormat,
        ownership: Ownership,
        layout: ImageLayout,
    ) -> Self {
        Self {
            label,
            image: created.image,
            view: created.view,
            extent,
            format,
            ownership,
            layout,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn image(&self) -> ImageHandle {
        self.image
    }

    pub fn view(&self) -> ImageViewHandle {
        self.view
    }

    pub fn extent(&self) -> Extent2d {
        self.extent
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Layout after the most recently issued barrier.
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub(super) fn set_layout(&mut self, layout: ImageLayout) {
        self.layout = layout;
    }

    pub(super) fn created(&self) -> CreatedImage {
        CreatedImage {
            image: self.image,
            view: self.view,
        }
    }
}
