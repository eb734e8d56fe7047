//! Arena of images keyed by [`ImageId`].
//!
//! Views, descriptor writes and barriers refer to images by id. The arena
//! is the single place where an image's layout changes: [`ResourceArena::transition`]
//! returns the barrier that performs the change and updates the tracked
//! layout in the same step.

use crate::backend::ComputeBackend;
use crate::barrier::ImageBarrier;
use crate::error::{DenoiseError, DenoiseResult};
use crate::external::InputImage;
use crate::types::{ImageDescriptor, ImageLayout};

use super::image::{Ownership, TrackedImage};

/// Identifier of an image inside a [`ResourceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u32);

impl ImageId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owns the denoiser's images and borrows the external inputs.
#[derive(Debug, Default)]
pub struct ResourceArena {
    slots: Vec<Option<TrackedImage>>,
}

impl ResourceArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an owned image. Its layout starts as `Undefined`.
    pub fn create_image(
        &mut self,
        backend: &dyn ComputeBackend,
        descriptor: &ImageDescriptor,
    ) -> DenoiseResult<ImageId> {
        if descriptor.extent.is_empty() {
            return Err(DenoiseError::InvalidParameter(format!(
                "image {:?} has empty extent {}",
                descriptor.label, descriptor.extent
            )));
        }

        let created = backend.create_image(descriptor)?;
        log::debug!(
            "Created image {:?} ({}, {:?}) -> {:?}",
            descriptor.label,
            descriptor.extent,
            descriptor.format,
            created.image
        );

        Ok(self.push(TrackedImage::new(
            descriptor.label.clone(),
            created,
            descriptor.extent,
            descriptor.format,
            Ownership::Owned,
            ImageLayout::Undefined,
        )))
    }

    /// Register an image produced elsewhere, in the layout its producer left it.
    pub fn register_external(&mut self, label: &str, input: &InputImage) -> ImageId {
        self.push(TrackedImage::new(
            Some(label.to_string()),
            input.created(),
            input.extent,
            input.format,
            Ownership::Borrowed,
            input.layout,
        ))
    }

    fn push(&mut self, image: TrackedImage) -> ImageId {
        let id = ImageId(self.slots.len() as u32);
        self.slots.push(Some(image));
        id
    }

    /// Look up an image.
    pub fn get(&self, id: ImageId) -> Option<&TrackedImage> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: ImageId) -> DenoiseResult<&mut TrackedImage> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| DenoiseError::InvalidParameter(format!("unknown image {:?}", id)))
    }

    /// Move an image to `new_layout`, returning the barrier that does so.
    ///
    /// A barrier is produced even when the layout does not change, so that
    /// writes of the previous user are made visible to the next one.
    pub fn transition(
        &mut self,
        id: ImageId,
        new_layout: ImageLayout,
    ) -> DenoiseResult<ImageBarrier> {
        let image = self.get_mut(id)?;
        let old_layout = image.layout();
        let barrier = ImageBarrier::between(image.image(), old_layout, new_layout);
        image.set_layout(new_layout);
        log::trace!(
            "Image {:?} ({:?}): {:?} -> {:?}",
            image.label(),
            image.image(),
            old_layout,
            new_layout
        );
        Ok(barrier)
    }

    /// Number of images currently held.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy owned images in reverse creation order and forget borrowed ones.
    pub fn release(&mut self, backend: &dyn ComputeBackend) {
        while let Some(slot) = self.slots.pop() {
            if let Some(image) = slot
                && image.ownership() == Ownership::Owned
            {
                log::debug!("Destroying image {:?} ({:?})", image.label(), image.image());
                backend.destroy_image(image.created());
            }
        }
    }
}

impl Drop for ResourceArena {
    fn drop(&mut self) {
        let owned = self
            .slots
            .iter()
            .flatten()
            .filter(|image| image.ownership() == Ownership::Owned)
            .count();
        if owned > 0 {
            log::warn!(
                "ResourceArena dropped with {} owned image(s) without calling release()",
                owned
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, ObjectKind};
    use crate::types::{AccessFlags, Extent2d, ImageFormat, ImageUsage, PipelineStages};

    fn storage_descriptor(label: &str) -> ImageDescriptor {
        ImageDescriptor::new_2d(
            Extent2d::new(32, 16),
            ImageFormat::Rgba8Unorm,
            ImageUsage::STORAGE,
        )
        .with_label(label)
    }

    #[test]
    fn test_transition_updates_tracked_layout() {
        let backend = DummyBackend::new();
        let mut arena = ResourceArena::new();
        let id = arena
            .create_image(&backend, &storage_descriptor("target"))
            .unwrap();
        assert_eq!(arena.get(id).unwrap().layout(), ImageLayout::Undefined);

        let barrier = arena.transition(id, ImageLayout::General).unwrap();
        assert_eq!(barrier.old_layout, ImageLayout::Undefined);
        assert_eq!(barrier.new_layout, ImageLayout::General);
        assert!(barrier.src_access.is_empty());
        assert_eq!(
            barrier.dst_access,
            AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE
        );
        assert_eq!(barrier.dst_stage, PipelineStages::COMPUTE_SHADER);
        assert_eq!(arena.get(id).unwrap().layout(), ImageLayout::General);

        // Same-layout transitions still produce a barrier.
        let barrier = arena.transition(id, ImageLayout::General).unwrap();
        assert_eq!(barrier.old_layout, ImageLayout::General);

        arena.release(&backend);
    }

    #[test]
    fn test_release_skips_borrowed_images() {
        let backend = DummyBackend::new();
        let external = backend.create_image(&storage_descriptor("color")).unwrap();
        let input = InputImage::new(
            external.image,
            external.view,
            Extent2d::new(32, 16),
            ImageFormat::Rgba8Unorm,
        );

        let mut arena = ResourceArena::new();
        let borrowed = arena.register_external("color", &input);
        arena
            .create_image(&backend, &storage_descriptor("first"))
            .unwrap();
        arena
            .create_image(&backend, &storage_descriptor("second"))
            .unwrap();
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.get(borrowed).unwrap().ownership(), Ownership::Borrowed);

        arena.release(&backend);
        assert!(arena.is_empty());
        assert!(backend.is_alive(external.image.raw()));
        assert_eq!(backend.live_count(ObjectKind::Image), 1);

        backend.destroy_image(external);
        assert!(backend.validation_messages().is_empty());
    }

    #[test]
    fn test_release_reverse_order() {
        let backend = DummyBackend::new();
        let mut arena = ResourceArena::new();
        let first = arena
            .create_image(&backend, &storage_descriptor("first"))
            .unwrap();
        let second = arena
            .create_image(&backend, &storage_descriptor("second"))
            .unwrap();
        let first_raw = arena.get(first).unwrap().image().raw();
        let second_raw = arena.get(second).unwrap().image().raw();

        arena.release(&backend);

        let destroyed: Vec<u64> = backend
            .destruction_log()
            .into_iter()
            .filter(|(kind, _)| *kind == ObjectKind::Image)
            .map(|(_, raw)| raw)
            .collect();
        assert_eq!(destroyed, vec![second_raw, first_raw]);
    }

    #[test]
    fn test_empty_extent_rejected() {
        let backend = DummyBackend::new();
        let mut arena = ResourceArena::new();
        let descriptor = ImageDescriptor::new_2d(
            Extent2d::new(0, 16),
            ImageFormat::Rgba8Unorm,
            ImageUsage::STORAGE,
        );
        assert!(matches!(
            arena.create_image(&backend, &descriptor),
            Err(DenoiseError::InvalidParameter(_))
        ));
        assert_eq!(backend.live_object_count(), 0);
    }

    #[test]
    fn test_unknown_id() {
        let mut arena = ResourceArena::new();
        assert!(arena.transition(ImageId(3), ImageLayout::General).is_err());
    }
}
