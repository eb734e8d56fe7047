//! Image barrier generation and batching.
//!
//! Barriers for all images a dispatch touches are collected into a
//! [`BarrierBatch`] and emitted as a single pipeline-barrier command.

use crate::backend::ImageHandle;
use crate::command::ComputeCommand;
use crate::types::{AccessFlags, ImageLayout, PipelineStages};

/// A single image layout transition with its access and stage scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub src_stage: PipelineStages,
    pub dst_stage: PipelineStages,
}

impl ImageBarrier {
    /// Barrier moving `image` from `old_layout` to `new_layout`.
    pub fn between(image: ImageHandle, old_layout: ImageLayout, new_layout: ImageLayout) -> Self {
        Self {
            image,
            old_layout,
            new_layout,
            src_access: old_layout.src_access_mask(),
            dst_access: new_layout.dst_access_mask(),
            src_stage: old_layout.src_stage(),
            dst_stage: new_layout.dst_stage(),
        }
    }

    /// Returns true if the previous contents are discarded.
    pub fn discards_contents(&self) -> bool {
        self.old_layout == ImageLayout::Undefined
    }
}

/// A batch of image barriers submitted together.
#[derive(Debug, Clone, Default)]
pub struct BarrierBatch {
    barriers: Vec<ImageBarrier>,
    /// Union of all source stages.
    src_stage: PipelineStages,
    /// Union of all destination stages.
    dst_stage: PipelineStages,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a barrier. A later barrier on the same image replaces the earlier one.
    pub fn add(&mut self, barrier: ImageBarrier) {
        match self.barriers.iter_mut().find(|b| b.image == barrier.image) {
            Some(existing) => *existing = barrier,
            None => self.barriers.push(barrier),
        }
        self.src_stage |= barrier.src_stage;
        self.dst_stage |= barrier.dst_stage;
    }

    /// Widen the source scope so the batch runs after `stage` completes.
    ///
    /// A semaphore wait only blocks the stages it names, so the barriers
    /// must include those stages in their first scope to be ordered after it.
    pub fn chain_after(&mut self, stage: PipelineStages) {
        self.src_stage |= stage;
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn barriers(&self) -> &[ImageBarrier] {
        &self.barriers
    }

    /// Convert into one pipeline-barrier command, or nothing if empty.
    pub fn into_command(self) -> Option<ComputeCommand> {
        if self.is_empty() {
            return None;
        }
        Some(ComputeCommand::PipelineBarrier {
            src_stage: self.src_stage,
            dst_stage: self.dst_stage,
            image_barriers: self.barriers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_unions_stages() {
        let mut batch = BarrierBatch::new();
        batch.add(ImageBarrier::between(
            ImageHandle::from_raw(1),
            ImageLayout::Undefined,
            ImageLayout::General,
        ));
        batch.add(ImageBarrier::between(
            ImageHandle::from_raw(2),
            ImageLayout::General,
            ImageLayout::General,
        ));
        assert_eq!(batch.len(), 2);

        let Some(ComputeCommand::PipelineBarrier {
            src_stage,
            dst_stage,
            image_barriers,
        }) = batch.into_command()
        else {
            panic!("expected a pipeline barrier");
        };
        assert_eq!(
            src_stage,
            PipelineStages::TOP_OF_PIPE | PipelineStages::ALL_COMMANDS
        );
        assert_eq!(dst_stage, PipelineStages::COMPUTE_SHADER);
        assert_eq!(image_barriers.len(), 2);
        assert!(image_barriers[0].discards_contents());
        assert!(!image_barriers[1].discards_contents());
    }

    #[test]
    fn test_chain_after_keeps_empty_access() {
        let mut batch = BarrierBatch::new();
        batch.add(ImageBarrier::between(
            ImageHandle::from_raw(3),
            ImageLayout::Undefined,
            ImageLayout::General,
        ));
        batch.chain_after(PipelineStages::COMPUTE_SHADER);

        let Some(ComputeCommand::PipelineBarrier {
            src_stage,
            image_barriers,
            ..
        }) = batch.into_command()
        else {
            panic!("expected a pipeline barrier");
        };
        assert_eq!(
            src_stage,
            PipelineStages::TOP_OF_PIPE | PipelineStages::COMPUTE_SHADER
        );
        assert!(image_barriers[0].src_access.is_empty());
    }

    #[test]
    fn test_same_image_replaced() {
        let mut batch = BarrierBatch::new();
        let image = ImageHandle::from_raw(9);
        batch.add(ImageBarrier::between(
            image,
            ImageLayout::Undefined,
            ImageLayout::TransferDst,
        ));
        batch.add(ImageBarrier::between(
            image,
            ImageLayout::Undefined,
            ImageLayout::General,
        ));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.barriers()[0].new_layout, ImageLayout::General);
    }

    #[test]
    fn test_empty_batch_emits_nothing() {
        assert!(BarrierBatch::new().into_command().is_none());
    }
}
