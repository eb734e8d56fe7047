//! Image layouts and the synchronization masks derived from them.
//!
//! Every image tracked by the crate carries one of these layouts. Barriers
//! are built from the (old, new) pair: the old layout supplies the source
//! access/stage, the new layout the destination access/stage.

use bitflags::bitflags;

bitflags! {
    /// Memory access kinds that a barrier orders.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        /// Shader storage or sampled read.
        const SHADER_READ = 1 << 0;
        /// Shader storage write.
        const SHADER_WRITE = 1 << 1;
        /// Color attachment write.
        const COLOR_ATTACHMENT_WRITE = 1 << 2;
        /// Transfer read.
        const TRANSFER_READ = 1 << 3;
        /// Transfer write.
        const TRANSFER_WRITE = 1 << 4;
        /// Any memory read.
        const MEMORY_READ = 1 << 5;
        /// Any memory write.
        const MEMORY_WRITE = 1 << 6;
    }
}

bitflags! {
    /// Pipeline stages that a barrier or semaphore wait synchronizes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const FRAGMENT_SHADER = 1 << 1;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 2;
        const COMPUTE_SHADER = 1 << 3;
        const RAY_TRACING_SHADER = 1 << 4;
        const TRANSFER = 1 << 5;
        const BOTTOM_OF_PIPE = 1 << 6;
        const ALL_COMMANDS = 1 << 7;
    }
}

impl Default for PipelineStages {
    fn default() -> Self {
        Self::empty()
    }
}

/// Image layout states.
///
/// These correspond to `VkImageLayout` values restricted to the ones a
/// compute pass and its neighbours in the frame graph use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents undefined. Transitioning out of it discards the contents.
    #[default]
    Undefined,
    /// General layout, required for storage image access.
    General,
    /// Optimal for shader sampling.
    ShaderReadOnly,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal for transfer source operations.
    TransferSrc,
    /// Optimal for transfer destination operations.
    TransferDst,
    /// Optimal for presentation.
    PresentSrc,
}

impl ImageLayout {
    /// Access mask of the previous user when leaving this layout.
    pub fn src_access_mask(self) -> AccessFlags {
        match self {
            Self::Undefined | Self::PresentSrc => AccessFlags::empty(),
            Self::General => AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            Self::ShaderReadOnly => AccessFlags::SHADER_READ,
            Self::ColorAttachment => AccessFlags::COLOR_ATTACHMENT_WRITE,
            Self::TransferSrc => AccessFlags::TRANSFER_READ,
            Self::TransferDst => AccessFlags::TRANSFER_WRITE,
        }
    }

    /// Access mask of the next user when entering this layout.
    pub fn dst_access_mask(self) -> AccessFlags {
        match self {
            Self::Undefined | Self::PresentSrc => AccessFlags::empty(),
            Self::General => AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            Self::ShaderReadOnly => AccessFlags::SHADER_READ,
            Self::ColorAttachment => AccessFlags::COLOR_ATTACHMENT_WRITE,
            Self::TransferSrc => AccessFlags::TRANSFER_READ,
            Self::TransferDst => AccessFlags::TRANSFER_WRITE,
        }
    }

    /// Stage of the previous user when leaving this layout.
    ///
    /// `General` images may have been written by any earlier pass (ray
    /// tracing, compute or transfer), so the source scope covers all commands.
    pub fn src_stage(self) -> PipelineStages {
        match self {
            Self::Undefined => PipelineStages::TOP_OF_PIPE,
            Self::General => PipelineStages::ALL_COMMANDS,
            Self::ShaderReadOnly => PipelineStages::FRAGMENT_SHADER,
            Self::ColorAttachment => PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            Self::TransferSrc | Self::TransferDst => PipelineStages::TRANSFER,
            Self::PresentSrc => PipelineStages::BOTTOM_OF_PIPE,
        }
    }

    /// Stage of the next user when entering this layout.
    pub fn dst_stage(self) -> PipelineStages {
        match self {
            Self::Undefined => PipelineStages::TOP_OF_PIPE,
            Self::General => PipelineStages::COMPUTE_SHADER,
            Self::ShaderReadOnly => PipelineStages::FRAGMENT_SHADER,
            Self::ColorAttachment => PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            Self::TransferSrc | Self::TransferDst => PipelineStages::TRANSFER,
            Self::PresentSrc => PipelineStages::BOTTOM_OF_PIPE,
        }
    }

    /// Returns true if a storage image can be accessed in this layout.
    pub fn allows_storage_access(self) -> bool {
        self == Self::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_masks() {
        let rw = AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE;
        assert_eq!(ImageLayout::General.dst_access_mask(), rw);
        assert_eq!(ImageLayout::General.src_access_mask(), rw);
        assert_eq!(ImageLayout::General.dst_stage(), PipelineStages::COMPUTE_SHADER);
        assert_eq!(ImageLayout::General.src_stage(), PipelineStages::ALL_COMMANDS);
    }

    #[test]
    fn test_undefined_has_no_prior_access() {
        assert!(ImageLayout::Undefined.src_access_mask().is_empty());
        assert_eq!(ImageLayout::Undefined.src_stage(), PipelineStages::TOP_OF_PIPE);
        assert_eq!(ImageLayout::default(), ImageLayout::Undefined);
    }

    #[test]
    fn test_storage_access() {
        assert!(ImageLayout::General.allows_storage_access());
        assert!(!ImageLayout::ShaderReadOnly.allows_storage_access());
        assert!(!ImageLayout::Undefined.allows_storage_access());
    }
}
