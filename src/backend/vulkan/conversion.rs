//! Type conversions between denoiser types and Vulkan types.

use ash::vk;

use crate::error::DenoiseError;
use crate::types::{
    AccessFlags, DescriptorKind, ImageFormat, ImageLayout, ImageUsage, PipelineStages,
    ShaderStages,
};

/// Convert ImageFormat to Vulkan format.
pub fn convert_image_format(format: ImageFormat) -> vk::Format {
    match format {
        ImageFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        ImageFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        ImageFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        ImageFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        ImageFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        ImageFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        ImageFormat::R32Float => vk::Format::R32_SFLOAT,
    }
}

/// Convert ImageUsage flags to Vulkan image usage flags.
pub fn convert_image_usage(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut result = vk::ImageUsageFlags::empty();

    if usage.contains(ImageUsage::STORAGE) {
        result |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(ImageUsage::SAMPLED) {
        result |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(ImageUsage::TRANSFER_SRC) {
        result |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(ImageUsage::TRANSFER_DST) {
        result |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(ImageUsage::COLOR_ATTACHMENT) {
        result |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }

    result
}

pub fn convert_image_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn convert_access_flags(access: AccessFlags) -> vk::AccessFlags {
    let mut result = vk::AccessFlags::empty();

    if access.contains(AccessFlags::SHADER_READ) {
        result |= vk::AccessFlags::SHADER_READ;
    }
    if access.contains(AccessFlags::SHADER_WRITE) {
        result |= vk::AccessFlags::SHADER_WRITE;
    }
    if access.contains(AccessFlags::COLOR_ATTACHMENT_WRITE) {
        result |= vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if access.contains(AccessFlags::TRANSFER_READ) {
        result |= vk::AccessFlags::TRANSFER_READ;
    }
    if access.contains(AccessFlags::TRANSFER_WRITE) {
        result |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if access.contains(AccessFlags::MEMORY_READ) {
        result |= vk::AccessFlags::MEMORY_READ;
    }
    if access.contains(AccessFlags::MEMORY_WRITE) {
        result |= vk::AccessFlags::MEMORY_WRITE;
    }

    result
}

/// Convert PipelineStages to Vulkan stage flags.
///
/// An empty mask maps to `TOP_OF_PIPE`, which Vulkan accepts where a
/// zero mask would be invalid.
pub fn convert_pipeline_stages(stages: PipelineStages) -> vk::PipelineStageFlags {
    let mut result = vk::PipelineStageFlags::empty();

    if stages.contains(PipelineStages::TOP_OF_PIPE) {
        result |= vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    if stages.contains(PipelineStages::FRAGMENT_SHADER) {
        result |= vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if stages.contains(PipelineStages::COLOR_ATTACHMENT_OUTPUT) {
        result |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    if stages.contains(PipelineStages::COMPUTE_SHADER) {
        result |= vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if stages.contains(PipelineStages::RAY_TRACING_SHADER) {
        result |= vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR;
    }
    if stages.contains(PipelineStages::TRANSFER) {
        result |= vk::PipelineStageFlags::TRANSFER;
    }
    if stages.contains(PipelineStages::BOTTOM_OF_PIPE) {
        result |= vk::PipelineStageFlags::BOTTOM_OF_PIPE;
    }
    if stages.contains(PipelineStages::ALL_COMMANDS) {
        result |= vk::PipelineStageFlags::ALL_COMMANDS;
    }

    if result.is_empty() {
        vk::PipelineStageFlags::TOP_OF_PIPE
    } else {
        result
    }
}

pub fn convert_descriptor_kind(kind: DescriptorKind) -> vk::DescriptorType {
    match kind {
        DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorKind::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
    }
}

pub fn convert_shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut result = vk::ShaderStageFlags::empty();

    if stages.contains(ShaderStages::VERTEX) {
        result |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        result |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        result |= vk::ShaderStageFlags::COMPUTE;
    }

    result
}

/// Map a failed creation call to a denoiser error.
pub fn creation_error(what: &str, result: vk::Result) -> DenoiseError {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            DenoiseError::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => DenoiseError::DeviceLost,
        other => DenoiseError::ResourceCreationFailed(format!("Failed to {}: {:?}", what, other)),
    }
}

/// Map a failed descriptor-set allocation.
pub fn allocation_error(result: vk::Result) -> DenoiseError {
    match result {
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
            DenoiseError::DescriptorPoolExhausted(format!("{:?}", result))
        }
        other => creation_error("allocate descriptor sets", other),
    }
}

/// Map a failed queue operation.
pub fn submission_error(what: &str, result: vk::Result) -> DenoiseError {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            DenoiseError::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => DenoiseError::DeviceLost,
        other => DenoiseError::SubmissionFailed(format!("Failed to {}: {:?}", what, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_layout_access() {
        let layout = ImageLayout::General;
        assert_eq!(convert_image_layout(layout), vk::ImageLayout::GENERAL);
        assert_eq!(
            convert_access_flags(layout.dst_access_mask()),
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
        );
        assert_eq!(
            convert_pipeline_stages(layout.dst_stage()),
            vk::PipelineStageFlags::COMPUTE_SHADER
        );
    }

    #[test]
    fn test_empty_stage_mask() {
        assert_eq!(
            convert_pipeline_stages(PipelineStages::empty()),
            vk::PipelineStageFlags::TOP_OF_PIPE
        );
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            creation_error("create image", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            DenoiseError::OutOfMemory
        );
        assert_eq!(
            submission_error("submit", vk::Result::ERROR_DEVICE_LOST),
            DenoiseError::DeviceLost
        );
        assert!(matches!(
            allocation_error(vk::Result::ERROR_OUT_OF_POOL_MEMORY),
            DenoiseError::DescriptorPoolExhausted(_)
        ));
        assert!(matches!(
            creation_error("create pipeline", vk::Result::ERROR_INITIALIZATION_FAILED),
            DenoiseError::ResourceCreationFailed(_)
        ));
    }
}
