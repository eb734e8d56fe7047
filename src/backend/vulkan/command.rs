//! Vulkan command pool creation and script translation.

use ash::vk;
use ash::vk::Handle;

use crate::barrier::ImageBarrier;
use crate::command::{CommandScript, ComputeCommand};
use crate::error::DenoiseError;

use super::conversion::{
    convert_access_flags, convert_image_layout, convert_pipeline_stages, creation_error,
};

/// Create a command pool whose buffers can be reset individually.
pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<vk::CommandPool, DenoiseError> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe { device.create_command_pool(&pool_info, None) }
        .map_err(|e| creation_error("create command pool", e))
}

/// Allocate one primary command buffer.
pub fn allocate_primary(
    device: &ash::Device,
    pool: vk::CommandPool,
) -> Result<vk::CommandBuffer, DenoiseError> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
        .map_err(|e| creation_error("allocate command buffer", e))?;
    buffers.into_iter().next().ok_or_else(|| {
        DenoiseError::ResourceCreationFailed("Driver returned no command buffer".to_string())
    })
}

/// Record `script` into `cmd`, replacing its previous contents.
///
/// The buffer is begun with `SIMULTANEOUS_USE` since the same recording is
/// resubmitted every frame, possibly while the previous submission is
/// still executing.
pub fn record_script(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    script: &CommandScript,
) -> Result<(), DenoiseError> {
    unsafe {
        device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .map_err(|e| creation_error("reset command buffer", e))?;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
        device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(|e| creation_error("begin command buffer", e))?;
    }

    let mut bound_layout = vk::PipelineLayout::null();
    for command in script {
        match command {
            ComputeCommand::PipelineBarrier {
                src_stage,
                dst_stage,
                image_barriers,
            } => {
                let barriers: Vec<vk::ImageMemoryBarrier> =
                    image_barriers.iter().map(image_memory_barrier).collect();
                unsafe {
                    device.cmd_pipeline_barrier(
                        cmd,
                        convert_pipeline_stages(*src_stage),
                        convert_pipeline_stages(*dst_stage),
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &barriers,
                    );
                }
            }
            ComputeCommand::BindPipeline(pipeline) => unsafe {
                device.cmd_bind_pipeline(
                    cmd,
                    vk::PipelineBindPoint::COMPUTE,
                    vk::Pipeline::from_raw(pipeline.raw()),
                );
            },
            ComputeCommand::BindDescriptorSet { layout, set } => {
                bound_layout = vk::PipelineLayout::from_raw(layout.raw());
                unsafe {
                    device.cmd_bind_descriptor_sets(
                        cmd,
                        vk::PipelineBindPoint::COMPUTE,
                        bound_layout,
                        0,
                        &[vk::DescriptorSet::from_raw(set.raw())],
                        &[],
                    );
                }
            }
            ComputeCommand::Dispatch { x, y, z } => unsafe {
                device.cmd_dispatch(cmd, *x, *y, *z);
            },
        }
    }

    log::trace!(
        "Recorded {} command(s) into {:?} (layout {:?})",
        script.len(),
        cmd,
        bound_layout
    );

    unsafe { device.end_command_buffer(cmd) }
        .map_err(|e| creation_error("end command buffer", e))
}

fn image_memory_barrier(barrier: &ImageBarrier) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(convert_image_layout(barrier.old_layout))
        .new_layout(convert_image_layout(barrier.new_layout))
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(vk::Image::from_raw(barrier.image.raw()))
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        })
        .src_access_mask(convert_access_flags(barrier.src_access))
        .dst_access_mask(convert_access_flags(barrier.dst_access))
}
