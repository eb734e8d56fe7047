//! GPU memory allocator integration using gpu-allocator.

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};

use crate::error::DenoiseError;

/// Create a memory allocator for the Vulkan device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> Result<Allocator, DenoiseError> {
    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        DenoiseError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
    })?;

    Ok(allocator)
}

/// Allocate device-local memory for an optimally tiled image.
pub fn allocate_image_memory(
    allocator: &mut Allocator,
    name: &str,
    requirements: vk::MemoryRequirements,
) -> Result<Allocation, DenoiseError> {
    allocator
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: gpu_allocator::MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| match e {
            gpu_allocator::AllocationError::OutOfMemory => DenoiseError::OutOfMemory,
            other => DenoiseError::ResourceCreationFailed(format!(
                "Failed to allocate image memory: {}",
                other
            )),
        })
}
