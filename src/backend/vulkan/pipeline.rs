//! Shader modules, layouts, compute pipelines and descriptor sets.

use std::ffi::CString;

use ash::vk;
use ash::vk::Handle;

use crate::backend::{ComputePipelineDescriptor, DescriptorImageWrite, DescriptorPoolSize};
use crate::error::DenoiseError;
use crate::types::DescriptorBinding;

use super::conversion::{
    allocation_error, convert_descriptor_kind, convert_image_layout, convert_shader_stages,
    creation_error,
};

/// Specialization constant ids carrying the local workgroup size.
const WORKGROUP_SIZE_CONSTANT_IDS: [u32; 3] = [0, 1, 2];

pub fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
) -> Result<vk::ShaderModule, DenoiseError> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| match e {
        vk::Result::ERROR_INVALID_SHADER_NV => {
            DenoiseError::ShaderCompilationFailed(format!("Failed to create shader module: {:?}", e))
        }
        other => creation_error("create shader module", other),
    })
}

/// Create a descriptor set layout from binding declarations.
pub fn create_descriptor_set_layout(
    device: &ash::Device,
    bindings: &[DescriptorBinding],
) -> Result<vk::DescriptorSetLayout, DenoiseError> {
    let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
        .iter()
        .map(|binding| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding.binding)
                .descriptor_type(convert_descriptor_kind(binding.kind))
                .descriptor_count(binding.count)
                .stage_flags(convert_shader_stages(binding.stages))
        })
        .collect();

    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);

    unsafe { device.create_descriptor_set_layout(&create_info, None) }
        .map_err(|e| creation_error("create descriptor set layout", e))
}

/// Create a pipeline layout from descriptor set layouts, without push constants.
pub fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
) -> Result<vk::PipelineLayout, DenoiseError> {
    let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);

    unsafe { device.create_pipeline_layout(&create_info, None) }
        .map_err(|e| creation_error("create pipeline layout", e))
}

/// Create a compute pipeline with the workgroup size as specialization constants.
pub fn create_compute_pipeline(
    device: &ash::Device,
    descriptor: &ComputePipelineDescriptor<'_>,
) -> Result<vk::Pipeline, DenoiseError> {
    let entry_point = CString::new(descriptor.entry_point).map_err(|_| {
        DenoiseError::InvalidParameter(format!(
            "Entry point {:?} contains a NUL byte",
            descriptor.entry_point
        ))
    })?;

    let map_entries: Vec<vk::SpecializationMapEntry> = WORKGROUP_SIZE_CONSTANT_IDS
        .iter()
        .enumerate()
        .map(|(index, &constant_id)| vk::SpecializationMapEntry {
            constant_id,
            offset: (index * std::mem::size_of::<u32>()) as u32,
            size: std::mem::size_of::<u32>(),
        })
        .collect();
    let data: Vec<u8> = descriptor
        .workgroup_size
        .iter()
        .flat_map(|value| value.to_ne_bytes())
        .collect();
    let specialization = vk::SpecializationInfo::default()
        .map_entries(&map_entries)
        .data(&data);

    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(vk::ShaderModule::from_raw(descriptor.module.raw()))
        .name(&entry_point)
        .specialization_info(&specialization);

    let create_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage)
        .layout(vk::PipelineLayout::from_raw(descriptor.layout.raw()));

    let pipelines = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
    }
    .map_err(|(_, e)| creation_error("create compute pipeline", e))?;

    let pipeline = pipelines.into_iter().next().ok_or_else(|| {
        DenoiseError::ResourceCreationFailed("Driver returned no compute pipeline".to_string())
    })?;

    log::debug!(
        "Created compute pipeline {:?} ({:?}, workgroup {:?})",
        descriptor.label.unwrap_or("unnamed"),
        pipeline,
        descriptor.workgroup_size
    );

    Ok(pipeline)
}

/// Create a descriptor pool sized exactly for the requested descriptors.
pub fn create_descriptor_pool(
    device: &ash::Device,
    sizes: &[DescriptorPoolSize],
    max_sets: u32,
) -> Result<vk::DescriptorPool, DenoiseError> {
    let pool_sizes: Vec<vk::DescriptorPoolSize> = sizes
        .iter()
        .map(|size| vk::DescriptorPoolSize {
            ty: convert_descriptor_kind(size.kind),
            descriptor_count: size.count,
        })
        .collect();

    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(max_sets)
        .pool_sizes(&pool_sizes);

    unsafe { device.create_descriptor_pool(&pool_info, None) }
        .map_err(|e| creation_error("create descriptor pool", e))
}

/// Allocate `count` descriptor sets sharing one layout.
pub fn allocate_descriptor_sets(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    count: u32,
) -> Result<Vec<vk::DescriptorSet>, DenoiseError> {
    let layouts = vec![layout; count as usize];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    unsafe { device.allocate_descriptor_sets(&alloc_info) }.map_err(allocation_error)
}

/// Write image descriptors.
pub fn update_descriptor_sets(device: &ash::Device, writes: &[DescriptorImageWrite]) {
    // Image infos must outlive the write structs that point at them.
    let image_infos: Vec<vk::DescriptorImageInfo> = writes
        .iter()
        .map(|write| {
            vk::DescriptorImageInfo::default()
                .image_view(vk::ImageView::from_raw(write.view.raw()))
                .image_layout(convert_image_layout(write.layout))
        })
        .collect();

    let vk_writes: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .zip(&image_infos)
        .map(|(write, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(vk::DescriptorSet::from_raw(write.set.raw()))
                .dst_binding(write.binding)
                .dst_array_element(0)
                .descriptor_type(convert_descriptor_kind(write.kind))
                .image_info(std::slice::from_ref(info))
        })
        .collect();

    unsafe { device.update_descriptor_sets(&vk_writes, &[]) };
}
