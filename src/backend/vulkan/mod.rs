//! Native Vulkan backend implementation using ash.
//!
//! The backend either wraps a device created by the host renderer
//! ([`VulkanBackend::from_device`]) or creates its own headless device with
//! a compute queue ([`VulkanBackend::headless`]). Image memory comes from
//! gpu-allocator.

mod allocator;
mod command;
pub(crate) mod conversion;
mod debug;
mod device;
mod instance;
mod pipeline;

use std::collections::HashMap;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;

use crate::command::CommandScript;
use crate::error::{DenoiseError, DenoiseResult};
use crate::types::{DescriptorBinding, ImageDescriptor};

use super::{
    CommandBufferHandle, CommandPoolHandle, ComputeBackend, ComputePipelineDescriptor,
    CreatedImage, DescriptorImageWrite, DescriptorPoolHandle, DescriptorPoolSize,
    DescriptorSetHandle, DescriptorSetLayoutHandle, ImageHandle, ImageViewHandle, PipelineHandle,
    PipelineLayoutHandle, QueueKind, SemaphoreHandle, ShaderModuleHandle, Submission,
};

use self::conversion::{
    convert_image_format, convert_image_usage, convert_pipeline_stages, creation_error,
    submission_error,
};
use self::debug::DebugMessenger;
use self::device::QueueFamilies;

/// Device objects the backend runs on.
///
/// When built by the host renderer the context is borrowed: the backend
/// never destroys the device or the instance.
#[derive(Clone)]
pub struct VulkanDeviceContext {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub graphics_queue_family: u32,
    pub graphics_queue: vk::Queue,
    pub compute_queue_family: u32,
    pub compute_queue: vk::Queue,
}

impl std::fmt::Debug for VulkanDeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDeviceContext")
            .field("physical_device", &self.physical_device)
            .field("graphics_queue_family", &self.graphics_queue_family)
            .field("compute_queue_family", &self.compute_queue_family)
            .finish()
    }
}

/// Instance-level objects owned by a headless backend.
struct OwnedInstance {
    _entry: ash::Entry,
    debug: Option<DebugMessenger>,
}

/// Vulkan-based compute backend using ash.
pub struct VulkanBackend {
    context: VulkanDeviceContext,
    owned: Option<OwnedInstance>,
    /// Taken on drop so the allocator is gone before the device.
    allocator: Mutex<Option<Allocator>>,
    /// Memory backing each created image, keyed by raw image handle.
    image_allocations: Mutex<HashMap<u64, Allocation>>,
    /// Queue access must be externally synchronized.
    queue_lock: Mutex<()>,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("context", &self.context)
            .field("headless", &self.owned.is_some())
            .finish()
    }
}

impl VulkanBackend {
    /// Wrap a device created by the host renderer.
    pub fn from_device(context: VulkanDeviceContext) -> DenoiseResult<Self> {
        let allocator = allocator::create_allocator(
            &context.instance,
            context.physical_device,
            context.device.clone(),
        )?;
        Ok(Self {
            context,
            owned: None,
            allocator: Mutex::new(Some(allocator)),
            image_allocations: Mutex::new(HashMap::new()),
            queue_lock: Mutex::new(()),
        })
    }

    /// Create an instance and device of our own, without any surface.
    pub fn headless(validation: bool) -> DenoiseResult<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            DenoiseError::InitializationFailed(format!("Failed to load Vulkan: {}", e))
        })?;

        let (instance, debug) = instance::create_instance(&entry, validation)?;
        let destroy_instance = |debug: &Option<DebugMessenger>| unsafe {
            if let Some(debug) = debug {
                debug.destroy();
            }
            instance.destroy_instance(None);
        };

        let (physical_device, families) = match device::select_physical_device(&instance) {
            Ok(selected) => selected,
            Err(e) => {
                destroy_instance(&debug);
                return Err(e);
            }
        };
        let device = match device::create_logical_device(&instance, physical_device, families) {
            Ok(device) => device,
            Err(e) => {
                destroy_instance(&debug);
                return Err(e);
            }
        };

        let QueueFamilies { graphics, compute } = families;
        let context = VulkanDeviceContext {
            instance: instance.clone(),
            physical_device,
            graphics_queue_family: graphics,
            graphics_queue: unsafe { device.get_device_queue(graphics, 0) },
            compute_queue_family: compute,
            compute_queue: unsafe { device.get_device_queue(compute, 0) },
            device,
        };

        let allocator = match allocator::create_allocator(
            &context.instance,
            physical_device,
            context.device.clone(),
        ) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { context.device.destroy_device(None) };
                destroy_instance(&debug);
                return Err(e);
            }
        };

        log::info!(
            "Created headless Vulkan device (graphics family {}, compute family {})",
            graphics,
            compute
        );

        Ok(Self {
            context,
            owned: Some(OwnedInstance {
                _entry: entry,
                debug,
            }),
            allocator: Mutex::new(Some(allocator)),
            image_allocations: Mutex::new(HashMap::new()),
            queue_lock: Mutex::new(()),
        })
    }

    pub fn context(&self) -> &VulkanDeviceContext {
        &self.context
    }

    /// Validation-layer warnings and errors reported so far.
    ///
    /// Always zero for a wrapped device or when validation is unavailable.
    pub fn validation_message_count(&self) -> usize {
        self.owned
            .as_ref()
            .and_then(|owned| owned.debug.as_ref())
            .map_or(0, DebugMessenger::message_count)
    }

    fn device(&self) -> &ash::Device {
        &self.context.device
    }

    fn queue(&self, queue: QueueKind) -> (vk::Queue, u32) {
        match queue {
            QueueKind::Graphics => (
                self.context.graphics_queue,
                self.context.graphics_queue_family,
            ),
            QueueKind::Compute => (
                self.context.compute_queue,
                self.context.compute_queue_family,
            ),
        }
    }

    fn allocate_and_bind(&self, image: vk::Image, name: &str) -> DenoiseResult<Allocation> {
        let requirements = unsafe { self.device().get_image_memory_requirements(image) };
        let allocation = {
            let mut guard = self.allocator.lock();
            let allocator = guard.as_mut().ok_or_else(|| {
                DenoiseError::ResourceCreationFailed("Memory allocator is gone".to_string())
            })?;
            allocator::allocate_image_memory(allocator, name, requirements)?
        };

        let bound = unsafe {
            self.device()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free_allocation(allocation);
            return Err(creation_error("bind image memory", e));
        }
        Ok(allocation)
    }

    fn free_allocation(&self, allocation: Allocation) {
        if let Some(allocator) = self.allocator.lock().as_mut()
            && let Err(e) = allocator.free(allocation)
        {
            log::error!("Failed to free image memory: {}", e);
        }
    }
}

impl ComputeBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> DenoiseResult<CreatedImage> {
        let format = convert_image_format(descriptor.format);
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: descriptor.extent.width,
                height: descriptor.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_image_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let device = self.device();
        let image = unsafe { device.create_image(&image_info, None) }
            .map_err(|e| creation_error("create image", e))?;

        let name = descriptor.label.as_deref().unwrap_or("denoiser image");
        let allocation = match self.allocate_and_bind(image, name) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                self.free_allocation(allocation);
                return Err(creation_error("create image view", e));
            }
        };

        self.image_allocations
            .lock()
            .insert(image.as_raw(), allocation);

        log::debug!(
            "Created image {:?} ({}, {:?})",
            name,
            descriptor.extent,
            descriptor.format
        );

        Ok(CreatedImage {
            image: ImageHandle::from_raw(image.as_raw()),
            view: ImageViewHandle::from_raw(view.as_raw()),
        })
    }

    fn destroy_image(&self, image: CreatedImage) {
        unsafe {
            self.device()
                .destroy_image_view(vk::ImageView::from_raw(image.view.raw()), None);
            self.device()
                .destroy_image(vk::Image::from_raw(image.image.raw()), None);
        }
        let allocation = self.image_allocations.lock().remove(&image.image.raw());
        match allocation {
            Some(allocation) => self.free_allocation(allocation),
            None => log::warn!("Destroyed image {:?} with no tracked memory", image.image),
        }
    }

    fn create_shader_module(&self, code: &[u32]) -> DenoiseResult<ShaderModuleHandle> {
        let module = pipeline::create_shader_module(self.device(), code)?;
        Ok(ShaderModuleHandle::from_raw(module.as_raw()))
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        unsafe {
            self.device()
                .destroy_shader_module(vk::ShaderModule::from_raw(module.raw()), None)
        };
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> DenoiseResult<DescriptorSetLayoutHandle> {
        let layout = pipeline::create_descriptor_set_layout(self.device(), bindings)?;
        Ok(DescriptorSetLayoutHandle::from_raw(layout.as_raw()))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        unsafe {
            self.device().destroy_descriptor_set_layout(
                vk::DescriptorSetLayout::from_raw(layout.raw()),
                None,
            )
        };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
    ) -> DenoiseResult<PipelineLayoutHandle> {
        let vk_layouts: Vec<vk::DescriptorSetLayout> = set_layouts
            .iter()
            .map(|layout| vk::DescriptorSetLayout::from_raw(layout.raw()))
            .collect();
        let layout = pipeline::create_pipeline_layout(self.device(), &vk_layouts)?;
        Ok(PipelineLayoutHandle::from_raw(layout.as_raw()))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        unsafe {
            self.device()
                .destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.raw()), None)
        };
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor<'_>,
    ) -> DenoiseResult<PipelineHandle> {
        let pipeline = pipeline::create_compute_pipeline(self.device(), descriptor)?;
        Ok(PipelineHandle::from_raw(pipeline.as_raw()))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        unsafe {
            self.device()
                .destroy_pipeline(vk::Pipeline::from_raw(pipeline.raw()), None)
        };
    }

    fn create_descriptor_pool(
        &self,
        sizes: &[DescriptorPoolSize],
        max_sets: u32,
    ) -> DenoiseResult<DescriptorPoolHandle> {
        let pool = pipeline::create_descriptor_pool(self.device(), sizes, max_sets)?;
        Ok(DescriptorPoolHandle::from_raw(pool.as_raw()))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        unsafe {
            self.device()
                .destroy_descriptor_pool(vk::DescriptorPool::from_raw(pool.raw()), None)
        };
    }

    fn allocate_descriptor_sets(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        count: u32,
    ) -> DenoiseResult<Vec<DescriptorSetHandle>> {
        let sets = pipeline::allocate_descriptor_sets(
            self.device(),
            vk::DescriptorPool::from_raw(pool.raw()),
            vk::DescriptorSetLayout::from_raw(layout.raw()),
            count,
        )?;
        Ok(sets
            .into_iter()
            .map(|set| DescriptorSetHandle::from_raw(set.as_raw()))
            .collect())
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorImageWrite]) {
        pipeline::update_descriptor_sets(self.device(), writes);
    }

    fn create_command_pool(&self, queue: QueueKind) -> DenoiseResult<CommandPoolHandle> {
        let (_, family) = self.queue(queue);
        let pool = command::create_command_pool(self.device(), family)?;
        Ok(CommandPoolHandle::from_raw(pool.as_raw()))
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        unsafe {
            self.device()
                .destroy_command_pool(vk::CommandPool::from_raw(pool.raw()), None)
        };
    }

    fn allocate_command_buffer(
        &self,
        pool: CommandPoolHandle,
    ) -> DenoiseResult<CommandBufferHandle> {
        let cmd =
            command::allocate_primary(self.device(), vk::CommandPool::from_raw(pool.raw()))?;
        Ok(CommandBufferHandle::from_raw(cmd.as_raw()))
    }

    fn record_commands(
        &self,
        command_buffer: CommandBufferHandle,
        script: &CommandScript,
    ) -> DenoiseResult<()> {
        command::record_script(
            self.device(),
            vk::CommandBuffer::from_raw(command_buffer.raw()),
            script,
        )
    }

    fn create_semaphore(&self) -> DenoiseResult<SemaphoreHandle> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { self.device().create_semaphore(&create_info, None) }
            .map_err(|e| creation_error("create semaphore", e))?;
        Ok(SemaphoreHandle::from_raw(semaphore.as_raw()))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe {
            self.device()
                .destroy_semaphore(vk::Semaphore::from_raw(semaphore.raw()), None)
        };
    }

    fn queue_wait_idle(&self, queue: QueueKind) -> DenoiseResult<()> {
        let (vk_queue, _) = self.queue(queue);
        let _guard = self.queue_lock.lock();
        unsafe { self.device().queue_wait_idle(vk_queue) }
            .map_err(|e| submission_error("wait for queue idle", e))
    }

    fn submit(&self, queue: QueueKind, submission: &Submission) -> DenoiseResult<()> {
        let (vk_queue, _) = self.queue(queue);

        let command_buffers = [vk::CommandBuffer::from_raw(submission.command_buffer.raw())];
        let signal_semaphores = [vk::Semaphore::from_raw(submission.signal.raw())];
        let wait_semaphores: Vec<vk::Semaphore> = submission
            .wait
            .iter()
            .map(|wait| vk::Semaphore::from_raw(wait.semaphore.raw()))
            .collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = submission
            .wait
            .iter()
            .map(|wait| convert_pipeline_stages(wait.stage))
            .collect();

        let mut submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        if !wait_semaphores.is_empty() {
            submit_info = submit_info
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages);
        }

        let _guard = self.queue_lock.lock();
        unsafe {
            self.device()
                .queue_submit(vk_queue, &[submit_info], vk::Fence::null())
        }
        .map_err(|e| submission_error("submit command buffer", e))
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.context.device.device_wait_idle();
        }

        let leaked: Vec<Allocation> = self
            .image_allocations
            .lock()
            .drain()
            .map(|(_, allocation)| allocation)
            .collect();
        if !leaked.is_empty() {
            log::warn!(
                "VulkanBackend dropped with {} image allocation(s) still live",
                leaked.len()
            );
        }
        for allocation in leaked {
            self.free_allocation(allocation);
        }
        // Drop allocator before device
        drop(self.allocator.lock().take());

        if let Some(owned) = self.owned.take() {
            unsafe {
                self.context.device.destroy_device(None);
                if let Some(debug) = &owned.debug {
                    debug.destroy();
                }
                self.context.instance.destroy_instance(None);
            }
        }
    }
}
