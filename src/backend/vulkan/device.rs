//! Vulkan physical and logical device selection for compute work.

use std::ffi::CStr;

use ash::vk;

use crate::error::DenoiseError;

/// Queue family indices used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    /// Dedicated compute family when the device has one, `graphics` otherwise.
    pub compute: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.compute {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.compute]
        }
    }
}

/// Select the best physical device for compute work.
///
/// Prefers discrete GPUs over integrated GPUs. Devices without a graphics
/// queue family are skipped.
pub fn select_physical_device(
    instance: &ash::Instance,
) -> Result<(vk::PhysicalDevice, QueueFamilies), DenoiseError> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        DenoiseError::InitializationFailed(format!(
            "Failed to enumerate physical devices: {:?}",
            e
        ))
    })?;

    if devices.is_empty() {
        return Err(DenoiseError::InitializationFailed(
            "No Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut best = None;
    let mut best_score = 0;

    for device in devices {
        let Some(families) = find_queue_families(instance, device) else {
            continue;
        };
        let properties = unsafe { instance.get_physical_device_properties(device) };

        let mut score = 1;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
            score += 100;
        }
        if families.compute != families.graphics {
            score += 10;
        }

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!(
            "Found GPU: {:?} (type: {:?}, score: {})",
            device_name,
            properties.device_type,
            score
        );

        if score > best_score {
            best_score = score;
            best = Some((device, families));
        }
    }

    best.ok_or_else(|| DenoiseError::InitializationFailed("No suitable GPU found".to_string()))
}

/// Find the graphics family and a compute family, preferring one without graphics.
pub fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Option<QueueFamilies> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let graphics = queue_families
        .iter()
        .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))? as u32;
    let compute = queue_families
        .iter()
        .position(|f| {
            f.queue_flags.contains(vk::QueueFlags::COMPUTE)
                && !f.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|index| index as u32)
        .unwrap_or(graphics);

    Some(QueueFamilies { graphics, compute })
}

/// Create a logical device with one queue per distinct family.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilies,
) -> Result<ash::Device, DenoiseError> {
    let queue_priorities = [1.0f32];
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
        })
        .collect();

    #[allow(unused_mut)]
    let mut device_extensions: Vec<*const std::ffi::c_char> = Vec::new();

    #[cfg(target_os = "macos")]
    {
        device_extensions.push(ash::khr::portability_subset::NAME.as_ptr());
    }

    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions)
        .enabled_features(&features);

    let device =
        unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
            DenoiseError::InitializationFailed(format!("Failed to create logical device: {:?}", e))
        })?;

    Ok(device)
}
