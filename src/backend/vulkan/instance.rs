//! Headless Vulkan instance creation.

use std::ffi::CStr;

use ash::vk;

use crate::error::DenoiseError;

use super::debug::DebugMessenger;

/// Vulkan 1.1 is enough for compute with storage images.
const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 1, 0);

/// Validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Create a Vulkan instance without surface extensions.
///
/// Returns the instance and, when validation is enabled and available, a
/// debug messenger.
pub fn create_instance(
    entry: &ash::Entry,
    validation_enabled: bool,
) -> Result<(ash::Instance, Option<DebugMessenger>), DenoiseError> {
    let validation_available = validation_enabled && check_validation_layer_support(entry);

    if validation_enabled && !validation_available {
        log::warn!("Validation layers requested but not available");
    }

    let app_info = vk::ApplicationInfo::default()
        .application_name(c"RedLilium Denoiser")
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"RedLilium Engine")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    let mut extensions = Vec::new();
    if validation_available {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        extensions.push(ash::ext::validation_features::NAME.as_ptr());
    }

    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
    }

    let layer_names: Vec<*const std::ffi::c_char> = if validation_available {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        vec![]
    };

    #[allow(unused_mut)]
    let mut create_flags = vk::InstanceCreateFlags::empty();

    #[cfg(target_os = "macos")]
    {
        create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    // Cross-queue hazards (semaphore waits vs. barrier scopes) are only
    // checked by synchronization validation.
    let enabled_features = [vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION];
    let mut validation_features =
        vk::ValidationFeaturesEXT::default().enabled_validation_features(&enabled_features);

    let mut create_info = vk::InstanceCreateInfo::default()
        .flags(create_flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);
    if validation_available {
        create_info = create_info.push_next(&mut validation_features);
    }

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        DenoiseError::InitializationFailed(format!("Failed to create Vulkan instance: {:?}", e))
    })?;

    let messenger = if validation_available {
        match DebugMessenger::new(entry, &instance) {
            Ok(messenger) => Some(messenger),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        }
    } else {
        None
    };

    Ok((instance, messenger))
}

/// Check if the validation layer is available.
fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let available_layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers,
        Err(_) => return false,
    };

    available_layers.iter().any(|layer| {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == VALIDATION_LAYER_NAME
    })
}
