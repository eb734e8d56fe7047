//! Vulkan validation layer debug messenger.

use std::ffi::CStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ash::vk;

use crate::error::DenoiseError;

/// Debug messenger that forwards validation output to `log` and counts
/// warnings and errors.
pub struct DebugMessenger {
    debug_utils: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    // Referenced by the callback through user data; must outlive the messenger.
    counter: Arc<AtomicUsize>,
}

impl DebugMessenger {
    /// Create a debug messenger for validation layer output.
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self, DenoiseError> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        let counter = Arc::new(AtomicUsize::new(0));

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(Arc::as_ptr(&counter) as *mut std::ffi::c_void);

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(|e| {
                DenoiseError::InitializationFailed(format!(
                    "Failed to create debug messenger: {:?}",
                    e
                ))
            })?;

        Ok(Self {
            debug_utils,
            messenger,
            counter,
        })
    }

    /// Warnings and errors reported so far.
    pub fn message_count(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    /// # Safety
    ///
    /// Must be called once, before the instance is destroyed.
    pub unsafe fn destroy(&self) {
        unsafe {
            self.debug_utils
                .destroy_debug_utils_messenger(self.messenger, None)
        };
    }
}

/// Debug callback function for validation layer messages.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() {
        String::from("(no message)")
    } else {
        // SAFETY: callback_data is guaranteed to be valid by the Vulkan driver
        let data = unsafe { *callback_data };
        if data.p_message.is_null() {
            String::from("(null message)")
        } else {
            // SAFETY: p_message is a valid null-terminated string from the Vulkan driver
            unsafe { CStr::from_ptr(data.p_message) }
                .to_string_lossy()
                .into_owned()
        }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    let counted = message_severity.intersects(
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
    );
    if counted && !user_data.is_null() {
        // SAFETY: user_data points at the counter owned by the DebugMessenger
        let counter = unsafe { &*(user_data as *const AtomicUsize) };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::debug!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            log::trace!("[Vulkan {}] {}", type_str, message);
        }
    }

    vk::FALSE
}
