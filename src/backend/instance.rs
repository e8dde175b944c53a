// Vulkan instance - API entry point and diagnostics
//
// Responsibilities:
// - Load the Vulkan library
// - Create the instance with the window system's surface extensions
// - Optional validation layer + debug messenger
// - Startup dump of available extensions/layers

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

use super::error::{RenderError, RenderResult};

/// The Khronos validation layer, the only layer we ever request
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Owns the library entry, the instance and (if validation is on) the debug
/// messenger. Everything else in the backend keeps this alive through an Arc,
/// so it is always the last handle destroyed.
pub struct Instance {
    pub raw: ash::Instance,
    entry: Entry,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    validation_enabled: bool,
}

impl Instance {
    /// Create the Vulkan instance for a window living on `display`.
    pub fn new(
        display: RawDisplayHandle,
        app_name: &str,
        engine_name: &str,
        enable_validation: bool,
    ) -> RenderResult<Self> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }?;

        if enable_validation && !Self::validation_layer_available(&entry)? {
            return Err(RenderError::ValidationLayersUnavailable(
                "VK_LAYER_KHRONOS_validation",
            ));
        }

        let app_name_cstr = CString::new(app_name)?;
        let engine_name_cstr = CString::new(engine_name)?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let extensions = Self::required_extensions(display, enable_validation)?;

        let layer_names: Vec<*const c_char> = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        // Chained into the create info so instance creation and destruction
        // are covered by the validation layer too
        let mut debug_info = debug_messenger_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);
        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let raw = unsafe { entry.create_instance(&create_info, None) }
            .map_err(RenderError::vk("vkCreateInstance"))?;

        let mut instance = Self {
            raw,
            entry,
            debug_utils: None,
            validation_enabled: enable_validation,
        };

        instance.log_extensions_and_layers(&extensions);

        if enable_validation {
            instance.setup_debug_messenger()?;
        }

        Ok(instance)
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }

    fn validation_layer_available(entry: &Entry) -> RenderResult<bool> {
        let layers = entry.enumerate_instance_layer_properties()
            .map_err(RenderError::vk("vkEnumerateInstanceLayerProperties"))?;

        Ok(layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER))
    }

    /// Platform surface extensions for `display`, plus debug utils when
    /// validation is on.
    fn required_extensions(
        display: RawDisplayHandle,
        enable_validation: bool,
    ) -> RenderResult<Vec<*const c_char>> {
        let mut extensions = ash_window::enumerate_required_extensions(display)
            .map_err(RenderError::vk("vkEnumerateInstanceExtensionProperties"))?
            .to_vec();

        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        Ok(extensions)
    }

    fn setup_debug_messenger(&mut self) -> RenderResult<()> {
        let debug_utils = DebugUtils::new(&self.entry, &self.raw);
        let create_info = debug_messenger_info();

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(RenderError::vk("vkCreateDebugUtilsMessengerEXT"))?;

        self.debug_utils = Some((debug_utils, messenger));
        Ok(())
    }

    /// Informational dump of every instance extension and layer, marking the
    /// ones this instance enabled. Failures to enumerate only skip the dump.
    fn log_extensions_and_layers(&self, enabled_extensions: &[*const c_char]) {
        let available_extensions = self.entry.enumerate_instance_extension_properties(None)
            .unwrap_or_default()
            .iter()
            .map(|ext| cstr_to_string(ext.extension_name.as_ptr()))
            .collect::<Vec<_>>();

        let enabled_extensions = enabled_extensions
            .iter()
            .map(|&ptr| cstr_to_string(ptr))
            .collect::<Vec<_>>();

        let available_layers = self.entry.enumerate_instance_layer_properties()
            .unwrap_or_default()
            .iter()
            .map(|layer| cstr_to_string(layer.layer_name.as_ptr()))
            .collect::<Vec<_>>();

        let enabled_layers = if self.validation_enabled {
            vec![VALIDATION_LAYER.to_string_lossy().into_owned()]
        } else {
            vec![]
        };

        log::info!(
            "{}",
            extension_report(
                &available_extensions,
                &enabled_extensions,
                &available_layers,
                &enabled_layers,
            )
        );
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.raw.destroy_instance(None);
        }
    }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

/// Render the startup report. Enabled entries are prefixed with `[ACTIVE]`,
/// the rest are indented with a tab.
pub fn extension_report(
    available_extensions: &[String],
    enabled_extensions: &[String],
    available_layers: &[String],
    enabled_layers: &[String],
) -> String {
    let mut report = String::from("\nInstance extensions:\n");
    push_entries(&mut report, available_extensions, enabled_extensions);
    report.push_str("\nValidation layers:\n");
    push_entries(&mut report, available_layers, enabled_layers);
    report
}

fn push_entries(report: &mut String, available: &[String], enabled: &[String]) {
    for name in available {
        if enabled.contains(name) {
            report.push_str("[ACTIVE] ");
        } else {
            report.push('\t');
        }
        report.push_str(name);
        report.push('\n');
    }
}

fn cstr_to_string(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan] {}", message);
        }
        _ => {
            log::trace!("[Vulkan] {}", message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn report_marks_enabled_entries() {
        let report = extension_report(
            &names(&["VK_KHR_surface", "VK_KHR_xlib_surface", "VK_EXT_debug_utils"]),
            &names(&["VK_KHR_surface", "VK_EXT_debug_utils"]),
            &names(&["VK_LAYER_KHRONOS_validation"]),
            &[],
        );

        assert!(report.contains("[ACTIVE] VK_KHR_surface\n"));
        assert!(report.contains("\tVK_KHR_xlib_surface\n"));
        assert!(report.contains("[ACTIVE] VK_EXT_debug_utils\n"));
        assert!(report.contains("\tVK_LAYER_KHRONOS_validation\n"));
    }

    #[test]
    fn report_lists_extensions_before_layers() {
        let report = extension_report(
            &names(&["VK_KHR_surface"]),
            &[],
            &names(&["VK_LAYER_KHRONOS_validation"]),
            &names(&["VK_LAYER_KHRONOS_validation"]),
        );

        let ext_pos = report.find("VK_KHR_surface").unwrap();
        let layers_header = report.find("Validation layers:").unwrap();
        let layer_pos = report.find("[ACTIVE] VK_LAYER_KHRONOS_validation").unwrap();
        assert!(ext_pos < layers_header && layers_header < layer_pos);
    }

    #[test]
    fn validation_layer_name() {
        assert_eq!(VALIDATION_LAYER.to_str().unwrap(), "VK_LAYER_KHRONOS_validation");
    }
}
