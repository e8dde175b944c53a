// Vulkan Device - GPU selection and the logical device
//
// Responsibilities:
// - Snapshot every physical device against the window surface
// - Physical device selection (first suitable, in enumeration order)
// - Logical device + graphics/present queue retrieval

use ash::vk;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

use super::error::{RenderError, RenderResult};
use super::instance::{Instance, VALIDATION_LAYER};
use super::surface::Surface;

/// Device extensions a GPU must expose to be usable
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [c"VK_KHR_swapchain"];

/// Capabilities of one queue family relevant to us
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilySupport {
    pub graphics: bool,
    pub present: bool,
}

/// Queue family candidates for one (physical device, surface) pair.
/// Graphics and present may resolve to the same family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn resolve(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Resolved queue families of the selected device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Walk the family table in order, recording the latest graphics-capable and
/// present-capable family, and stop as soon as both are known.
pub fn find_queue_families(families: &[QueueFamilySupport]) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        if family.graphics {
            indices.graphics = Some(i as u32);
        }
        if family.present {
            indices.present = Some(i as u32);
        }
        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Immutable snapshot of one enumerated GPU, taken against a surface
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_id: u32,
    pub vendor_id: u32,
    pub device_type: vk::PhysicalDeviceType,
    pub driver_version: u32,
    pub api_version: u32,
    pub queue_families: Vec<QueueFamilySupport>,
    pub extensions: Vec<String>,
    /// Empty unless the swapchain extension is supported
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    /// Empty unless the swapchain extension is supported
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl PhysicalDeviceInfo {
    pub fn query(
        instance: &ash::Instance,
        surface: &Surface,
        handle: vk::PhysicalDevice,
    ) -> RenderResult<Self> {
        let props = unsafe { instance.get_physical_device_properties(handle) };
        let family_props =
            unsafe { instance.get_physical_device_queue_family_properties(handle) };

        let queue_families = family_props
            .iter()
            .enumerate()
            .map(|(i, family)| {
                Ok(QueueFamilySupport {
                    graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                    present: surface.supports_present(handle, i as u32)?,
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(handle) }
            .map_err(RenderError::vk("vkEnumerateDeviceExtensionProperties"))?
            .iter()
            .map(|ext| cstr_to_string(ext.extension_name.as_ptr()))
            .collect::<Vec<_>>();

        let mut info = Self {
            handle,
            name: cstr_to_string(props.device_name.as_ptr()),
            device_id: props.device_id,
            vendor_id: props.vendor_id,
            device_type: props.device_type,
            driver_version: props.driver_version,
            api_version: props.api_version,
            queue_families,
            extensions,
            surface_formats: Vec::new(),
            present_modes: Vec::new(),
        };

        // Surface queries are only meaningful with swapchain support
        if info.supports_required_extensions() {
            info.surface_formats = surface.formats(handle)?;
            info.present_modes = surface.present_modes(handle)?;
        }

        Ok(info)
    }

    pub fn queue_family_indices(&self) -> QueueFamilyIndices {
        find_queue_families(&self.queue_families)
    }

    pub fn supports_required_extensions(&self) -> bool {
        REQUIRED_DEVICE_EXTENSIONS.iter().all(|required| {
            let required = required.to_string_lossy();
            self.extensions.iter().any(|ext| *ext == required)
        })
    }

    pub fn swapchain_adequate(&self) -> bool {
        !self.surface_formats.is_empty() && !self.present_modes.is_empty()
    }

    pub fn is_suitable(&self) -> bool {
        self.queue_family_indices().is_complete()
            && self.supports_required_extensions()
            && self.swapchain_adequate()
    }

    pub fn describe(&self) -> String {
        format!(
            "\nDevice Info:\n\tName: {}\n\tID: {}\n\tType: {:?}\n\tDriver Version: {}\n\tAPI Version: {}.{}.{}\n\tVendor ID: {:#06x}\n",
            self.name,
            self.device_id,
            self.device_type,
            self.driver_version,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.vendor_id,
        )
    }
}

/// First suitable device in enumeration order. No ranking between GPUs.
///
/// Devices are queried one at a time and the search stops at the first
/// suitable one. A device whose query fails counts as unsuitable.
pub fn select_physical_device<F>(
    handles: &[vk::PhysicalDevice],
    mut query: F,
) -> RenderResult<PhysicalDeviceInfo>
where
    F: FnMut(vk::PhysicalDevice) -> RenderResult<PhysicalDeviceInfo>,
{
    if handles.is_empty() {
        return Err(RenderError::NoDeviceFound);
    }

    for &handle in handles {
        match query(handle) {
            Ok(info) if info.is_suitable() => return Ok(info),
            Ok(info) => log::debug!("Skipping unsuitable device {}", info.name),
            Err(e) => log::warn!("Skipping device {:?}: {}", handle, e),
        }
    }

    Err(RenderError::NoSuitableDevice)
}

/// Enumerate, snapshot and select a GPU that can drive `surface`.
pub fn pick_physical_device(
    instance: &Instance,
    surface: &Surface,
) -> RenderResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.raw.enumerate_physical_devices() }
        .map_err(RenderError::vk("vkEnumeratePhysicalDevices"))?;

    let chosen = select_physical_device(&devices, |handle| {
        PhysicalDeviceInfo::query(&instance.raw, surface, handle)
    })?;
    log::info!("{}", chosen.describe());

    Ok(chosen)
}

/// The application's device handle and its queues
pub struct LogicalDevice {
    pub raw: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    _instance: Arc<Instance>,
}

impl LogicalDevice {
    pub fn new(instance: Arc<Instance>, info: &PhysicalDeviceInfo) -> RenderResult<Self> {
        let queue_families = info
            .queue_family_indices()
            .resolve()
            .ok_or(RenderError::NoSuitableDevice)?;

        // One queue per unique family
        let queue_priorities = [1.0];
        let queue_create_infos = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect::<Vec<_>>();

        let extensions: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        // Device layers are ignored by current loaders, set for older ones
        let layer_names: Vec<*const c_char> = if instance.validation_enabled() {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        let raw = unsafe { instance.raw.create_device(info.handle, &create_info, None) }
            .map_err(RenderError::vk("vkCreateDevice"))?;

        let graphics_queue = unsafe { raw.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { raw.get_device_queue(queue_families.present, 0) };

        log::debug!(
            "Queue families: graphics={} present={}",
            queue_families.graphics,
            queue_families.present
        );

        Ok(Self {
            raw,
            physical_device: info.handle,
            queue_families,
            graphics_queue,
            present_queue,
            _instance: instance,
        })
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.raw.device_wait_idle() }.map_err(RenderError::vk("vkDeviceWaitIdle"))
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");
        unsafe {
            self.raw.destroy_device(None);
        }
    }
}

fn cstr_to_string(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}
