// Surface - binds the instance to one native window

use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;

use super::error::{RenderError, RenderResult};
use super::instance::Instance;

/// What the renderer needs from a window: raw handles for surface creation
/// and the drawable size in physical pixels.
pub trait DrawableWindow: HasRawWindowHandle + HasRawDisplayHandle {
    /// Size of the drawable area in pixels. On high-DPI displays this differs
    /// from the logical window size.
    fn drawable_size(&self) -> (u32, u32);
}

impl DrawableWindow for winit::window::Window {
    fn drawable_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}

pub struct Surface {
    pub raw: vk::SurfaceKHR,
    pub loader: khr::Surface,
    instance: Arc<Instance>,
}

impl Surface {
    pub fn new<W: DrawableWindow + ?Sized>(
        instance: Arc<Instance>,
        window: &W,
    ) -> RenderResult<Self> {
        let loader = khr::Surface::new(instance.entry(), &instance.raw);

        let raw = unsafe {
            ash_window::create_surface(
                instance.entry(),
                &instance.raw,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .map_err(RenderError::vk("vkCreateSurfaceKHR"))?;

        Ok(Self {
            raw,
            loader,
            instance,
        })
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> RenderResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.raw)
        }
        .map_err(RenderError::vk("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))
    }

    pub fn formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> RenderResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.raw)
        }
        .map_err(RenderError::vk("vkGetPhysicalDeviceSurfaceFormatsKHR"))
    }

    pub fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> RenderResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.raw)
        }
        .map_err(RenderError::vk("vkGetPhysicalDeviceSurfacePresentModesKHR"))
    }

    /// Whether queue family `queue_family_index` can present to this surface
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> RenderResult<bool> {
        unsafe {
            self.loader.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                self.raw,
            )
        }
        .map_err(RenderError::vk("vkGetPhysicalDeviceSurfaceSupportKHR"))
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.raw, None);
        }
    }
}
