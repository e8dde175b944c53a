// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// The negotiation helpers are pure so they can be checked without a GPU.

use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;

use super::device::{LogicalDevice, QueueFamilies};
use super::error::{RenderError, RenderResult};
use super::surface::Surface;

/// Prefer 8-bit BGRA sRGB, else the first format the surface reports.
/// `None` only for an empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX when offered, otherwise FIFO (always supported)
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Use the surface's current extent unless it holds the `u32::MAX` sentinel,
/// in which case the drawable size (pixels) is clamped into the allowed range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, drawable: (u32, u32)) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: drawable
            .0
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: drawable
            .1
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// Concurrent sharing across both families when they differ, exclusive
/// ownership otherwise. The index list is empty for exclusive mode.
pub fn choose_sharing_mode(families: &QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.graphics != families.present {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

pub struct Swapchain {
    pub raw: vk::SwapchainKHR,
    pub loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<LogicalDevice>,
    _surface: Arc<Surface>,
}

impl Swapchain {
    pub fn new(
        device: Arc<LogicalDevice>,
        surface: Arc<Surface>,
        drawable_size: (u32, u32),
    ) -> RenderResult<Self> {
        let caps = surface.capabilities(device.physical_device)?;
        let formats = surface.formats(device.physical_device)?;
        let present_modes = surface.present_modes(device.physical_device)?;

        let surface_format = choose_surface_format(&formats).ok_or(RenderError::NoSurfaceFormat)?;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&caps, drawable_size);
        let image_count = choose_image_count(&caps);
        let (sharing_mode, family_indices) = choose_sharing_mode(&device.queue_families);

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}, {:?}, {:?}",
            extent.width,
            extent.height,
            image_count,
            surface_format.format,
            present_mode,
            sharing_mode
        );

        let loader = khr::Swapchain::new(&surface.instance().raw, &device.raw);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.raw)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let raw = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(RenderError::vk("vkCreateSwapchainKHR"))?;

        // From here on the partially built Swapchain owns what exists, so an
        // image view failure still releases the swapchain and earlier views
        let mut swapchain = Self {
            raw,
            loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            device,
            _surface: surface,
        };

        // Only the minimum was requested, the driver may hand back more
        swapchain.images = unsafe { swapchain.loader.get_swapchain_images(raw) }
            .map_err(RenderError::vk("vkGetSwapchainImagesKHR"))?;

        for i in 0..swapchain.images.len() {
            let view = swapchain.create_image_view(swapchain.images[i])?;
            swapchain.image_views.push(view);
        }

        log::info!("Created swapchain with {} images", swapchain.images.len());

        Ok(swapchain)
    }

    fn create_image_view(&self, image: vk::Image) -> RenderResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device.raw.create_image_view(&create_info, None) }
            .map_err(RenderError::vk("vkCreateImageView"))
    }

    /// Acquire next image for rendering, signalling `semaphore` once the
    /// image is actually free. Blocks without timeout.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RenderResult<u32> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.raw, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Swapchain suboptimal on acquire");
                }
                Ok(index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SwapchainOutOfDate),
            Err(e) => Err(RenderError::Vulkan {
                call: "vkAcquireNextImageKHR",
                result: e,
            }),
        }
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> RenderResult<()> {
        let swapchains = [self.raw];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => {
                if suboptimal {
                    log::debug!("Swapchain suboptimal on present");
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SwapchainOutOfDate),
            Err(e) => Err(RenderError::Vulkan {
                call: "vkQueuePresentKHR",
                result: e,
            }),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.raw.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.raw, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            min_image_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        }
    }

    fn sentinel_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            ..caps(2, 0)
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn key(chosen: Option<vk::SurfaceFormatKHR>) -> Option<(vk::Format, vk::ColorSpaceKHR)> {
        chosen.map(|f| (f.format, f.color_space))
    }

    #[test]
    fn preferred_format_wins_regardless_of_position() {
        let preferred = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            preferred,
        ];
        assert_eq!(key(choose_surface_format(&formats)), key(Some(preferred)));
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let first = key(choose_surface_format(&formats));
        assert_eq!(first, key(Some(formats[0])));
        // Deterministic on re-run
        assert_eq!(key(choose_surface_format(&formats)), first);
    }

    #[test]
    fn no_formats_no_choice() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn mailbox_preferred() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn fifo_fallback() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn current_extent_used_verbatim() {
        let extent = choose_extent(&caps(2, 0), (3000, 10));
        assert_eq!(extent, vk::Extent2D { width: 1280, height: 720 });
    }

    #[test]
    fn sentinel_extent_uses_drawable_size() {
        let extent = choose_extent(&sentinel_caps(), (800, 600));
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn sentinel_extent_clamps_each_axis() {
        assert_eq!(
            choose_extent(&sentinel_caps(), (3840, 100)),
            vk::Extent2D { width: 1920, height: 480 }
        );
        assert_eq!(
            choose_extent(&sentinel_caps(), (10, 2160)),
            vk::Extent2D { width: 640, height: 1080 }
        );
    }

    #[test]
    fn image_count_unbounded_max() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
    }

    #[test]
    fn image_count_clamped_to_max() {
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(1, 8)), 2);
    }

    #[test]
    fn shared_family_is_exclusive() {
        let (mode, indices) = choose_sharing_mode(&QueueFamilies { graphics: 0, present: 0 });
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());
    }

    #[test]
    fn split_families_are_concurrent() {
        let (mode, indices) = choose_sharing_mode(&QueueFamilies { graphics: 0, present: 2 });
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }
}
