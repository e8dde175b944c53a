// Renderer - owns the whole Vulkan stack for one window
//
// INITIALIZATION (top-down):
//   instance -> surface -> physical device -> logical device -> swapchain
//   -> render pass -> pipeline -> framebuffers -> command pool/buffer -> sync
//
// FRAME (see backend::sync::FrameCycle):
//   wait fence -> reset fence -> acquire -> record -> submit -> present
//
// Teardown is the exact reverse: fields are declared in reverse creation
// order, and every wrapper releases its handle in Drop.

use ash::vk;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::commands::{self, CommandPool, FrameTarget};
use crate::backend::device;
use crate::backend::pipeline::{Framebuffers, GraphicsPipeline, RenderPass};
use crate::backend::sync::{FrameCycle, FrameOps, FrameState, FrameSync};
use crate::backend::{
    DrawableWindow, Instance, LogicalDevice, RenderError, RenderResult, Surface, Swapchain,
};
use crate::color::ClearColor;
use crate::config::Config;

/// Inputs the renderer needs besides the window
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub app_name: String,
    pub engine_name: String,
    pub enable_validation: bool,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl RendererSettings {
    /// Validation is only ever enabled in debug builds
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_name: config.app.application_name.clone(),
            engine_name: config.app.engine_name.clone(),
            enable_validation: cfg!(debug_assertions) && config.debug.validation_layers,
            vertex_shader: config.graphics.vertex_shader.clone(),
            fragment_shader: config.graphics.fragment_shader.clone(),
        }
    }
}

pub struct Renderer {
    frame_sync: FrameSync,
    /// Freed together with `command_pool`
    command_buffer: vk::CommandBuffer,
    _command_pool: CommandPool,
    framebuffers: Framebuffers,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<LogicalDevice>,
    _surface: Arc<Surface>,
    _instance: Arc<Instance>,

    cycle: FrameCycle,
    clear_color: ClearColor,
}

impl Renderer {
    /// Bring the backend up for `window`. Any failure is logged as critical
    /// and returned; resources created before the failure are released.
    pub fn new<W: DrawableWindow + ?Sized>(
        window: &W,
        settings: &RendererSettings,
    ) -> RenderResult<Self> {
        Self::init(window, settings).inspect_err(|e| {
            log::error!("CRITICAL: renderer initialization failed: {}", e);
        })
    }

    fn init<W: DrawableWindow + ?Sized>(
        window: &W,
        settings: &RendererSettings,
    ) -> RenderResult<Self> {
        log::info!("Initializing Vulkan...");

        let instance = Arc::new(Instance::new(
            window.raw_display_handle(),
            &settings.app_name,
            &settings.engine_name,
            settings.enable_validation,
        )?);

        let surface = Arc::new(Surface::new(instance.clone(), window)?);

        let physical = device::pick_physical_device(&instance, &surface)?;
        let device = Arc::new(LogicalDevice::new(instance.clone(), &physical)?);

        let swapchain = Swapchain::new(device.clone(), surface.clone(), window.drawable_size())?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format)?;
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            &render_pass,
            &settings.vertex_shader,
            &settings.fragment_shader,
        )?;
        let framebuffers = Framebuffers::new(
            device.clone(),
            &render_pass,
            &swapchain.image_views,
            swapchain.extent,
        )?;

        let command_pool = CommandPool::new(device.clone())?;
        let command_buffer = command_pool.allocate_primary()?;

        let frame_sync = FrameSync::new(device.clone())?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            frame_sync,
            command_buffer,
            _command_pool: command_pool,
            framebuffers,
            pipeline,
            render_pass,
            swapchain,
            device,
            _surface: surface,
            _instance: instance,
            cycle: FrameCycle::new(),
            clear_color: ClearColor::default(),
        })
    }

    /// Render and present one frame. Errors are unrecoverable: the sync
    /// objects may be left mid-cycle, so the caller must stop rendering.
    pub fn update(&mut self) -> RenderResult<()> {
        let mut frame = VulkanFrame {
            device: &self.device,
            swapchain: &self.swapchain,
            sync: &self.frame_sync,
            command_buffer: self.command_buffer,
            render_pass: self.render_pass.raw,
            framebuffers: &self.framebuffers.raw,
            pipeline: self.pipeline.raw,
            clear_color: self.clear_color,
        };

        self.cycle.run(&mut frame).map(|_| ())
    }

    /// 8-bit components, normalized to [0, 1]. Applies from the next frame.
    pub fn set_clear_color(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.clear_color = ClearColor::from_rgba8(r, g, b, a);
    }

    pub fn clear_color(&self) -> ClearColor {
        self.clear_color
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn frame_state(&self) -> FrameState {
        self.cycle.state()
    }

    pub fn frames_presented(&self) -> u64 {
        self.cycle.frames_presented()
    }

    /// Wait for the GPU to drain, e.g. before the window goes away
    pub fn wait_idle(&self) -> RenderResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {}", e);
        }
    }
}

/// Build the recording inputs for `image_index`
fn frame_target(
    render_pass: vk::RenderPass,
    framebuffers: &[vk::Framebuffer],
    pipeline: vk::Pipeline,
    extent: vk::Extent2D,
    clear_color: ClearColor,
    image_index: u32,
) -> FrameTarget {
    FrameTarget {
        render_pass,
        framebuffer: framebuffers[image_index as usize],
        pipeline,
        extent,
        clear_color: clear_color.to_array(),
    }
}

/// One frame's view of the renderer's handles
struct VulkanFrame<'a> {
    device: &'a LogicalDevice,
    swapchain: &'a Swapchain,
    sync: &'a FrameSync,
    command_buffer: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    framebuffers: &'a [vk::Framebuffer],
    pipeline: vk::Pipeline,
    clear_color: ClearColor,
}

impl FrameOps for VulkanFrame<'_> {
    fn wait_for_fence(&mut self) -> RenderResult<()> {
        unsafe {
            self.device
                .raw
                .wait_for_fences(&[self.sync.in_flight_fence], true, u64::MAX)
        }
        .map_err(RenderError::vk("vkWaitForFences"))
    }

    fn reset_fence(&mut self) -> RenderResult<()> {
        unsafe { self.device.raw.reset_fences(&[self.sync.in_flight_fence]) }
            .map_err(RenderError::vk("vkResetFences"))
    }

    fn acquire_image(&mut self) -> RenderResult<u32> {
        self.swapchain.acquire_next_image(self.sync.image_available)
    }

    fn record(&mut self, image_index: u32) -> RenderResult<()> {
        unsafe {
            self.device
                .raw
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(RenderError::vk("vkResetCommandBuffer"))?;

        let target = frame_target(
            self.render_pass,
            self.framebuffers,
            self.pipeline,
            self.swapchain.extent,
            self.clear_color,
            image_index,
        );

        commands::record_frame(&self.device.raw, self.command_buffer, &target)
    }

    fn submit(&mut self) -> RenderResult<()> {
        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_finished];
        let command_buffers = [self.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.raw.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                self.sync.in_flight_fence,
            )
        }
        .map_err(RenderError::vk("vkQueueSubmit"))
    }

    fn present(&mut self, image_index: u32) -> RenderResult<()> {
        self.swapchain.present(
            self.device.present_queue,
            image_index,
            &[self.sync.render_finished],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::commands::clear_values;
    use approx::assert_relative_eq;
    use ash::vk::Handle;

    fn extent() -> vk::Extent2D {
        vk::Extent2D {
            width: 800,
            height: 600,
        }
    }

    #[test]
    fn recorded_clear_value_follows_set_color() {
        let framebuffers = [vk::Framebuffer::from_raw(10), vk::Framebuffer::from_raw(11)];
        let color = ClearColor::from_rgba8(19, 61, 102, 255);

        let target = frame_target(
            vk::RenderPass::from_raw(1),
            &framebuffers,
            vk::Pipeline::from_raw(2),
            extent(),
            color,
            1,
        );

        let values = clear_values(target.clear_color);
        let rgba = unsafe { values[0].color.float32 };
        assert_relative_eq!(rgba[0], 19.0 / 255.0);
        assert_relative_eq!(rgba[1], 61.0 / 255.0);
        assert_relative_eq!(rgba[2], 102.0 / 255.0);
        assert_relative_eq!(rgba[3], 1.0);
    }

    #[test]
    fn target_uses_framebuffer_of_acquired_image() {
        let framebuffers = [
            vk::Framebuffer::from_raw(10),
            vk::Framebuffer::from_raw(11),
            vk::Framebuffer::from_raw(12),
        ];

        let target = frame_target(
            vk::RenderPass::from_raw(1),
            &framebuffers,
            vk::Pipeline::from_raw(2),
            extent(),
            ClearColor::default(),
            2,
        );

        assert_eq!(target.framebuffer.as_raw(), 12);
        assert_eq!(target.extent, extent());
    }

    #[test]
    fn validation_follows_build_and_config() {
        let mut config = Config::default();
        config.debug.validation_layers = true;
        assert_eq!(
            RendererSettings::from_config(&config).enable_validation,
            cfg!(debug_assertions)
        );

        config.debug.validation_layers = false;
        assert!(!RendererSettings::from_config(&config).enable_validation);
    }
}
