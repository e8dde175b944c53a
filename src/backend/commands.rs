// Command pool and per-frame command recording
//
// A single primary buffer is reset and re-recorded every frame, so changes
// such as the clear color apply on the very next frame.

use ash::vk;
use std::sync::Arc;

use super::device::LogicalDevice;
use super::error::{RenderError, RenderResult};

/// Vertices emitted by the placeholder draw (positions live in the shader)
pub const PLACEHOLDER_VERTEX_COUNT: u32 = 3;

pub struct CommandPool {
    pub raw: vk::CommandPool,
    device: Arc<LogicalDevice>,
}

impl CommandPool {
    /// Pool on the graphics family whose buffers can be reset individually
    pub fn new(device: Arc<LogicalDevice>) -> RenderResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_families.graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let raw = unsafe { device.raw.create_command_pool(&pool_info, None) }
            .map_err(RenderError::vk("vkCreateCommandPool"))?;

        Ok(Self { raw, device })
    }

    /// Buffers are freed together with the pool
    pub fn allocate_primary(&self) -> RenderResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.raw)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.raw.allocate_command_buffers(&alloc_info) }
            .map_err(RenderError::vk("vkAllocateCommandBuffers"))?;

        Ok(buffers[0])
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_command_pool(self.raw, None);
        }
    }
}

/// Everything one frame's recording needs
pub struct FrameTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 1] {
    [vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }]
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Record the whole frame into `cmd`. The buffer must be in the initial
/// state (freshly allocated or reset).
pub fn record_frame(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    target: &FrameTarget,
) -> RenderResult<()> {
    let begin_info = vk::CommandBufferBeginInfo::builder();
    unsafe { device.begin_command_buffer(cmd, &begin_info) }
        .map_err(RenderError::vk("vkBeginCommandBuffer"))?;

    let clear_values = clear_values(target.clear_color);
    let render_pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(target.render_pass)
        .framebuffer(target.framebuffer)
        .render_area(full_scissor(target.extent))
        .clear_values(&clear_values);

    unsafe {
        device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);

        // Declared dynamic in the pipeline, so both must be set here
        device.cmd_set_viewport(cmd, 0, &[full_viewport(target.extent)]);
        device.cmd_set_scissor(cmd, 0, &[full_scissor(target.extent)]);

        device.cmd_draw(cmd, PLACEHOLDER_VERTEX_COUNT, 1, 0, 0);
        device.cmd_end_render_pass(cmd);
    }

    unsafe { device.end_command_buffer(cmd) }.map_err(RenderError::vk("vkEndCommandBuffer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn clear_value_carries_color() {
        let values = clear_values([0.1, 0.2, 0.3, 1.0]);
        let color = unsafe { values[0].color.float32 };
        assert_eq!(color, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn viewport_covers_extent() {
        let viewport = full_viewport(EXTENT);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn scissor_covers_extent() {
        let scissor = full_scissor(EXTENT);
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!(scissor.extent, EXTENT);
    }
}
