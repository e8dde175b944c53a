// Graphics pipeline creation
//
// One color-only render pass, one fixed-function pipeline drawing geometry
// baked into the vertex shader, and one framebuffer per swapchain view.

use ash::vk;
use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use super::device::LogicalDevice;
use super::error::{RenderError, RenderResult};
use super::shader::ShaderModule;

const SHADER_ENTRY_POINT: &CStr = c"main";

/// Viewport and scissor are set per frame by the command recorder
pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

pub struct RenderPass {
    pub raw: vk::RenderPass,
    device: Arc<LogicalDevice>,
}

impl RenderPass {
    /// Single color attachment, cleared on load and kept for presentation
    pub fn new(device: Arc<LogicalDevice>, format: vk::Format) -> RenderResult<Self> {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachments = &[color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(color_attachments)
            .build();

        // The image is only available after acquire's semaphore; hold the
        // color write until then
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build();

        let attachments = &[color_attachment];
        let subpasses = &[subpass];
        let dependencies = &[dependency];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(attachments)
            .subpasses(subpasses)
            .dependencies(dependencies);

        let raw = unsafe { device.raw.create_render_pass(&render_pass_info, None) }
            .map_err(RenderError::vk("vkCreateRenderPass"))?;

        Ok(Self { raw, device })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_render_pass(self.raw, None);
        }
    }
}

pub struct GraphicsPipeline {
    pub raw: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    device: Arc<LogicalDevice>,
}

impl GraphicsPipeline {
    pub fn new(
        device: Arc<LogicalDevice>,
        render_pass: &RenderPass,
        vertex_shader: &Path,
        fragment_shader: &Path,
    ) -> RenderResult<Self> {
        // Modules are dropped (destroyed) when this function returns
        let vert = ShaderModule::from_file(device.clone(), vertex_shader)?;
        let frag = ShaderModule::from_file(device.clone(), fragment_shader)?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert.raw)
                .name(SHADER_ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag.raw)
                .name(SHADER_ENTRY_POINT)
                .build(),
        ];

        // Geometry is hard-coded in the vertex shader
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

        // Counts only, the actual rectangles are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // Color blending (no blending, opaque)
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = &[color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.raw.create_pipeline_layout(&layout_info, None) }
            .map_err(RenderError::vk("vkCreatePipelineLayout"))?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.raw)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .raw
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        match pipelines {
            Ok(pipelines) => Ok(Self {
                raw: pipelines[0],
                layout,
                device,
            }),
            Err((_, result)) => {
                unsafe { device.raw.destroy_pipeline_layout(layout, None) };
                Err(RenderError::Vulkan {
                    call: "vkCreateGraphicsPipelines",
                    result,
                })
            }
        }
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_pipeline(self.raw, None);
            self.device.raw.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// One framebuffer per swapchain image view
pub struct Framebuffers {
    pub raw: Vec<vk::Framebuffer>,
    device: Arc<LogicalDevice>,
}

impl Framebuffers {
    pub fn new(
        device: Arc<LogicalDevice>,
        render_pass: &RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RenderResult<Self> {
        let mut framebuffers = Self {
            raw: Vec::with_capacity(image_views.len()),
            device,
        };

        for &image_view in image_views {
            let attachments = &[image_view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass.raw)
                .attachments(attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer =
                unsafe { framebuffers.device.raw.create_framebuffer(&framebuffer_info, None) }
                    .map_err(RenderError::vk("vkCreateFramebuffer"))?;
            framebuffers.raw.push(framebuffer);
        }

        Ok(framebuffers)
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.raw {
                self.device.raw.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
