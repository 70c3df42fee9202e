// SPDX-License-Identifier: CEPL-1.0

//! Fixed quad geometry and the replaceable fragment program.

use std::ffi::CStr;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use mandel_render::MAX_PARAMETER_BLOCK_BYTES;

use crate::error::{EngineError, Result, VkContext};
use crate::shader::create_module;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct Vertex {
    pub pos: [f32; 2],
    /// Placeholder attribute; the fragment program decides the final color.
    pub color: [f32; 3],
}

/// Full clip-space square.
pub(crate) const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        pos: [-1.0, -1.0],
        color: [0.0, 0.0, 0.0],
    },
    Vertex {
        pos: [1.0, -1.0],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        pos: [1.0, 1.0],
        color: [1.0, 1.0, 0.0],
    },
    Vertex {
        pos: [-1.0, 1.0],
        color: [0.0, 1.0, 0.0],
    },
];
pub(crate) const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

const ENTRY_POINT: &CStr = c"main";

/// Rejects parameter-block sizes the pipeline layout could not carry.
pub(crate) fn validate_block_size(size: u32) -> Result<()> {
    let max = MAX_PARAMETER_BLOCK_BYTES as u32;
    if size > max {
        return Err(EngineError::BlockTooLarge { size, max });
    }
    if size % 4 != 0 {
        return Err(EngineError::BlockMisaligned(size));
    }
    Ok(())
}

/// Fragment-only range of `size` bytes, or none for an empty block.
pub(crate) fn push_constant_ranges(size: u32) -> Vec<vk::PushConstantRange> {
    if size == 0 {
        Vec::new()
    } else {
        vec![vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size,
        }]
    }
}

fn vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 2] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, pos) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, color) as u32,
        },
    ]
}

/// Fragment module, pipeline layout and pipeline: always replaced together.
/// Dropping destroys pipeline, then layout, then module.
pub(crate) struct FragmentProgram {
    device: ash::Device,
    pub module: vk::ShaderModule,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub push_size: u32,
}

impl FragmentProgram {
    pub unsafe fn new(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        vertex_module: vk::ShaderModule,
        fragment_code: &[u32],
        push_size: u32,
    ) -> Result<Self> {
        validate_block_size(push_size)?;

        // Null handles are valid to destroy, so partial construction unwinds via Drop.
        let mut program = FragmentProgram {
            device: device.clone(),
            module: create_module(device, fragment_code)?,
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            push_size,
        };

        let ranges = push_constant_ranges(push_size);
        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            push_constant_range_count: ranges.len() as u32,
            p_push_constant_ranges: ranges.as_ptr(),
            ..Default::default()
        };
        program.layout = device
            .create_pipeline_layout(&layout_info, None)
            .context("create_pipeline_layout")?;

        program.pipeline = create_pipeline(
            device,
            render_pass,
            program.layout,
            vertex_module,
            program.module,
        )?;
        Ok(program)
    }
}

impl Drop for FragmentProgram {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    vs: vk::ShaderModule,
    fs: vk::ShaderModule,
) -> Result<vk::Pipeline> {
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: ENTRY_POINT.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: ENTRY_POINT.as_ptr(),
            ..Default::default()
        },
    ];

    let vb = vertex_binding();
    let va = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &vb,
        vertex_attribute_description_count: va.len() as u32,
        p_vertex_attribute_descriptions: va.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: vk::FALSE,
        ..Default::default()
    };

    // Viewport and scissor are set per draw so extent changes need no rebuild.
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };

    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        depth_clamp_enable: vk::FALSE,
        rasterizer_discard_enable: vk::FALSE,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        depth_bias_enable: vk::FALSE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        sample_shading_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        logic_op_enable: vk::FALSE,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let pipelines = device
        .create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        )
        .map_err(|(_, err)| err)
        .context("create_graphics_pipelines")?;
    Ok(pipelines[0])
}
