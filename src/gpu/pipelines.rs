//! Bind group layouts and pipelines for the kernel and render stages.

use super::shaders::{kernel_shader, stage_shader, CONNECT_ENTRY, INTEGRATE_ENTRY};
use super::DEPTH_FORMAT;
use crate::error::PipelineError;
use crate::mesh::Stage;

/// Compiled kernel: one layout shared by both entry points.
pub struct KernelPipelines {
    pub layout: wgpu::BindGroupLayout,
    pub integrate: wgpu::ComputePipeline,
    pub connect: wgpu::ComputePipeline,
}

/// Compiled render stage and the layout of its group 0.
pub struct StagePipeline {
    pub layout: wgpu::BindGroupLayout,
    pub pipeline: wgpu::RenderPipeline,
}

fn storage_entry(binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Compile `source`, turning validation errors into [`PipelineError::Shader`].
fn create_module(
    device: &wgpu::Device,
    label: &'static str,
    source: String,
) -> Result<wgpu::ShaderModule, PipelineError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(e) => Err(PipelineError::Shader {
            stage: label,
            message: e.to_string(),
        }),
        None => Ok(module),
    }
}

/// Camera uniform layout, bound at group 1 by both render stages.
pub fn camera_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Camera Bind Group Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

pub fn kernel_pipelines(device: &wgpu::Device) -> Result<KernelPipelines, PipelineError> {
    let shader = create_module(device, "kernel", kernel_shader())?;

    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Kernel Bind Group Layout"),
        entries: &[
            // params
            storage_entry(0, wgpu::ShaderStages::COMPUTE, true),
            // nodes
            storage_entry(1, wgpu::ShaderStages::COMPUTE, false),
            // lines
            storage_entry(2, wgpu::ShaderStages::COMPUTE, false),
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Kernel Pipeline Layout"),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });

    let compute = |entry_point: &str| {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        })
    };

    Ok(KernelPipelines {
        integrate: compute(INTEGRATE_ENTRY),
        connect: compute(CONNECT_ENTRY),
        layout,
    })
}

pub fn stage_pipeline(
    device: &wgpu::Device,
    stage: Stage,
    material: Option<&str>,
    camera_layout: &wgpu::BindGroupLayout,
    surface_format: wgpu::TextureFormat,
) -> Result<StagePipeline, PipelineError> {
    let shader = create_module(device, stage.label(), stage_shader(stage, material))?;

    let entries: &[wgpu::BindGroupLayoutEntry] = match stage {
        Stage::Particles => &[storage_entry(0, wgpu::ShaderStages::VERTEX, true)],
        Stage::Lines => &[
            storage_entry(0, wgpu::ShaderStages::VERTEX, true),
            storage_entry(1, wgpu::ShaderStages::VERTEX, true),
            storage_entry(2, wgpu::ShaderStages::VERTEX, true),
        ],
    };
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(stage.label()),
        entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(stage.label()),
        bind_group_layouts: &[&layout, camera_layout],
        push_constant_ranges: &[],
    });

    // Lines are translucent and must not occlude each other.
    let (blend, depth_write_enabled) = match stage {
        Stage::Particles => (wgpu::BlendState::REPLACE, true),
        Stage::Lines => (wgpu::BlendState::ALPHA_BLENDING, false),
    };

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(stage.label()),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                }],
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    Ok(StagePipeline { layout, pipeline })
}
