//! Render pipelines for the stage. Every pass shares the globals layout at
//! group 0; mesh draws add their own uniform and texture at group 1.

use super::mesh::Vertex;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Stencil value written where the floor disc covers the screen.
pub const FLOOR_STENCIL: u32 = 1;

const SKY_SOURCE: &str = concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/sky.wgsl"));
const MESH_SOURCE: &str = concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/mesh.wgsl"));
const FLOOR_SOURCE: &str = concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/floor.wgsl"));

pub struct Pipelines {
    pub globals_layout: wgpu::BindGroupLayout,
    pub mesh_layout: wgpu::BindGroupLayout,
    pub sky: wgpu::RenderPipeline,
    pub mesh: wgpu::RenderPipeline,
    /// Meshes drawn through the mirror, only where the floor stencil is set.
    pub mirrored_mesh: wgpu::RenderPipeline,
    pub floor_mask: wgpu::RenderPipeline,
    pub floor_surface: wgpu::RenderPipeline,
}

fn uniform_texture_sampler_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn stencil(compare: wgpu::CompareFunction, pass_op: wgpu::StencilOperation) -> wgpu::StencilState {
    let face = wgpu::StencilFaceState {
        compare,
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op,
    };
    wgpu::StencilState {
        front: face,
        back: face,
        read_mask: 0xff,
        write_mask: 0xff,
    }
}

fn depth_state(
    write: bool,
    compare: wgpu::CompareFunction,
    stencil: wgpu::StencilState,
) -> Option<wgpu::DepthStencilState> {
    Some(wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil,
        bias: wgpu::DepthBiasState::default(),
    })
}

struct PipelineDesc<'a> {
    label: &'a str,
    module: &'a wgpu::ShaderModule,
    layout: &'a wgpu::PipelineLayout,
    fragment_entry: &'a str,
    vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
    blend: Option<wgpu::BlendState>,
    write_mask: wgpu::ColorWrites,
    depth_stencil: Option<wgpu::DepthStencilState>,
}

fn build(device: &wgpu::Device, format: wgpu::TextureFormat, desc: PipelineDesc<'_>) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.module,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: desc.vertex_buffers,
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: desc.depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: desc.module,
            entry_point: Some(desc.fragment_entry),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: desc.blend,
                write_mask: desc.write_mask,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let globals_layout = uniform_texture_sampler_layout(device, "globals layout");
        let mesh_layout = uniform_texture_sampler_layout(device, "mesh layout");

        let globals_only = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("globals pipeline layout"),
            bind_group_layouts: &[&globals_layout],
            push_constant_ranges: &[],
        });
        let with_mesh = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mesh pipeline layout"),
            bind_group_layouts: &[&globals_layout, &mesh_layout],
            push_constant_ranges: &[],
        });

        let shader = |label: &str, source: &'static str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        };
        let sky_module = shader("sky shader", SKY_SOURCE);
        let mesh_module = shader("mesh shader", MESH_SOURCE);
        let floor_module = shader("floor shader", FLOOR_SOURCE);
        let vertex = [Vertex::layout()];
        let ignore_stencil = wgpu::StencilState::default();

        let sky = build(
            device,
            format,
            PipelineDesc {
                label: "sky",
                module: &sky_module,
                layout: &globals_only,
                fragment_entry: "fs_main",
                vertex_buffers: &[],
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
                depth_stencil: depth_state(false, wgpu::CompareFunction::Always, ignore_stencil.clone()),
            },
        );
        let mesh = build(
            device,
            format,
            PipelineDesc {
                label: "mesh",
                module: &mesh_module,
                layout: &with_mesh,
                fragment_entry: "fs_main",
                vertex_buffers: &vertex,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
                depth_stencil: depth_state(true, wgpu::CompareFunction::Less, ignore_stencil.clone()),
            },
        );
        let mirrored_mesh = build(
            device,
            format,
            PipelineDesc {
                label: "mirrored mesh",
                module: &mesh_module,
                layout: &with_mesh,
                fragment_entry: "fs_main",
                vertex_buffers: &vertex,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
                depth_stencil: depth_state(
                    true,
                    wgpu::CompareFunction::Less,
                    stencil(wgpu::CompareFunction::Equal, wgpu::StencilOperation::Keep),
                ),
            },
        );
        let floor_mask = build(
            device,
            format,
            PipelineDesc {
                label: "floor mask",
                module: &floor_module,
                layout: &globals_only,
                fragment_entry: "fs_mask",
                vertex_buffers: &vertex,
                blend: None,
                write_mask: wgpu::ColorWrites::empty(),
                depth_stencil: depth_state(
                    false,
                    wgpu::CompareFunction::Always,
                    stencil(wgpu::CompareFunction::Always, wgpu::StencilOperation::Replace),
                ),
            },
        );
        let floor_surface = build(
            device,
            format,
            PipelineDesc {
                label: "floor surface",
                module: &floor_module,
                layout: &globals_only,
                fragment_entry: "fs_surface",
                vertex_buffers: &vertex,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
                depth_stencil: depth_state(true, wgpu::CompareFunction::LessEqual, ignore_stencil),
            },
        );

        Self {
            globals_layout,
            mesh_layout,
            sky,
            mesh,
            mirrored_mesh,
            floor_mask,
            floor_surface,
        }
    }
}
