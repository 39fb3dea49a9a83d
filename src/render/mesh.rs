use crate::assets::model::{MeshData, SceneGraph};
use crate::assets::Texture;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Per-draw uniforms, bound with the base color texture (white when untextured).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshUniform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    pub base_color: [f32; 4],
}

pub fn interleave(mesh: &MeshData) -> Vec<Vertex> {
    mesh.positions
        .iter()
        .zip(&mesh.normals)
        .zip(&mesh.uvs)
        .map(|((position, normal), uv)| Vertex {
            position: *position,
            normal: *normal,
            uv: *uv,
        })
        .collect()
}

/// Triangle fan in the XZ plane, wound counter-clockwise seen from above.
pub fn floor_disc(radius: f32, height: f32, segments: u32) -> (Vec<Vertex>, Vec<u32>) {
    let segments = segments.max(3);
    let mut vertices = Vec::with_capacity(segments as usize + 1);
    vertices.push(Vertex {
        position: [0.0, height, 0.0],
        normal: [0.0, 1.0, 0.0],
        uv: [0.5, 0.5],
    });
    for i in 0..segments {
        let angle = i as f32 / segments as f32 * std::f32::consts::TAU;
        let (sin, cos) = angle.sin_cos();
        vertices.push(Vertex {
            position: [cos * radius, height, sin * radius],
            normal: [0.0, 1.0, 0.0],
            uv: [0.5 + cos * 0.5, 0.5 + sin * 0.5],
        });
    }
    let mut indices = Vec::with_capacity(segments as usize * 3);
    for i in 0..segments {
        let current = i + 1;
        let next = (i + 1) % segments + 1;
        indices.extend_from_slice(&[0, next, current]);
    }
    (vertices, indices)
}

pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn new(device: &wgpu::Device, label: &str, vertices: &[Vertex], indices: &[u32]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// Sampled 2D texture plus the view bound in shaders.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: [u32; 2],
}

impl GpuTexture {
    pub fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Self {
        let texture = Self::empty(device, label, width, height);
        texture.write(queue, pixels);
        texture
    }

    /// Upload a decoded texture, downscaling it first if the device cannot hold it.
    pub fn from_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        texture: &Texture,
    ) -> Self {
        let limit = device.limits().max_texture_dimension_2d;
        let fitted = texture.fitted(limit);
        if fitted.width != texture.width || fitted.height != texture.height {
            log::info!(
                "Downscaled {} from {}x{} to {}x{} (device limit {})",
                label,
                texture.width,
                texture.height,
                fitted.width,
                fitted.height,
                limit
            );
        }
        Self::from_rgba(device, queue, label, fitted.width, fitted.height, &fitted.pixels)
    }

    pub fn white(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::from_rgba(device, queue, "white", 1, 1, &[255, 255, 255, 255])
    }

    /// Uninitialised sRGB texture, filled later with [`GpuTexture::write`].
    pub fn empty(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size: [size.width, size.height],
        }
    }

    /// Upload a full RGBA8 frame; mismatched buffers are skipped.
    pub fn write(&self, queue: &wgpu::Queue, pixels: &[u8]) {
        let [width, height] = self.size;
        if pixels.len() != width as usize * height as usize * 4 {
            log::warn!(
                "Skipping texture upload: {} bytes for {}x{}",
                pixels.len(),
                width,
                height
            );
            return;
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

pub struct GpuDraw {
    pub mesh: GpuMesh,
    _uniform: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/// A scene graph uploaded to the GPU; dropped when the foreground unmounts.
pub struct GpuScene {
    pub draws: Vec<GpuDraw>,
    _textures: Vec<Option<GpuTexture>>,
}

impl GpuScene {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        white: &GpuTexture,
        scene: &SceneGraph,
    ) -> Self {
        let textures: Vec<Option<GpuTexture>> = scene
            .textures
            .iter()
            .enumerate()
            .map(|(index, texture)| {
                texture.as_ref().map(|texture| {
                    GpuTexture::from_texture(device, queue, &format!("scene texture {index}"), texture)
                })
            })
            .collect();

        let draws = scene
            .meshes
            .iter()
            .map(|mesh| {
                let material = scene.material(mesh.material).cloned().unwrap_or_default();
                let texture = material
                    .base_color_texture
                    .and_then(|index| textures.get(index))
                    .and_then(Option::as_ref);
                let uniform = MeshUniform {
                    model: mesh.world.to_cols_array_2d(),
                    normal: mesh.world.inverse().transpose().to_cols_array_2d(),
                    base_color: material.base_color_factor,
                };
                let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&mesh.name),
                    contents: bytemuck::bytes_of(&uniform),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                let view = texture.map(|t| &t.view).unwrap_or(&white.view);
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&mesh.name),
                    layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: uniform_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ],
                });
                GpuDraw {
                    mesh: GpuMesh::new(device, &mesh.name, &interleave(mesh), &mesh.indices),
                    _uniform: uniform_buffer,
                    bind_group,
                }
            })
            .collect();

        Self {
            draws,
            _textures: textures,
        }
    }
}
