//! GPU side of a [`MountSet`]: sky, foreground scene and floor.
//!
//! Consecutive mount sets are diffed by slot and only changed slots touch GPU
//! resources. Backdrop, fog and lighting live in the globals uniform, which is
//! rewritten every frame.

use super::camera::CameraController;
use super::mesh::{floor_disc, GpuMesh, GpuScene, GpuTexture};
use super::pipelines::{Pipelines, FLOOR_STENCIL};
use crate::app::viewer::CurrentAsset;
use crate::assets::LoadedAsset;
use crate::config::StageLayout;
use crate::scene::{gradient_rows, Backdrop, Lighting, MountSet, SkySphere, Slot};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

const FLOOR_SEGMENTS: u32 = 96;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Globals {
    pub view_proj: [[f32; 4]; 4],
    pub sky_inv: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub backdrop: [f32; 4],
    pub fog_color: [f32; 4],
    pub fog_range: [f32; 4],
    pub lighting: [f32; 4],
}

const SKY_MODE_COLOR: f32 = 0.0;
const SKY_MODE_PRESET: f32 = 1.0;
const SKY_MODE_TEXTURE: f32 = 2.0;

/// Reflection through the horizontal plane `y = height`.
pub fn mirror_matrix(height: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, height, 0.0))
        * Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
        * Mat4::from_translation(Vec3::new(0.0, -height, 0.0))
}

impl Globals {
    pub fn new(
        camera: &CameraController,
        aspect: f32,
        mounts: &MountSet,
        layout: &StageLayout,
    ) -> Self {
        let view = camera.view_matrix();
        let proj = camera.projection_matrix(aspect);
        let rotation_only = Mat4::from_mat3(glam::Mat3::from_mat4(view));
        let sky_inv = (proj * rotation_only).inverse();

        let (backdrop_color, backdrop_mode) = match mounts.backdrop {
            Backdrop::Color(color) => (color.to_linear(), SKY_MODE_COLOR),
            Backdrop::Preset(_) => ([0.0; 3], SKY_MODE_PRESET),
        };
        let sky_mode = if mounts.sky.is_some() {
            SKY_MODE_TEXTURE
        } else {
            backdrop_mode
        };
        let (fog_color, fog_on) = match mounts.fog {
            Some(fog) => (fog.color.to_linear(), 1.0),
            None => ([0.0; 3], 0.0),
        };
        let (fog_near, fog_far) = mounts
            .fog
            .map(|fog| (fog.near, fog.far))
            .unwrap_or((layout.fog_near, layout.fog_far));
        let preset_light = match mounts.lighting {
            Lighting::Preset(_) => 1.0,
            Lighting::Default => 0.0,
        };
        let [x, y, z] = camera.position;

        Self {
            view_proj: (proj * view).to_cols_array_2d(),
            sky_inv: sky_inv.to_cols_array_2d(),
            camera_pos: [x, y, z, 1.0],
            backdrop: [backdrop_color[0], backdrop_color[1], backdrop_color[2], sky_mode],
            fog_color: [fog_color[0], fog_color[1], fog_color[2], fog_on],
            fog_range: [fog_near, fog_far, layout.sky_radius, 0.0],
            lighting: [preset_light, layout.floor_height, 0.0, 0.0],
        }
    }

    /// Same view seen through the floor mirror.
    pub fn mirrored(&self, floor_height: f32) -> Self {
        let view_proj = Mat4::from_cols_array_2d(&self.view_proj) * mirror_matrix(floor_height);
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            lighting: [self.lighting[0], floor_height, 1.0, 0.0],
            ..*self
        }
    }
}

/// Remembers the last applied [`MountSet`].
#[derive(Debug, Default)]
pub struct MountTracker {
    mounted: Option<MountSet>,
}

impl MountTracker {
    /// Slots to remount to go from the current state to `next`. Everything
    /// is remounted the first time.
    pub fn plan(&mut self, next: &MountSet) -> Vec<Slot> {
        let slots = match &self.mounted {
            Some(previous) => previous.changed_slots(next),
            None => vec![
                Slot::Backdrop,
                Slot::Fog,
                Slot::Lighting,
                Slot::Sky,
                Slot::Foreground,
                Slot::Floor,
            ],
        };
        self.mounted = Some(*next);
        slots
    }

    #[cfg(test)]
    pub fn mounted(&self) -> Option<&MountSet> {
        self.mounted.as_ref()
    }
}

struct SkyMount {
    texture: GpuTexture,
    /// Last uploaded video frame.
    video_sequence: u64,
}

pub struct Stage {
    pipelines: Pipelines,
    globals_buffer: wgpu::Buffer,
    mirrored_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    mirrored_bind_group: wgpu::BindGroup,
    sky_sampler: wgpu::Sampler,
    mesh_sampler: wgpu::Sampler,
    white: GpuTexture,
    sky: Option<SkyMount>,
    foreground: Option<GpuScene>,
    floor: Option<GpuMesh>,
    floor_height: f32,
    tracker: MountTracker,
}

impl Stage {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let pipelines = Pipelines::new(device, format);
        let uniform = |label: &str| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(&<Globals as bytemuck::Zeroable>::zeroed()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        };
        let globals_buffer = uniform("globals");
        let mirrored_buffer = uniform("mirrored globals");
        let sky_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sky sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let mesh_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("mesh sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let white = GpuTexture::white(device, queue);
        let globals_bind_group =
            make_globals_bind_group(device, &pipelines, &globals_buffer, &white.view, &sky_sampler);
        let mirrored_bind_group =
            make_globals_bind_group(device, &pipelines, &mirrored_buffer, &white.view, &sky_sampler);

        Self {
            pipelines,
            globals_buffer,
            mirrored_buffer,
            globals_bind_group,
            mirrored_bind_group,
            sky_sampler,
            mesh_sampler,
            white,
            sky: None,
            foreground: None,
            floor: None,
            floor_height: 0.0,
            tracker: MountTracker::default(),
        }
    }

    /// Bring GPU resources in line with `next`, then refresh any video frame.
    pub fn sync(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        next: &MountSet,
        current: Option<&CurrentAsset>,
    ) {
        for slot in self.tracker.plan(next) {
            log::debug!("Remounting {:?}", slot);
            match slot {
                Slot::Sky => self.mount_sky(device, queue, next.sky, current),
                Slot::Foreground => self.mount_foreground(device, queue, next.foreground, current),
                Slot::Floor => {
                    self.floor = next.floor.map(|floor| {
                        self.floor_height = floor.height;
                        let (vertices, indices) =
                            floor_disc(floor.radius, floor.height, FLOOR_SEGMENTS);
                        GpuMesh::new(device, "floor", &vertices, &indices)
                    });
                }
                Slot::Backdrop | Slot::Fog | Slot::Lighting => {}
            }
        }
        self.refresh_video(queue, next.sky, current);
    }

    fn mount_sky(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        sky: Option<SkySphere>,
        current: Option<&CurrentAsset>,
    ) {
        let texture = match sky {
            None => None,
            Some(SkySphere::Gradient(gradient)) => {
                let [top, bottom] = gradient_rows(gradient);
                let pixels = [top.r, top.g, top.b, 255, bottom.r, bottom.g, bottom.b, 255];
                Some(GpuTexture::from_rgba(device, queue, "gradient sky", 1, 2, &pixels))
            }
            Some(SkySphere::Image(id)) => match current {
                Some(CurrentAsset {
                    id: current_id,
                    asset: LoadedAsset::Image { texture, .. },
                    ..
                }) if *current_id == id => {
                    Some(GpuTexture::from_texture(device, queue, "image sky", texture))
                }
                _ => None,
            },
            Some(SkySphere::Video(id)) => match current {
                Some(CurrentAsset {
                    id: current_id,
                    asset: LoadedAsset::Video { surface, .. },
                    ..
                }) if *current_id == id => {
                    let limit = device.limits().max_texture_dimension_2d;
                    if surface.width > limit || surface.height > limit {
                        log::warn!(
                            "Video frames are {}x{}, above the device limit {}; lower video.frame_width/frame_height",
                            surface.width,
                            surface.height,
                            limit
                        );
                        None
                    } else {
                        Some(GpuTexture::empty(
                            device,
                            "video sky",
                            surface.width,
                            surface.height,
                        ))
                    }
                }
                _ => None,
            },
        };
        if sky.is_some() && texture.is_none() {
            log::warn!("Sky {:?} refers to an asset that is no longer loaded", sky);
        }
        let view = texture.as_ref().map(|t| &t.view).unwrap_or(&self.white.view);
        self.globals_bind_group = make_globals_bind_group(
            device,
            &self.pipelines,
            &self.globals_buffer,
            view,
            &self.sky_sampler,
        );
        self.mirrored_bind_group = make_globals_bind_group(
            device,
            &self.pipelines,
            &self.mirrored_buffer,
            view,
            &self.sky_sampler,
        );
        self.sky = texture.map(|texture| SkyMount {
            texture,
            video_sequence: 0,
        });
    }

    fn mount_foreground(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        foreground: Option<crate::scene::AssetId>,
        current: Option<&CurrentAsset>,
    ) {
        self.foreground = foreground.and_then(|id| {
            let current = current.filter(|current| current.id == id)?;
            let scene = current.asset.scene()?;
            log::info!(
                "Mounting {} ({} meshes, {} triangles)",
                current.name,
                scene.meshes.len(),
                scene.triangle_count()
            );
            Some(GpuScene::upload(
                device,
                queue,
                &self.pipelines.mesh_layout,
                &self.mesh_sampler,
                &self.white,
                scene,
            ))
        });
    }

    fn refresh_video(
        &mut self,
        queue: &wgpu::Queue,
        sky: Option<SkySphere>,
        current: Option<&CurrentAsset>,
    ) {
        let (Some(SkySphere::Video(_)), Some(mount)) = (sky, self.sky.as_mut()) else {
            return;
        };
        let Some(LoadedAsset::Video { surface, .. }) = current.map(|current| &current.asset) else {
            return;
        };
        if let Some(frame) = surface.latest_frame() {
            if frame.sequence != mount.video_sequence {
                mount.texture.write(queue, &frame.pixels);
                mount.video_sequence = frame.sequence;
            }
        }
    }

    pub fn write_globals(&self, queue: &wgpu::Queue, globals: &Globals) {
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(globals));
        let mirrored = globals.mirrored(self.floor_height);
        queue.write_buffer(&self.mirrored_buffer, 0, bytemuck::bytes_of(&mirrored));
    }

    /// Sky, then the floor with its reflection, then the foreground.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipelines.sky);
        pass.set_bind_group(0, &self.globals_bind_group, &[]);
        pass.draw(0..3, 0..1);

        if let Some(floor) = &self.floor {
            pass.set_stencil_reference(FLOOR_STENCIL);
            pass.set_pipeline(&self.pipelines.floor_mask);
            floor.draw(pass);

            if let Some(scene) = &self.foreground {
                pass.set_pipeline(&self.pipelines.mirrored_mesh);
                pass.set_bind_group(0, &self.mirrored_bind_group, &[]);
                for draw in &scene.draws {
                    pass.set_bind_group(1, &draw.bind_group, &[]);
                    draw.mesh.draw(pass);
                }
                pass.set_bind_group(0, &self.globals_bind_group, &[]);
            }

            pass.set_pipeline(&self.pipelines.floor_surface);
            floor.draw(pass);
        }

        if let Some(scene) = &self.foreground {
            pass.set_pipeline(&self.pipelines.mesh);
            for draw in &scene.draws {
                pass.set_bind_group(1, &draw.bind_group, &[]);
                draw.mesh.draw(pass);
            }
        }
    }
}

fn make_globals_bind_group(
    device: &wgpu::Device,
    pipelines: &Pipelines,
    buffer: &wgpu::Buffer,
    sky_view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("globals"),
        layout: &pipelines.globals_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(sky_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}
