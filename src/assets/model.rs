//! glTF 2.0 loading into a flat, renderer-agnostic scene graph.
//!
//! The parser never touches the file system or network on its own. External
//! buffers and images are fetched through the caller's [`UriResolver`];
//! `data:` URIs and the GLB `BIN` chunk are handled here.

use super::texture::{self, Texture};
use super::{AssetError, UriResolver};
use crate::scene::Rgb;
use base64::Engine as _;
use glam::{Mat4, Vec3};
use std::fmt;
use std::sync::Arc;

pub enum ModelSource {
    /// GLB container.
    Binary(Arc<[u8]>),
    /// glTF JSON document.
    Text(String),
}

impl ModelSource {
    fn as_bytes(&self) -> &[u8] {
        match self {
            ModelSource::Binary(bytes) => bytes,
            ModelSource::Text(text) => text.as_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub material: Option<usize>,
    pub world: Mat4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub base_color_factor: [f32; 4],
    /// Index into [`SceneGraph::textures`].
    pub base_color_texture: Option<usize>,
    pub double_sided: bool,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            base_color_texture: None,
            double_sided: false,
        }
    }
}

/// Background/environment a scene asks for through its `extras`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneAmbient {
    pub background: Option<Rgb>,
    pub environment: Option<String>,
}

impl SceneAmbient {
    pub fn is_empty(&self) -> bool {
        self.background.is_none() && self.environment.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    pub fn center(&self) -> [f32; 3] {
        ((Vec3::from(self.min) + Vec3::from(self.max)) * 0.5).to_array()
    }

    /// Half-size along each axis.
    pub fn extent(&self) -> [f32; 3] {
        ((Vec3::from(self.max) - Vec3::from(self.min)) * 0.5).to_array()
    }
}

pub struct SceneGraph {
    pub name: String,
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
    /// One slot per glTF image; `None` when the image could not be fetched or decoded.
    pub textures: Vec<Option<Texture>>,
    pub bounds: Bounds,
    pub ambient: SceneAmbient,
}

impl fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneGraph")
            .field("name", &self.name)
            .field("meshes", &self.meshes.len())
            .field("materials", &self.materials.len())
            .field("textures", &self.textures.len())
            .field("bounds", &self.bounds)
            .field("ambient", &self.ambient)
            .finish()
    }
}

impl SceneGraph {
    pub fn material(&self, index: Option<usize>) -> Option<&MaterialData> {
        index.and_then(|index| self.materials.get(index))
    }

    pub fn texture(&self, index: Option<usize>) -> Option<&Texture> {
        index
            .and_then(|index| self.textures.get(index))
            .and_then(Option::as_ref)
    }

    pub fn clear_ambient(&mut self) {
        self.ambient = SceneAmbient::default();
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|mesh| mesh.indices.len() / 3).sum()
    }
}

pub fn load_model(
    source: &ModelSource,
    resolver: Option<&dyn UriResolver>,
) -> Result<SceneGraph, AssetError> {
    let gltf = gltf::Gltf::from_slice(source.as_bytes())?;
    let buffers = load_buffers(&gltf, resolver)?;
    let textures = load_images(&gltf.document, &buffers, resolver);
    let materials = gltf.document.materials().map(material_data).collect();

    let scene = gltf
        .document
        .default_scene()
        .or_else(|| gltf.document.scenes().next())
        .ok_or(AssetError::NoScene)?;

    let mut meshes = Vec::new();
    let mut ancestors = Vec::new();
    for node in scene.nodes() {
        collect_node(&node, Mat4::IDENTITY, &buffers, &mut ancestors, &mut meshes)?;
    }

    let ambient = ambient_from_extras(scene.extras().as_ref().map(|raw| raw.get()));
    let bounds = compute_bounds(&meshes);
    Ok(SceneGraph {
        name: scene.name().unwrap_or("scene").to_string(),
        meshes,
        materials,
        textures,
        bounds,
        ambient,
    })
}

fn load_buffers(
    gltf: &gltf::Gltf,
    resolver: Option<&dyn UriResolver>,
) -> Result<Vec<Arc<[u8]>>, AssetError> {
    gltf.document
        .buffers()
        .map(|buffer| {
            let data: Arc<[u8]> = match buffer.source() {
                gltf::buffer::Source::Bin => gltf
                    .blob
                    .as_deref()
                    .map(Arc::<[u8]>::from)
                    .ok_or(AssetError::MissingBinChunk)?,
                gltf::buffer::Source::Uri(uri) => fetch_uri(uri, resolver)?,
            };
            if data.len() < buffer.length() {
                return Err(AssetError::BufferTooShort {
                    index: buffer.index(),
                    expected: buffer.length(),
                    actual: data.len(),
                });
            }
            Ok(data)
        })
        .collect()
}

/// Images that fail to load are skipped with a warning; the model still loads.
fn load_images(
    document: &gltf::Document,
    buffers: &[Arc<[u8]>],
    resolver: Option<&dyn UriResolver>,
) -> Vec<Option<Texture>> {
    document
        .images()
        .map(|image| {
            let encoded = match image.source() {
                gltf::image::Source::View { view, .. } => {
                    let start = view.offset();
                    let end = start + view.length();
                    buffers
                        .get(view.buffer().index())
                        .and_then(|buffer| buffer.get(start..end))
                        .map(Arc::<[u8]>::from)
                        .ok_or(AssetError::BufferViewOutOfRange {
                            view: view.index(),
                        })
                }
                gltf::image::Source::Uri { uri, .. } => fetch_uri(uri, resolver),
            };
            match encoded.and_then(texture::load_texture) {
                Ok(texture) => Some(texture),
                Err(err) => {
                    log::warn!("Couldn't load texture for image {}: {}", image.index(), err);
                    None
                }
            }
        })
        .collect()
}

fn fetch_uri(uri: &str, resolver: Option<&dyn UriResolver>) -> Result<Arc<[u8]>, AssetError> {
    if let Some(rest) = uri.strip_prefix("data:") {
        return decode_data_uri(rest);
    }
    match resolver {
        Some(resolver) => resolver.resolve(uri),
        None => Err(AssetError::UnresolvedUri(uri.to_string())),
    }
}

fn decode_data_uri(rest: &str) -> Result<Arc<[u8]>, AssetError> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| AssetError::DataUri("missing ',' separator".to_string()))?;
    if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map(Arc::from)
            .map_err(|err| AssetError::DataUri(err.to_string()))
    } else {
        Ok(Arc::from(payload.as_bytes()))
    }
}

fn material_data(material: gltf::Material<'_>) -> MaterialData {
    let pbr = material.pbr_metallic_roughness();
    MaterialData {
        name: material.name().unwrap_or("material").to_string(),
        base_color_factor: pbr.base_color_factor(),
        base_color_texture: pbr
            .base_color_texture()
            .map(|info| info.texture().source().index()),
        double_sided: material.double_sided(),
    }
}

/// Maximum node nesting; deeper hierarchies are rejected.
const MAX_NODE_DEPTH: usize = 256;

/// `ancestors` holds the node indices from the scene root down to `node`'s parent.
fn collect_node(
    node: &gltf::Node<'_>,
    parent: Mat4,
    buffers: &[Arc<[u8]>],
    ancestors: &mut Vec<usize>,
    out: &mut Vec<MeshData>,
) -> Result<(), AssetError> {
    if ancestors.contains(&node.index()) {
        return Err(AssetError::NodeCycle { node: node.index() });
    }
    if ancestors.len() >= MAX_NODE_DEPTH {
        return Err(AssetError::NodeDepth {
            limit: MAX_NODE_DEPTH,
        });
    }
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        let mesh_name = mesh.name().or(node.name()).unwrap_or("mesh");
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::debug!(
                    "Skipping {:?} primitive in mesh '{}'",
                    primitive.mode(),
                    mesh_name
                );
                continue;
            }
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let vertex_count = positions.len();
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..vertex_count as u32).collect(),
            };
            if indices.iter().any(|&index| index as usize >= vertex_count) {
                log::warn!("Mesh '{}' has out-of-range indices; skipped", mesh_name);
                continue;
            }
            let normals = reader
                .read_normals()
                .map(|normals| normals.collect::<Vec<_>>())
                .filter(|normals| normals.len() == vertex_count)
                .unwrap_or_else(|| compute_normals(&positions, &indices));
            let uvs = reader
                .read_tex_coords(0)
                .map(|uvs| uvs.into_f32().collect::<Vec<_>>())
                .filter(|uvs| uvs.len() == vertex_count)
                .unwrap_or_else(|| vec![[0.0, 0.0]; vertex_count]);

            out.push(MeshData {
                name: mesh_name.to_string(),
                positions,
                normals,
                uvs,
                indices,
                material: primitive.material().index(),
                world,
            });
        }
    }
    ancestors.push(node.index());
    for child in node.children() {
        collect_node(&child, world, buffers, ancestors, out)?;
    }
    ancestors.pop();
    Ok(())
}

/// Area-weighted vertex normals for primitives that ship without them.
fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let pa = Vec3::from(positions[a]);
        let face = (Vec3::from(positions[b]) - pa).cross(Vec3::from(positions[c]) - pa);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}

fn compute_bounds(meshes: &[MeshData]) -> Bounds {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for mesh in meshes {
        for position in &mesh.positions {
            let world = mesh.world.transform_point3(Vec3::from(*position));
            min = min.min(world);
            max = max.max(world);
        }
    }
    if min.x > max.x {
        return Bounds::default();
    }
    Bounds {
        min: min.to_array(),
        max: max.to_array(),
    }
}

#[derive(Default, serde::Deserialize)]
struct AmbientExtras {
    background: Option<String>,
    environment: Option<String>,
}

fn ambient_from_extras(raw: Option<&str>) -> SceneAmbient {
    let Some(raw) = raw else {
        return SceneAmbient::default();
    };
    let extras: AmbientExtras = match serde_json::from_str(raw) {
        Ok(extras) => extras,
        Err(_) => return SceneAmbient::default(),
    };
    SceneAmbient {
        background: extras
            .background
            .as_deref()
            .and_then(|hex| Rgb::from_hex(hex).ok()),
        environment: extras.environment,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Minimal glTF documents for loader, archive and viewer tests.

    use base64::Engine as _;

    /// One triangle: positions (36 bytes) then u16 indices (6 bytes, padded to 8).
    pub fn triangle_buffer() -> Vec<u8> {
        let mut bytes = Vec::new();
        for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        for index in [0u16, 1, 2] {
            bytes.extend_from_slice(&index.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }

    /// glTF JSON with one triangle mesh. `buffer_uri` is used verbatim;
    /// `image_uri` adds a base color texture when given.
    pub fn triangle_gltf(buffer_uri: &str, image_uri: Option<&str>, extras: Option<&str>) -> String {
        let (images, textures, material_texture) = match image_uri {
            Some(uri) => (
                format!(r#","images":[{{"uri":"{uri}"}}]"#),
                r#","textures":[{"source":0}]"#.to_string(),
                r#","baseColorTexture":{"index":0}"#.to_string(),
            ),
            None => (String::new(), String::new(), String::new()),
        };
        let extras = extras
            .map(|extras| format!(r#","extras":{extras}"#))
            .unwrap_or_default();
        format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"name": "fixture", "nodes": [0]{extras}}}],
  "nodes": [{{"mesh": 0, "translation": [0.0, 1.0, 0.0]}}],
  "meshes": [{{"name": "tri", "primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1, "material": 0}}]}}],
  "materials": [{{"name": "paint", "pbrMetallicRoughness": {{"baseColorFactor": [1.0, 0.5, 0.25, 1.0]{material_texture}}}}}],
  "buffers": [{{"uri": "{buffer_uri}", "byteLength": 44}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 6}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}},
    {{"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}}
  ]{images}{textures}
}}"#
        )
    }

    pub fn embedded_triangle_gltf() -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(triangle_buffer());
        triangle_gltf(
            &format!("data:application/octet-stream;base64,{encoded}"),
            None,
            None,
        )
    }

    /// Wrap a JSON document without buffer URI plus a BIN payload into a GLB container.
    pub fn triangle_glb() -> Vec<u8> {
        let json = triangle_gltf("", None, None).replace(r#""uri": "", "#, "");
        let mut json_bytes = json.into_bytes();
        while json_bytes.len() % 4 != 0 {
            json_bytes.push(b' ');
        }
        let mut bin = triangle_buffer();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json_bytes.len() + 8 + bin.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json_bytes);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);
        glb
    }
}
