pub mod archive;
pub mod blob;
pub mod model;
pub mod remote;
pub mod sniff;
pub mod texture;
pub mod video;

pub use archive::{ArchiveError, ResolvedArchive};
pub use blob::{BlobRegistry, OwnedBlobUrl};
pub use model::{load_model, ModelSource, SceneGraph};
pub use sniff::{classify, AssetCategory};
pub use texture::{load_texture, Texture};
pub use video::VideoSurface;

use crate::config::VideoConfig;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("pixel buffer of {len} bytes does not match {width}x{height} RGBA")]
    TextureSize { width: u32, height: u32, len: usize },
    #[error("could not resolve {0}")]
    UnresolvedUri(String),
    #[error("malformed data URI: {0}")]
    DataUri(String),
    #[error("invalid glTF: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("glTF has no scene")]
    NoScene,
    #[error("GLB buffer references a missing BIN chunk")]
    MissingBinChunk,
    #[error("buffer {index} is {actual} bytes, expected at least {expected}")]
    BufferTooShort {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("buffer view {view} is out of range")]
    BufferViewOutOfRange { view: usize },
    #[error("node {node} is its own ancestor")]
    NodeCycle { node: usize },
    #[error("node hierarchy is deeper than {limit} levels")]
    NodeDepth { limit: usize },
    #[error("glTF text is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("unsupported model format {0:?}, only glTF/GLB can be loaded")]
    UnsupportedModelFormat(String),
    #[error("failed to start video decoder {program}: {source}")]
    VideoSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("video I/O failed: {0}")]
    VideoIo(#[source] std::io::Error),
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },
}

/// Supplies bytes for URIs a glTF document references.
pub trait UriResolver: Send + Sync {
    fn resolve(&self, uri: &str) -> Result<Arc<[u8]>, AssetError>;
}

/// Resolves relative URIs against the directory a model was opened from.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    base: PathBuf,
}

impl DirectoryResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl UriResolver for DirectoryResolver {
    fn resolve(&self, uri: &str) -> Result<Arc<[u8]>, AssetError> {
        let relative = Path::new(archive::clean_path(uri));
        let escapes = relative
            .components()
            .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir));
        if uri.contains("://") || uri.starts_with("blob:") || escapes {
            return Err(AssetError::UnresolvedUri(uri.to_string()));
        }
        let path = self.base.join(relative);
        std::fs::read(&path)
            .map(Arc::from)
            .map_err(|source| AssetError::Read {
                path: path.display().to_string(),
                source,
            })
    }
}

/// A file handed to the viewer by drag-and-drop, the picker or the command line.
#[derive(Clone)]
pub struct UploadedAsset {
    pub name: String,
    /// Declared MIME type; native drops carry none.
    pub mime: String,
    pub bytes: Arc<[u8]>,
    pub path: Option<PathBuf>,
    pub category: Option<AssetCategory>,
}

impl std::fmt::Debug for UploadedAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedAsset")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .field("path", &self.path)
            .field("category", &self.category)
            .finish()
    }
}

impl UploadedAsset {
    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, bytes: Arc<[u8]>) -> Self {
        let name = name.into();
        let mime = mime.into();
        let category = classify(&name, &mime);
        Self {
            name,
            mime,
            bytes,
            path: None,
            category,
        }
    }

    /// Read a file from disk. Videos are streamed from `path` by the decoder,
    /// so their bytes are left empty.
    pub fn from_path(path: &Path) -> Result<Self, AssetError> {
        let name = file_name(path);
        let bytes: Arc<[u8]> = if classify(&name, "") == Some(AssetCategory::Video) {
            Arc::from(Vec::new())
        } else {
            let bytes = std::fs::read(path).map_err(|source| AssetError::Read {
                path: path.display().to_string(),
                source,
            })?;
            Arc::from(bytes)
        };
        let mut upload = Self::from_bytes(name, "", bytes);
        upload.path = Some(path.to_path_buf());
        Ok(upload)
    }
}

/// Display name of a file on disk, used to classify it before any read.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|value| value.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

/// Decoded result of one upload. Owns every handle and process it needs.
pub enum LoadedAsset {
    Archive(ResolvedArchive),
    Model {
        scene: SceneGraph,
        handle: OwnedBlobUrl,
    },
    Image {
        texture: Texture,
        handle: OwnedBlobUrl,
    },
    Video {
        surface: VideoSurface,
        handle: OwnedBlobUrl,
    },
}

impl LoadedAsset {
    pub fn kind(&self) -> &'static str {
        match self {
            LoadedAsset::Archive(_) => "archive scene",
            LoadedAsset::Model { .. } => "model",
            LoadedAsset::Image { .. } => "image",
            LoadedAsset::Video { .. } => "video",
        }
    }

    pub fn scene(&self) -> Option<&SceneGraph> {
        match self {
            LoadedAsset::Archive(archive) => Some(&archive.scene),
            LoadedAsset::Model { scene, .. } => Some(scene),
            _ => None,
        }
    }

    /// Revoke blob handles and stop decoders now rather than at drop.
    pub fn release(&mut self) {
        match self {
            LoadedAsset::Archive(archive) => archive.release(),
            LoadedAsset::Model { handle, .. } | LoadedAsset::Image { handle, .. } => {
                handle.release()
            }
            LoadedAsset::Video { surface, handle } => {
                surface.release();
                handle.release();
            }
        }
    }
}

impl std::fmt::Debug for LoadedAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadedAsset::Archive(archive) => f.debug_tuple("Archive").field(archive).finish(),
            LoadedAsset::Model { scene, .. } => f.debug_tuple("Model").field(scene).finish(),
            LoadedAsset::Image { texture, .. } => f.debug_tuple("Image").field(texture).finish(),
            LoadedAsset::Video { surface, .. } => f.debug_tuple("Video").field(surface).finish(),
        }
    }
}

/// User-facing load failure. Shown as a notice; never fatal.
#[derive(Debug, thiserror::Error)]
pub enum LoadFailure {
    #[error("the archive contains no .gltf or .glb file")]
    NoModelEntry,
    #[error("the archive could not be read: {0}")]
    CorruptArchive(String),
    #[error("the model could not be loaded: {0}")]
    ModelParse(String),
    #[error("{name} is not an image, model, video or zip archive")]
    UnclassifiedFile { name: String },
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("could not start a load worker: {0}")]
    Worker(#[source] std::io::Error),
    #[error("loading crashed: {0}")]
    Panicked(String),
}

impl From<ArchiveError> for LoadFailure {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::NoModelEntry => LoadFailure::NoModelEntry,
            ArchiveError::Corrupt(_)
            | ArchiveError::ReadEntry { .. }
            | ArchiveError::TooLarge { .. } => {
                LoadFailure::CorruptArchive(err.to_string())
            }
            ArchiveError::ModelParse { .. } => LoadFailure::ModelParse(err.to_string()),
        }
    }
}

/// Turns uploads into [`LoadedAsset`]s. Cheap to clone into worker threads.
#[derive(Debug, Clone)]
pub struct AssetManager {
    registry: BlobRegistry,
    video: VideoConfig,
}

impl AssetManager {
    pub fn new(registry: BlobRegistry, video: VideoConfig) -> Self {
        Self { registry, video }
    }

    pub fn registry(&self) -> &BlobRegistry {
        &self.registry
    }

    pub fn load(&self, upload: &UploadedAsset) -> Result<LoadedAsset, LoadFailure> {
        let Some(category) = upload.category else {
            return Err(LoadFailure::UnclassifiedFile {
                name: upload.name.clone(),
            });
        };
        log::info!("Loading {} as {}", upload.name, category.label());
        match category {
            AssetCategory::Archive => Ok(LoadedAsset::Archive(archive::resolve(
                upload.bytes.clone(),
                &self.registry,
            )?)),
            AssetCategory::Model => self.load_direct_model(upload),
            AssetCategory::Image => {
                let handle = self.registry.create_owned(upload.bytes.clone());
                let texture = load_texture(self.fetch_owned(&handle)?)?;
                Ok(LoadedAsset::Image { texture, handle })
            }
            AssetCategory::Video => {
                let handle = self.registry.create_owned(upload.bytes.clone());
                let surface = match &upload.path {
                    Some(path) => VideoSurface::open_path(path, &self.video)?,
                    None => VideoSurface::open_bytes(&self.fetch_owned(&handle)?, &self.video)?,
                };
                Ok(LoadedAsset::Video { surface, handle })
            }
        }
    }

    fn fetch_owned(&self, handle: &OwnedBlobUrl) -> Result<Arc<[u8]>, AssetError> {
        let url = handle
            .url()
            .ok_or_else(|| AssetError::UnresolvedUri("released blob".to_string()))?;
        self.registry.resolve(url.as_str())
    }

    fn load_direct_model(&self, upload: &UploadedAsset) -> Result<LoadedAsset, LoadFailure> {
        let handle = self.registry.create_owned(upload.bytes.clone());
        let bytes = self.fetch_owned(&handle)?;
        let source = model_source(&upload.name, &upload.mime, bytes)?;
        let siblings = upload
            .path
            .as_deref()
            .and_then(Path::parent)
            .map(DirectoryResolver::new);
        let scene = load_model(&source, siblings.as_ref().map(|r| r as &dyn UriResolver))
            .map_err(|err| LoadFailure::ModelParse(format!("{}: {}", upload.name, err)))?;
        Ok(LoadedAsset::Model { scene, handle })
    }
}

/// Pick the glTF flavour from the extension, the declared MIME or the GLB magic.
fn model_source(name: &str, mime: &str, bytes: Arc<[u8]>) -> Result<ModelSource, AssetError> {
    let extension = sniff::extension_of(name);
    let text = |bytes: Arc<[u8]>| -> Result<ModelSource, AssetError> {
        Ok(ModelSource::Text(std::str::from_utf8(&bytes)?.to_string()))
    };
    match extension.as_deref() {
        Some("glb") => Ok(ModelSource::Binary(bytes)),
        Some("gltf") => text(bytes),
        _ if bytes.starts_with(b"glTF") || mime == "model/gltf-binary" => {
            Ok(ModelSource::Binary(bytes))
        }
        _ if mime == "model/gltf+json" => text(bytes),
        other => Err(AssetError::UnsupportedModelFormat(
            other.unwrap_or_default().to_string(),
        )),
    }
}
