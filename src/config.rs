use crate::scene::SceneSettings;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "dropview.json";

/// Largest video frame side accepted; 8192 is the wgpu default 2D texture limit.
pub const MAX_VIDEO_DIMENSION: u32 = 8192;

pub const SAMPLE_SKYBOX_URL: &str =
    "https://raw.githubusercontent.com/mrdoob/three.js/dev/examples/textures/2294472375_24a3b8ef46_o.jpg";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Viewer-wide tunables. Every field has a default so partial JSON files work.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window: WindowConfig,
    pub sample: SampleConfig,
    pub stage: StageLayout,
    pub camera: CameraConfig,
    pub video: VideoConfig,
    pub initial_settings: SceneSettings,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    pub fetch_on_startup: bool,
    pub url: String,
}

/// Fixed geometry of the stage: fog falloff, sky sphere and floor placement.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StageLayout {
    pub fog_near: f32,
    pub fog_far: f32,
    pub sky_radius: f32,
    pub floor_radius: f32,
    pub floor_height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub fov_deg: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub ffmpeg_program: String,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            sample: SampleConfig::default(),
            stage: StageLayout::default(),
            camera: CameraConfig::default(),
            video: VideoConfig::default(),
            initial_settings: SceneSettings::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "dropview".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            fetch_on_startup: true,
            url: SAMPLE_SKYBOX_URL.to_string(),
        }
    }
}

impl Default for StageLayout {
    fn default() -> Self {
        Self {
            fog_near: 10.0,
            fog_far: 100.0,
            sky_radius: 500.0,
            floor_radius: 50.0,
            floor_height: -5.0,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 2.0, 5.0],
            fov_deg: 75.0,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_program: "ffmpeg".to_string(),
            frame_width: 2048,
            frame_height: 1024,
        }
    }
}

impl VideoConfig {
    /// Frame size scaled down to fit [`MAX_VIDEO_DIMENSION`], aspect kept.
    pub fn clamped(self) -> Self {
        let (frame_width, frame_height) = crate::assets::texture::fit_dimensions(
            self.frame_width.max(1),
            self.frame_height.max(1),
            MAX_VIDEO_DIMENSION,
        );
        Self {
            frame_width,
            frame_height,
            ..self
        }
    }
}

impl ViewerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let video = config.video.clone().clamped();
        if video != config.video {
            log::warn!(
                "Video frame size {}x{} clamped to {}x{}",
                config.video.frame_width,
                config.video.frame_height,
                video.frame_width,
                video.frame_height
            );
            config.video = video;
        }
        Ok(config)
    }

    /// Explicit path wins; otherwise `dropview.json` in the working directory if present.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            log::info!("Using config {}", fallback.display());
            return Self::load_from_file(&fallback);
        }
        Ok(Self::default())
    }
}
