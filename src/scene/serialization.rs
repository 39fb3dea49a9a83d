use crate::scene::SceneSettings;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// On-disk "look" file. Versioned so older files keep loading.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct LookFile {
    #[serde(default = "current_version")]
    version: u32,
    settings: SceneSettings,
}

const LOOK_FILE_VERSION: u32 = 1;

fn current_version() -> u32 {
    LOOK_FILE_VERSION
}

pub fn save_settings_to_file(settings: &SceneSettings, path: &Path) -> Result<()> {
    let file = LookFile {
        version: LOOK_FILE_VERSION,
        settings: *settings,
    };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_settings_from_file(path: &Path) -> Result<SceneSettings> {
    let json = std::fs::read_to_string(path)?;
    let file: LookFile = serde_json::from_str(&json)?;
    if file.version > LOOK_FILE_VERSION {
        log::warn!(
            "Look file {} has version {}, newer than {}; loading known fields only",
            path.display(),
            file.version,
            LOOK_FILE_VERSION
        );
    }
    Ok(file.settings)
}
