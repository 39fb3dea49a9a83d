//! Window-independent viewer state: settings, the primary asset and notices.

use super::loader::LoadResult;
use crate::assets::{LoadFailure, LoadedAsset};
use crate::config::StageLayout;
use crate::scene::{compose, AssetId, MountSet, Primary, SceneSettings, SettingsChange};

#[derive(Debug)]
pub struct CurrentAsset {
    pub id: AssetId,
    pub name: String,
    pub asset: LoadedAsset,
}

pub struct Viewer {
    settings: SceneSettings,
    layout: StageLayout,
    current: Option<CurrentAsset>,
    next_id: u64,
    loading: Option<String>,
    notice: Option<String>,
}

impl Viewer {
    pub fn new(settings: SceneSettings, layout: StageLayout) -> Self {
        Self {
            settings,
            layout,
            current: None,
            next_id: 0,
            loading: None,
            notice: None,
        }
    }

    pub fn settings(&self) -> SceneSettings {
        self.settings
    }

    pub fn apply(&mut self, change: SettingsChange) {
        self.settings = self.settings.apply(change);
    }

    pub fn begin_load(&mut self, name: &str) {
        self.loading = Some(name.to_string());
    }

    pub fn loading(&self) -> Option<&str> {
        self.loading.as_deref()
    }

    /// Take an accepted result. On success the previous asset is released and
    /// replaced; on failure it stays mounted and a notice is raised.
    pub fn finish_load(&mut self, result: LoadResult) -> Option<AssetId> {
        self.loading = None;
        match result.outcome {
            Ok(asset) => {
                if let Some(mut previous) = self.current.take() {
                    log::info!("Releasing {} ({})", previous.name, previous.asset.kind());
                    previous.asset.release();
                }
                self.next_id += 1;
                let id = AssetId(self.next_id);
                log::info!("Loaded {} as {}", result.name, asset.kind());
                self.notice = None;
                self.current = Some(CurrentAsset {
                    id,
                    name: result.name,
                    asset,
                });
                Some(id)
            }
            Err(failure) => {
                self.report(&result.name, failure);
                None
            }
        }
    }

    pub fn report(&mut self, name: &str, failure: LoadFailure) {
        log::warn!("Failed to load {}: {}", name, failure);
        self.notice = Some(failure.to_string());
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn current(&self) -> Option<&CurrentAsset> {
        self.current.as_ref()
    }

    pub fn primary(&self) -> Primary {
        let Some(current) = &self.current else {
            return Primary::Empty;
        };
        match current.asset {
            LoadedAsset::Archive(_) => Primary::ArchiveScene(current.id),
            LoadedAsset::Model { .. } => Primary::Model(current.id),
            LoadedAsset::Image { .. } => Primary::Image(current.id),
            LoadedAsset::Video { .. } => Primary::Video(current.id),
        }
    }

    pub fn mount_set(&self) -> MountSet {
        compose(&self.settings, self.primary(), &self.layout)
    }

    /// Release the primary asset ahead of teardown.
    pub fn clear(&mut self) {
        if let Some(mut current) = self.current.take() {
            current.asset.release();
        }
    }
}
