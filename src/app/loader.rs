//! Off-thread loading with generation tickets.
//!
//! Every request bumps the ticket counter. Results arrive over a channel and
//! only the one carrying the latest ticket is handed back; anything older is
//! dropped on the spot, which revokes its blob handles and stops its decoder.

use crate::assets::{AssetManager, LoadFailure, LoadedAsset, UploadedAsset};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket(u64);

#[derive(Debug)]
pub struct LoadResult {
    pub ticket: LoadTicket,
    pub name: String,
    pub outcome: Result<LoadedAsset, LoadFailure>,
}

pub struct Loader {
    assets: AssetManager,
    latest: u64,
    completed: u64,
    stale_dropped: u64,
    sender: Sender<LoadResult>,
    receiver: Receiver<LoadResult>,
}

impl Loader {
    pub fn new(assets: AssetManager) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            assets,
            latest: 0,
            completed: 0,
            stale_dropped: 0,
            sender,
            receiver,
        }
    }

    pub fn assets(&self) -> &AssetManager {
        &self.assets
    }

    #[cfg(test)]
    pub fn submit(&mut self, upload: UploadedAsset) -> LoadTicket {
        let name = upload.name.clone();
        self.submit_with(name, move |assets| assets.load(&upload))
    }

    /// Read `path` and load it on a worker; the caller never touches the file.
    pub fn submit_path(&mut self, name: String, path: PathBuf) -> LoadTicket {
        self.submit_with(name, move |assets| {
            let upload = UploadedAsset::from_path(&path)?;
            assets.load(&upload)
        })
    }

    /// Run `job` on a worker thread under a fresh ticket.
    pub fn submit_with<F>(&mut self, name: String, job: F) -> LoadTicket
    where
        F: FnOnce(&AssetManager) -> Result<LoadedAsset, LoadFailure> + Send + 'static,
    {
        self.latest += 1;
        let ticket = LoadTicket(self.latest);
        let assets = self.assets.clone();
        let sender = self.sender.clone();
        let worker_name = name.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("dropview-load-{}", ticket.0))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&assets)))
                    .unwrap_or_else(|payload| {
                        Err(LoadFailure::Panicked(panic_message(payload.as_ref())))
                    });
                // The receiver only goes away on shutdown.
                let _ = sender.send(LoadResult {
                    ticket,
                    name: worker_name,
                    outcome,
                });
            });
        if let Err(err) = spawned {
            log::warn!("Failed to spawn load worker for {}: {}", name, err);
            let _ = self.sender.send(LoadResult {
                ticket,
                name,
                outcome: Err(LoadFailure::Worker(err)),
            });
        }
        ticket
    }

    #[cfg(test)]
    pub fn latest_ticket(&self) -> Option<LoadTicket> {
        (self.latest > 0).then_some(LoadTicket(self.latest))
    }

    pub fn is_pending(&self) -> bool {
        self.completed < self.latest
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// Drain finished work; returns the latest result if it has arrived.
    pub fn poll(&mut self) -> Option<LoadResult> {
        let mut accepted = None;
        while let Ok(result) = self.receiver.try_recv() {
            if let Some(result) = self.filter(result) {
                accepted = Some(result);
            }
        }
        accepted
    }

    fn filter(&mut self, result: LoadResult) -> Option<LoadResult> {
        if result.ticket.0 == self.latest {
            self.completed = self.latest;
            return Some(result);
        }
        log::debug!(
            "Discarding stale load of {} (ticket {}, latest {})",
            result.name,
            result.ticket.0,
            self.latest
        );
        self.stale_dropped += 1;
        None
    }

    /// Block until the latest result arrives. Test-only.
    #[cfg(test)]
    pub(crate) fn wait(&mut self, timeout: std::time::Duration) -> Option<LoadResult> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(std::time::Instant::now())?;
            let result = self.receiver.recv_timeout(remaining).ok()?;
            if let Some(result) = self.filter(result) {
                return Some(result);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::model::fixtures;
    use crate::assets::{AssetCategory, BlobRegistry};
    use crate::config::VideoConfig;
    use std::sync::Arc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn loader() -> Loader {
        Loader::new(AssetManager::new(BlobRegistry::new(), VideoConfig::default()))
    }

    fn glb_upload() -> UploadedAsset {
        UploadedAsset::from_bytes("scene.glb", "", Arc::from(fixtures::triangle_glb()))
    }

    #[test]
    fn single_load_is_accepted() {
        let mut loader = loader();
        assert!(!loader.is_pending());
        let ticket = loader.submit(glb_upload());
        assert!(loader.is_pending());
        let result = loader.wait(TIMEOUT).unwrap();
        assert_eq!(result.ticket, ticket);
        assert_eq!(result.name, "scene.glb");
        assert!(result.outcome.is_ok());
        assert!(!loader.is_pending());
    }

    #[test]
    fn failures_come_back_as_results() {
        let mut loader = loader();
        let upload = UploadedAsset::from_bytes("empty.zip", "", Arc::from(&b""[..]));
        assert_eq!(upload.category, Some(AssetCategory::Archive));
        loader.submit(upload);
        let result = loader.wait(TIMEOUT).unwrap();
        assert!(matches!(result.outcome, Err(LoadFailure::CorruptArchive(_))));
    }

    #[test]
    fn panicking_job_still_reports_a_result() {
        let mut loader = loader();
        let ticket = loader.submit_with("boom.glb".to_string(), |_| {
            panic!("decoder blew up");
        });
        let result = loader.wait(TIMEOUT).unwrap();
        assert_eq!(result.ticket, ticket);
        assert!(matches!(
            result.outcome,
            Err(LoadFailure::Panicked(ref message)) if message == "decoder blew up"
        ));
        assert!(!loader.is_pending());
    }

    #[test]
    fn path_loads_read_the_file_on_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.glb");
        std::fs::write(&path, fixtures::triangle_glb()).unwrap();

        let mut loader = loader();
        loader.submit_path("scene.glb".to_string(), path);
        let result = loader.wait(TIMEOUT).unwrap();
        assert_eq!(result.outcome.unwrap().kind(), "model");

        loader.submit_path("gone.glb".to_string(), dir.path().join("gone.glb"));
        let result = loader.wait(TIMEOUT).unwrap();
        assert!(matches!(
            result.outcome,
            Err(LoadFailure::Asset(crate::assets::AssetError::Read { .. }))
        ));
    }

    #[test]
    fn stale_result_is_dropped_and_released() {
        let mut loader = loader();
        let registry = loader.assets().registry().clone();
        let (release_first, gate) = mpsc::channel::<()>();

        let first = loader.submit_with("slow.glb".to_string(), move |assets| {
            let _ = gate.recv();
            assets.load(&glb_upload())
        });
        let second = loader.submit(glb_upload());
        assert!(second > first);
        assert_eq!(loader.latest_ticket(), Some(second));

        let accepted = loader.wait(TIMEOUT).unwrap();
        assert_eq!(accepted.ticket, second);
        assert_eq!(registry.live_count(), 1);

        release_first.send(()).unwrap();
        let deadline = std::time::Instant::now() + TIMEOUT;
        while loader.stale_dropped() == 0 && std::time::Instant::now() < deadline {
            assert!(loader.poll().is_none());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(loader.stale_dropped(), 1);
        // Only the accepted model still holds a handle.
        assert_eq!(registry.live_count(), 1);
        drop(accepted);
        assert_eq!(registry.live_count(), 0);
    }
}
