//! In-process object URLs.
//!
//! A [`BlobRegistry`] hands out `blob:dropview/<n>` handles for byte blobs so
//! that loaders can be given a URI instead of the bytes themselves. Handles
//! stay resolvable until revoked. Every minted handle has exactly one owner
//! responsible for revoking it: an [`OwnedBlobUrl`] for direct uploads, or the
//! archive URL rewriter for entries resolved out of a zip.

use super::{AssetError, UriResolver};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const BLOB_URL_PREFIX: &str = "blob:dropview/";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobUrl(String);

impl BlobUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    blobs: HashMap<String, Arc<[u8]>>,
}

/// Shared between the UI thread and load workers.
#[derive(Clone, Default)]
pub struct BlobRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl fmt::Debug for BlobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_url(&self, bytes: Arc<[u8]>) -> BlobUrl {
        let mut inner = self.lock();
        inner.next_id += 1;
        let url = format!("{}{}", BLOB_URL_PREFIX, inner.next_id);
        inner.blobs.insert(url.clone(), bytes);
        BlobUrl(url)
    }

    /// Returns false if the handle was already revoked.
    pub fn revoke(&self, url: &BlobUrl) -> bool {
        self.lock().blobs.remove(url.as_str()).is_some()
    }

    pub fn fetch(&self, url: &str) -> Option<Arc<[u8]>> {
        self.lock().blobs.get(url).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.lock().blobs.len()
    }

    /// Mint a handle that is revoked when the returned guard is released or dropped.
    pub fn create_owned(&self, bytes: Arc<[u8]>) -> OwnedBlobUrl {
        let url = self.create_url(bytes);
        OwnedBlobUrl {
            registry: self.clone(),
            url: Some(url),
        }
    }
}

impl UriResolver for BlobRegistry {
    fn resolve(&self, uri: &str) -> Result<Arc<[u8]>, AssetError> {
        self.fetch(uri)
            .ok_or_else(|| AssetError::UnresolvedUri(uri.to_string()))
    }
}

/// Sole owner of one blob handle.
pub struct OwnedBlobUrl {
    registry: BlobRegistry,
    url: Option<BlobUrl>,
}

impl OwnedBlobUrl {
    /// `None` once released.
    pub fn url(&self) -> Option<&BlobUrl> {
        self.url.as_ref()
    }

    pub fn release(&mut self) {
        if let Some(url) = self.url.take() {
            self.registry.revoke(&url);
        }
    }
}

impl fmt::Debug for OwnedBlobUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnedBlobUrl").field(&self.url).finish()
    }
}

impl Drop for OwnedBlobUrl {
    fn drop(&mut self) {
        self.release();
    }
}
