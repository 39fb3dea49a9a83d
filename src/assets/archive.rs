//! Zip archives holding one glTF model plus the files it references.
//!
//! Every entry is extracted into memory up front. The model is then parsed
//! with a [`UrlRewriter`] installed as its URI resolver, which maps relative
//! paths inside the archive onto freshly minted blob handles.

use super::blob::{BlobRegistry, BlobUrl};
use super::model::{load_model, ModelSource, SceneGraph};
use super::{sniff, AssetError, UriResolver};
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("corrupt zip archive: {0}")]
    Corrupt(#[from] zip::result::ZipError),
    #[error("failed to read archive entry {name}: {source}")]
    ReadEntry {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("archive expands past {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("no .gltf or .glb entry in archive")]
    NoModelEntry,
    #[error("failed to load {name}: {source}")]
    ModelParse {
        name: String,
        #[source]
        source: AssetError,
    },
}

/// In-archive path to entry bytes, in archive order.
#[derive(Default)]
pub struct EntryMap {
    order: Vec<String>,
    entries: HashMap<String, Arc<[u8]>>,
}

impl EntryMap {
    /// First entry with a given name wins.
    fn insert(&mut self, name: String, bytes: Arc<[u8]>) {
        if self.entries.contains_key(&name) {
            log::warn!("Duplicate archive entry {}; keeping the first", name);
            return;
        }
        self.order.push(name.clone());
        self.entries.insert(name, bytes);
    }

    pub fn get(&self, path: &str) -> Option<&Arc<[u8]>> {
        self.entries.get(path)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }
}

impl fmt::Debug for EntryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Strip one leading `./`, then one leading `/`.
pub fn clean_path(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    path.strip_prefix('/').unwrap_or(path)
}

/// Redirects URIs requested by the glTF parser to in-memory archive entries.
///
/// Owns every blob handle it mints; they are revoked by [`UrlRewriter::release`]
/// or when the rewriter is dropped.
pub struct UrlRewriter {
    entries: Arc<EntryMap>,
    /// Directory of the model entry, for URIs relative to it.
    base_dir: String,
    registry: BlobRegistry,
    minted: Mutex<Vec<BlobUrl>>,
}

impl UrlRewriter {
    pub fn new(entries: Arc<EntryMap>, model_path: &str, registry: BlobRegistry) -> Self {
        let base_dir = model_path
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_default();
        Self {
            entries,
            base_dir,
            registry,
            minted: Mutex::new(Vec::new()),
        }
    }

    fn lookup(&self, url: &str) -> Option<&Arc<[u8]>> {
        let cleaned = clean_path(url);
        self.entries.get(cleaned).or_else(|| {
            if self.base_dir.is_empty() {
                None
            } else {
                self.entries.get(&format!("{}/{}", self.base_dir, cleaned))
            }
        })
    }

    /// A fresh blob handle for a matching entry, else `url` unchanged.
    pub fn rewrite(&self, url: &str) -> String {
        match self.lookup(url) {
            Some(bytes) => {
                let blob = self.registry.create_url(bytes.clone());
                let rewritten = blob.as_str().to_string();
                self.minted
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(blob);
                rewritten
            }
            None => url.to_string(),
        }
    }

    pub fn minted_count(&self) -> usize {
        self.minted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn entries(&self) -> &EntryMap {
        &self.entries
    }

    pub fn release(&self) {
        let minted = std::mem::take(
            &mut *self.minted.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for url in &minted {
            self.registry.revoke(url);
        }
        if !minted.is_empty() {
            log::debug!("Revoked {} archive blob handles", minted.len());
        }
    }
}

impl UriResolver for UrlRewriter {
    fn resolve(&self, uri: &str) -> Result<Arc<[u8]>, AssetError> {
        if self.lookup(uri).is_none() {
            return Err(AssetError::UnresolvedUri(uri.to_string()));
        }
        let rewritten = self.rewrite(uri);
        self.registry.resolve(&rewritten)
    }
}

impl fmt::Debug for UrlRewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlRewriter")
            .field("entries", &self.entries.count())
            .field("minted", &self.minted_count())
            .finish()
    }
}

impl Drop for UrlRewriter {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug)]
pub struct ResolvedArchive {
    pub scene: SceneGraph,
    pub model_path: String,
    rewriter: UrlRewriter,
}

impl ResolvedArchive {
    pub fn rewriter(&self) -> &UrlRewriter {
        &self.rewriter
    }

    pub fn release(&mut self) {
        self.rewriter.release();
    }
}

fn is_model_entry(name: &str) -> bool {
    matches!(
        sniff::extension_of(name).as_deref(),
        Some("gltf") | Some("glb")
    )
}

/// Upper bound on the bytes extracted from one archive.
pub const MAX_EXTRACTED_BYTES: u64 = 2 << 30;

pub fn resolve(bytes: Arc<[u8]>, registry: &BlobRegistry) -> Result<ResolvedArchive, ArchiveError> {
    resolve_within(bytes, registry, MAX_EXTRACTED_BYTES)
}

fn resolve_within(
    bytes: Arc<[u8]>,
    registry: &BlobRegistry,
    limit: u64,
) -> Result<ResolvedArchive, ArchiveError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut model_path = None;
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        if !entry.is_dir() && is_model_entry(entry.name()) {
            model_path = Some(entry.name().to_string());
            break;
        }
    }
    let model_path = model_path.ok_or(ArchiveError::NoModelEntry)?;

    let mut entries = EntryMap::default();
    let mut budget = limit;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        // Header sizes are untrusted; grow with what actually decompresses.
        let mut data = Vec::new();
        entry
            .by_ref()
            .take(budget.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|source| ArchiveError::ReadEntry {
                name: name.clone(),
                source,
            })?;
        if data.len() as u64 > budget {
            return Err(ArchiveError::TooLarge { limit });
        }
        budget -= data.len() as u64;
        entries.insert(name, Arc::from(data));
    }
    log::info!(
        "Archive holds {} entries; model entry is {}",
        entries.count(),
        model_path
    );

    let model_bytes = entries
        .get(&model_path)
        .cloned()
        .ok_or(ArchiveError::NoModelEntry)?;
    let rewriter = UrlRewriter::new(Arc::new(entries), &model_path, registry.clone());

    let parse_failure = |source: AssetError| ArchiveError::ModelParse {
        name: model_path.clone(),
        source,
    };
    let source = if sniff::extension_of(&model_path).as_deref() == Some("glb") {
        ModelSource::Binary(model_bytes)
    } else {
        let text = std::str::from_utf8(&model_bytes)
            .map_err(|err| parse_failure(AssetError::NotUtf8(err)))?;
        ModelSource::Text(text.to_string())
    };
    let mut scene = load_model(&source, Some(&rewriter)).map_err(parse_failure)?;

    if !scene.ambient.is_empty() {
        log::debug!(
            "Ignoring embedded ambient {:?} in {}",
            scene.ambient,
            model_path
        );
    }
    scene.clear_ambient();

    Ok(ResolvedArchive {
        scene,
        model_path,
        rewriter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::model::fixtures;
    use crate::assets::LoadFailure;
    use crate::assets::texture::encode_png;
    use proptest::prelude::*;
    use std::io::Write;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn clean_path_strips_one_prefix_of_each_kind() {
        assert_eq!(clean_path("./a.png"), "a.png");
        assert_eq!(clean_path("/a.png"), "a.png");
        assert_eq!(clean_path(".//a.png"), "a.png");
        assert_eq!(clean_path("././a.png"), "./a.png");
        assert_eq!(clean_path("textures/a.png"), "textures/a.png");
    }

    #[test]
    fn texture_referenced_with_dot_slash_resolves_to_archive_bytes() {
        let registry = BlobRegistry::new();
        let png = encode_png(2, 1, &[10, 20, 30, 255, 40, 50, 60, 255]);
        let encoded = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            fixtures::triangle_buffer(),
        );
        let gltf = fixtures::triangle_gltf(
            &format!("data:application/octet-stream;base64,{encoded}"),
            Some("./diffuse.png"),
            None,
        );
        let zip = build_zip(&[("model.gltf", gltf.as_bytes()), ("diffuse.png", &png)]);

        let mut resolved = resolve(Arc::from(zip), &registry).unwrap();
        assert_eq!(resolved.model_path, "model.gltf");
        let texture = resolved.scene.textures[0].as_ref().unwrap();
        assert_eq!(&texture.encoded[..], &png[..]);
        assert_eq!(resolved.rewriter().minted_count(), 1);
        assert_eq!(registry.live_count(), 1);

        resolved.release();
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn external_buffers_come_from_the_archive() {
        let registry = BlobRegistry::new();
        let gltf = fixtures::triangle_gltf("/tri.bin", None, None);
        let zip = build_zip(&[
            ("model.gltf", gltf.as_bytes()),
            ("tri.bin", &fixtures::triangle_buffer()),
        ]);
        let resolved = resolve(Arc::from(zip), &registry).unwrap();
        assert_eq!(resolved.scene.meshes.len(), 1);
        drop(resolved);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn nested_model_resolves_siblings_in_its_directory() {
        let registry = BlobRegistry::new();
        let gltf = fixtures::triangle_gltf("tri.bin", None, None);
        let zip = build_zip(&[
            ("kit/", b""),
            ("kit/model.gltf", gltf.as_bytes()),
            ("kit/tri.bin", &fixtures::triangle_buffer()),
        ]);
        let resolved = resolve(Arc::from(zip), &registry).unwrap();
        assert_eq!(resolved.model_path, "kit/model.gltf");
        assert_eq!(resolved.scene.meshes.len(), 1);
    }

    #[test]
    fn glb_entry_is_loaded_as_binary_and_first_model_wins() {
        let registry = BlobRegistry::new();
        let glb = fixtures::triangle_glb();
        let zip = build_zip(&[
            ("readme.txt", b"hello"),
            ("Scene.GLB", &glb),
            ("other.gltf", b"not json"),
        ]);
        let resolved = resolve(Arc::from(zip), &registry).unwrap();
        assert_eq!(resolved.model_path, "Scene.GLB");
        assert_eq!(resolved.rewriter().entries().count(), 3);
    }

    #[test]
    fn embedded_ambient_is_cleared() {
        let registry = BlobRegistry::new();
        let encoded = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            fixtures::triangle_buffer(),
        );
        let gltf = fixtures::triangle_gltf(
            &format!("data:application/octet-stream;base64,{encoded}"),
            None,
            Some(r##"{"background": "#ff0000", "environment": "night"}"##),
        );
        let zip = build_zip(&[("model.gltf", gltf.as_bytes())]);
        let resolved = resolve(Arc::from(zip), &registry).unwrap();
        assert!(resolved.scene.ambient.is_empty());
    }

    #[test]
    fn archive_without_model_mints_nothing() {
        let registry = BlobRegistry::new();
        let _unrelated = registry.create_url(Arc::from(&b"x"[..]));
        let zip = build_zip(&[("textures/", b""), ("textures/a.png", b"png"), ("notes.txt", b"n")]);
        let err = resolve(Arc::from(zip), &registry).unwrap_err();
        assert!(matches!(err, ArchiveError::NoModelEntry));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn extraction_stops_at_the_size_limit() {
        let registry = BlobRegistry::new();
        let gltf = fixtures::triangle_gltf("tri.bin", None, None);
        let padding = vec![0u8; 4096];
        let zip = build_zip(&[("model.gltf", gltf.as_bytes()), ("padding.bin", &padding)]);

        let err = resolve_within(Arc::from(zip.clone()), &registry, 1024).unwrap_err();
        assert!(matches!(err, ArchiveError::TooLarge { limit: 1024 }));
        assert!(matches!(
            LoadFailure::from(err),
            LoadFailure::CorruptArchive(_)
        ));
        assert_eq!(registry.live_count(), 0);

        let err = resolve_within(Arc::from(zip), &registry, 1 << 20).unwrap_err();
        assert!(!matches!(err, ArchiveError::TooLarge { .. }));
    }

    #[test]
    fn cyclic_node_graph_is_a_parse_failure() {
        let registry = BlobRegistry::new();
        let gltf = fixtures::embedded_triangle_gltf().replace(
            r#""nodes": [{"mesh": 0, "translation": [0.0, 1.0, 0.0]}]"#,
            r#""nodes": [{"mesh": 0, "children": [0]}]"#,
        );
        let zip = build_zip(&[("model.gltf", gltf.as_bytes())]);
        let err = resolve(Arc::from(zip), &registry).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::ModelParse {
                source: AssetError::NodeCycle { node: 0 },
                ..
            }
        ));
        assert!(matches!(LoadFailure::from(err), LoadFailure::ModelParse(_)));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn garbage_is_corrupt() {
        let registry = BlobRegistry::new();
        let err = resolve(Arc::from(&b"PK but not really"[..]), &registry).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt(_)));
    }

    #[test]
    fn parse_failure_revokes_minted_handles() {
        let registry = BlobRegistry::new();
        // The buffer resolves, but is too short for the declared byteLength.
        let gltf = fixtures::triangle_gltf("tri.bin", None, None);
        let zip = build_zip(&[("model.gltf", gltf.as_bytes()), ("tri.bin", &[0u8; 4])]);
        let err = resolve(Arc::from(zip), &registry).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::ModelParse {
                source: AssetError::BufferTooShort { .. },
                ..
            }
        ));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn missing_reference_is_a_parse_failure() {
        let registry = BlobRegistry::new();
        let gltf = fixtures::triangle_gltf("missing.bin", None, None);
        let zip = build_zip(&[("model.gltf", gltf.as_bytes())]);
        let err = resolve(Arc::from(zip), &registry).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::ModelParse {
                source: AssetError::UnresolvedUri(_),
                ..
            }
        ));
    }

    fn rewriter_over(names: &[(&str, &[u8])], registry: &BlobRegistry) -> UrlRewriter {
        let mut entries = EntryMap::default();
        for (name, bytes) in names {
            entries.insert(name.to_string(), Arc::from(*bytes));
        }
        UrlRewriter::new(Arc::new(entries), "model.gltf", registry.clone())
    }

    #[test]
    fn miss_returns_input_and_mints_nothing() {
        let registry = BlobRegistry::new();
        let rewriter = rewriter_over(&[("a.png", b"a")], &registry);
        assert_eq!(rewriter.rewrite("b.png"), "b.png");
        assert_eq!(rewriter.rewrite("b.png"), "b.png");
        assert_eq!(rewriter.minted_count(), 0);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn every_hit_mints_a_fresh_handle() {
        let registry = BlobRegistry::new();
        let rewriter = rewriter_over(&[("a.png", b"a")], &registry);
        let first = rewriter.rewrite("a.png");
        let second = rewriter.rewrite("./a.png");
        assert_ne!(first, second);
        assert_eq!(registry.fetch(&first).as_deref(), Some(&b"a"[..]));
        assert_eq!(rewriter.minted_count(), 2);
        drop(rewriter);
        assert_eq!(registry.live_count(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn every_auxiliary_entry_resolves(
            aux in proptest::collection::btree_map(
                "[a-z]{1,8}/?[a-z]{1,8}\\.(png|bin|jpg)",
                proptest::collection::vec(any::<u8>(), 0..64),
                0..6,
            )
        ) {
            let registry = BlobRegistry::new();
            let model = fixtures::embedded_triangle_gltf();
            let mut files: Vec<(&str, &[u8])> = vec![("model.gltf", model.as_bytes())];
            files.extend(aux.iter().map(|(name, bytes)| (name.as_str(), bytes.as_slice())));
            let zip = build_zip(&files);

            let resolved = resolve(Arc::from(zip), &registry).unwrap();
            for (name, bytes) in &aux {
                for requested in [name.clone(), format!("./{name}"), format!("/{name}")] {
                    let got = resolved.rewriter().resolve(&requested).unwrap();
                    prop_assert_eq!(&got[..], &bytes[..]);
                }
            }
            drop(resolved);
            prop_assert_eq!(registry.live_count(), 0);
        }

        #[test]
        fn rewrite_is_idempotent_on_miss(path in "[a-z./]{0,16}") {
            let registry = BlobRegistry::new();
            let rewriter = rewriter_over(&[("present.png", b"p")], &registry);
            prop_assume!(rewriter.lookup(&path).is_none());
            let once = rewriter.rewrite(&path);
            prop_assert_eq!(&once, &path);
            prop_assert_eq!(rewriter.rewrite(&once), path);
        }
    }
}
