//! File type sniffing from a declared name and MIME type.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetCategory {
    Image,
    Model,
    Video,
    Archive,
}

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "hdr", "exr", "tif", "tiff", "bmp", "webp",
];
pub const MODEL_EXTENSIONS: &[&str] = &["glb", "gltf", "obj", "fbx", "stl", "dae", "3ds"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "avi", "mkv", "insv"];
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip"];

const MODEL_MIME_TYPES: &[&str] = &["model/gltf-binary", "model/gltf+json"];

impl AssetCategory {
    pub fn label(self) -> &'static str {
        match self {
            AssetCategory::Image => "image",
            AssetCategory::Model => "model",
            AssetCategory::Video => "video",
            AssetCategory::Archive => "archive",
        }
    }

    fn matches_mime(self, mime: &str) -> bool {
        match self {
            AssetCategory::Image => mime.starts_with("image/"),
            AssetCategory::Model => MODEL_MIME_TYPES.contains(&mime),
            AssetCategory::Video => mime.starts_with("video/"),
            AssetCategory::Archive => false,
        }
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            AssetCategory::Image => IMAGE_EXTENSIONS,
            AssetCategory::Model => MODEL_EXTENSIONS,
            AssetCategory::Video => VIDEO_EXTENSIONS,
            AssetCategory::Archive => ARCHIVE_EXTENSIONS,
        }
    }
}

/// Lowercased extension of `name`, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Classify an upload. Zip archives are detected by name before anything
/// else; then declared MIME is checked for every category, then extensions.
/// `None` means the file is not something the viewer can show.
pub fn classify(name: &str, mime: &str) -> Option<AssetCategory> {
    const ORDER: [AssetCategory; 3] = [
        AssetCategory::Image,
        AssetCategory::Model,
        AssetCategory::Video,
    ];

    let extension = extension_of(name);
    if extension.as_deref() == Some("zip") {
        return Some(AssetCategory::Archive);
    }

    let mime = mime.trim().to_ascii_lowercase();
    if let Some(category) = ORDER.into_iter().find(|c| c.matches_mime(&mime)) {
        return Some(category);
    }

    let extension = extension?;
    ORDER
        .into_iter()
        .find(|c| c.extensions().contains(&extension.as_str()))
}

/// Every extension the file picker offers, archives included.
pub fn picker_extensions() -> Vec<&'static str> {
    [
        AssetCategory::Image,
        AssetCategory::Model,
        AssetCategory::Video,
        AssetCategory::Archive,
    ]
    .into_iter()
    .flat_map(|category| category.extensions().iter().copied())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zip_short_circuits_regardless_of_mime() {
        assert_eq!(classify("kit.zip", "image/png"), Some(AssetCategory::Archive));
        assert_eq!(classify("KIT.ZIP", ""), Some(AssetCategory::Archive));
        assert_eq!(
            classify("kit.zip", "model/gltf-binary"),
            Some(AssetCategory::Archive)
        );
    }

    #[test]
    fn mime_beats_extension() {
        assert_eq!(
            classify("photo.jpg", "model/gltf-binary"),
            Some(AssetCategory::Model)
        );
        assert_eq!(classify("clip.mp4", "image/webp"), Some(AssetCategory::Image));
        assert_eq!(classify("scene.glb", "video/mp4"), Some(AssetCategory::Video));
    }

    #[test]
    fn extension_fallback_without_mime() {
        assert_eq!(classify("scene.glb", ""), Some(AssetCategory::Model));
        assert_eq!(classify("Photo.JPEG", ""), Some(AssetCategory::Image));
        assert_eq!(classify("sky.hdr", "application/octet-stream"), Some(AssetCategory::Image));
        assert_eq!(classify("pano.insv", ""), Some(AssetCategory::Video));
        assert_eq!(classify("mesh.3ds", ""), Some(AssetCategory::Model));
    }

    #[test]
    fn unknown_inputs_yield_none() {
        assert_eq!(classify("notes.txt", "text/plain"), None);
        assert_eq!(classify("png", ""), None);
        assert_eq!(classify("", ""), None);
    }

    #[test]
    fn picker_covers_every_category() {
        let extensions = picker_extensions();
        for ext in ["jpg", "glb", "webm", "zip"] {
            assert!(extensions.contains(&ext), "missing {ext}");
        }
    }

    proptest! {
        #[test]
        fn classify_is_total(name in ".{0,24}", mime in "[a-z/+.-]{0,24}") {
            // Must not panic, and must give at most one category.
            let first = classify(&name, &mime);
            let second = classify(&name, &mime);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn gltf_binary_mime_is_always_a_model(stem in "[a-zA-Z0-9_]{1,12}", ext in "[a-z0-9]{0,4}") {
            prop_assume!(ext != "zip");
            let name = if ext.is_empty() { stem } else { format!("{stem}.{ext}") };
            prop_assert_eq!(classify(&name, "model/gltf-binary"), Some(AssetCategory::Model));
        }
    }
}
