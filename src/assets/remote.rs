//! Startup fetch of the sample skybox image.

use super::{AssetError, UploadedAsset};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_SAMPLE_BYTES: u64 = 64 * 1024 * 1024;

pub fn fetch_sample(url: &str) -> Result<UploadedAsset, AssetError> {
    let fetch_error = |message: String| AssetError::Fetch {
        url: url.to_string(),
        message,
    };
    let response = ureq::get(url)
        .timeout(FETCH_TIMEOUT)
        .call()
        .map_err(|err| fetch_error(err.to_string()))?;
    let mime = response.content_type().to_string();

    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_SAMPLE_BYTES)
        .read_to_end(&mut bytes)
        .map_err(|err| fetch_error(err.to_string()))?;
    log::info!("Fetched sample {} ({} bytes, {})", url, bytes.len(), mime);

    Ok(UploadedAsset::from_bytes(
        file_name_from_url(url),
        mime,
        Arc::from(bytes),
    ))
}

/// Last path segment of `url`, without query or fragment.
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("sample")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetCategory;

    #[test]
    fn name_is_the_last_path_segment() {
        assert_eq!(
            file_name_from_url(crate::config::SAMPLE_SKYBOX_URL),
            "2294472375_24a3b8ef46_o.jpg"
        );
        assert_eq!(file_name_from_url("https://host/a/b.png?x=1#top"), "b.png");
        assert_eq!(file_name_from_url("https://host/dir/"), "dir");
    }

    #[test]
    fn sample_name_classifies_as_image() {
        let name = file_name_from_url(crate::config::SAMPLE_SKYBOX_URL);
        let upload = UploadedAsset::from_bytes(name, "", Arc::from(&b""[..]));
        assert_eq!(upload.category, Some(AssetCategory::Image));
    }

    #[test]
    fn unreachable_host_is_a_fetch_error() {
        let err = fetch_sample("http://127.0.0.1:9/sample.jpg").unwrap_err();
        assert!(matches!(err, AssetError::Fetch { .. }));
    }
}
