//! Building resource URLs from a server base URL.

use reqwest::Url;

use super::error::{DownloadError, DownloadResult};
use crate::manifest::MANIFEST_FILE_NAME;

/// Append a `/`-separated relative path to `base`, percent-encoding each
/// segment.
pub fn resource_url(base: &str, relative: &str) -> DownloadResult<String> {
    let invalid = |detail: String| DownloadError::InvalidUrl {
        url: base.to_string(),
        detail,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| invalid("URL cannot be a base".to_string()))?;
        segments.pop_if_empty();
        for segment in relative.split('/') {
            segments.push(segment);
        }
    }
    Ok(url.into())
}

/// URL of the manifest below a patch server base URL.
///
/// A base that already ends in a `.txt` file name is used unchanged.
pub fn manifest_url(base: &str) -> DownloadResult<String> {
    if base.trim_end_matches('/').ends_with(".txt") {
        return Url::parse(base)
            .map(String::from)
            .map_err(|e| DownloadError::InvalidUrl {
                url: base.to_string(),
                detail: e.to_string(),
            });
    }
    resource_url(base, MANIFEST_FILE_NAME)
}
