//! Blob Store
//!
//! Audio and artwork never pass through the server: clients upload straight
//! to object storage with a presigned URL, and playback/download use short
//! lived signed GET URLs. Beats store object keys, never URLs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;

use crate::error::{MediaError, Result};

/// Blob store trait
pub trait BlobStore: Send + Sync {
    /// Signed PUT URL for uploading `key`
    fn presign_upload(&self, key: &str, content_type: &str) -> Result<SignedUrl>;

    /// Signed GET URL for reading `key`, served inline
    fn presign_download(&self, key: &str) -> Result<SignedUrl>;

    /// Unsigned canonical URL of an object
    fn object_url(&self, key: &str) -> String;
}

/// A presigned URL and when it stops working
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Key for a new upload: `beats/<owner>/<unix_ms>-<filename>`
pub fn upload_key(owner: impl Display, filename: &str, at: DateTime<Utc>) -> String {
    format!(
        "beats/{owner}/{}-{}",
        at.timestamp_millis(),
        sanitize_filename(filename)
    )
}

/// Keep the last path component and replace anything outside `[A-Za-z0-9._-]`
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Pick the stored content type for an upload.
///
/// A provided `audio/*` or `image/*` type wins; otherwise the extension
/// decides. Anything that is not audio or an image is rejected.
pub fn resolve_content_type(filename: &str, provided: &str) -> Result<String> {
    let provided = provided.trim().to_ascii_lowercase();
    if provided.starts_with("audio/") || provided.starts_with("image/") {
        return Ok(provided);
    }

    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let resolved = match extension.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => return Err(MediaError::UnsupportedType(format!("{filename} ({provided})"))),
    };
    Ok(resolved.to_string())
}
