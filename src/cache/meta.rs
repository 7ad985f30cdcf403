//! Cache metadata sidecar records.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The response headers replayed on a cache hit.
///
/// `content_length` equals the payload file's byte length; when a transform
/// was applied it reflects the transformed length and `original_length`
/// records the pre-transform size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayHeaders {
    pub content_type: String,
    pub content_length: u64,
    pub cache_control: String,
    pub last_modified: String,
    pub etag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_length: Option<u64>,
}

/// A sticky negative result that short-circuits future requests until the
/// entry expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorTag {
    TooLarge,
    BadFormat,
    CannotRead,
}

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::TooLarge => "toolarge",
            ErrorTag::BadFormat => "badformat",
            ErrorTag::CannotRead => "cannotread",
        }
    }
}

/// The metadata sidecar stored next to each payload file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Headers to replay on a hit. Absent for sticky-error records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<ReplayHeaders>,
    /// ETag, indexed separately for conditional checks.
    #[serde(default)]
    pub etag: String,
    /// Last-Modified, indexed separately for conditional checks.
    #[serde(default)]
    pub last_modified: String,
    /// Sticky error, if this record short-circuits instead of serving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorTag>,
    /// Unix seconds at creation; drives TTL expiry.
    pub stored_at: u64,
}

impl CacheMeta {
    /// A record for a successfully fetched payload.
    pub fn for_payload(headers: ReplayHeaders) -> Self {
        Self {
            etag: headers.etag.clone(),
            last_modified: headers.last_modified.clone(),
            headers: Some(headers),
            error: None,
            stored_at: now_seconds(),
        }
    }

    /// A metadata-only record carrying a sticky error.
    pub fn for_error(tag: ErrorTag) -> Self {
        Self {
            headers: None,
            etag: String::new(),
            last_modified: String::new(),
            error: Some(tag),
            stored_at: now_seconds(),
        }
    }

    /// Age of this record in seconds.
    pub fn age_seconds(&self) -> u64 {
        now_seconds().saturating_sub(self.stored_at)
    }
}

pub(crate) fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
