//! # Upstream Fetcher
//!
//! Drives one streaming GET against the origin and turns it into either a
//! cached payload or a failure, fanned out to every waiter registered for
//! the fingerprint.
//!
//! The download is an explicit state machine. After the response headers
//! pass the status and size checks, body chunks accumulate in a sniff
//! buffer until the format is identified by magic bytes, then spill to a
//! temp file under the cache root. The running total is checked against the
//! size cap on every chunk. On success the temp file is promoted into the
//! cache atomically and all waiters receive the same headers plus the path
//! of the installed payload, which each of them opens separately.
//!
//! Failure taxonomy: a non-200 status, a transport error or the outer
//! deadline give `cannotread`; an unidentifiable payload gives `badformat`;
//! exceeding the cap gives `toolarge`. Only a cap violation visible in the
//! response headers is recorded as a sticky error, because a declared
//! length will not shrink on retry while transport weather changes.

pub mod singleflight;
pub mod sniff;

pub use singleflight::Registry;

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::cache::{CacheMeta, CacheStore, ErrorTag, Fingerprint, ReplayHeaders};
use crate::config::{FETCH_DEADLINE, UPSTREAM_TIMEOUT};
use crate::error::EspejoError;
use crate::normalize::TransformOptions;
use crate::resize::ResizePool;

/// Cache-Control replayed with every cached payload.
pub const CACHE_CONTROL_VALUE: &str = "public, max-age=86400";

/// The one result delivered to every waiter of a fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Payload installed in the cache; each waiter opens its own handle.
    Served {
        headers: ReplayHeaders,
        payload: PathBuf,
    },
    Failed(FetchFailure),
}

/// Why a fetch produced no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    TooLarge,
    BadFormat,
    CannotRead,
    /// Local I/O trouble; answered with a plain 500, never cached.
    Internal,
}

impl FetchFailure {
    /// The matching error asset, when one exists.
    pub fn tag(&self) -> Option<ErrorTag> {
        match self {
            FetchFailure::TooLarge => Some(ErrorTag::TooLarge),
            FetchFailure::BadFormat => Some(ErrorTag::BadFormat),
            FetchFailure::CannotRead => Some(ErrorTag::CannotRead),
            FetchFailure::Internal => None,
        }
    }
}

/// One fetcher serves the whole process; it is cheap to clone into the
/// task that drives an individual fetch.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    store: Arc<CacheStore>,
    registry: Arc<Registry>,
    resizer: Arc<ResizePool>,
    max_size: u64,
}

impl Fetcher {
    pub fn new(
        store: Arc<CacheStore>,
        registry: Arc<Registry>,
        resizer: Arc<ResizePool>,
        max_size: u64,
    ) -> Result<Self, EspejoError> {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .user_agent(concat!("espejo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EspejoError::Server(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            store,
            registry,
            resizer,
            max_size,
        })
    }

    /// Drive a fetch to completion and fan the outcome out.
    ///
    /// Never panics and never unwinds into the caller; whatever happens,
    /// every waiter is resumed exactly once. The outer deadline guards
    /// against the client-side timeout misbehaving.
    pub async fn run(&self, url: String, options: TransformOptions, fp: Fingerprint) {
        let outcome = match tokio::time::timeout(FETCH_DEADLINE, self.fetch(&url, &options, &fp))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                println!("[fetch] Deadline exceeded for {}", url);
                self.cleanup_temp(&fp);
                FetchOutcome::Failed(FetchFailure::CannotRead)
            }
        };
        self.registry.complete(&fp, outcome);
    }

    async fn fetch(
        &self,
        url: &str,
        options: &TransformOptions,
        fp: &Fingerprint,
    ) -> FetchOutcome {
        match self.try_fetch(url, options, fp).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                self.cleanup_temp(fp);
                FetchOutcome::Failed(failure)
            }
        }
    }

    async fn try_fetch(
        &self,
        url: &str,
        options: &TransformOptions,
        fp: &Fingerprint,
    ) -> Result<FetchOutcome, FetchFailure> {
        let response = self.client.get(url).send().await.map_err(|e| {
            println!("[fetch] Upstream request failed for {}: {}", url, e);
            FetchFailure::CannotRead
        })?;

        if response.status() != reqwest::StatusCode::OK {
            println!("[fetch] Upstream status {} for {}", response.status(), url);
            return Err(FetchFailure::CannotRead);
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_size {
                println!(
                    "[fetch] {} declares {} bytes, cap is {}",
                    url, declared, self.max_size
                );
                if let Err(e) = self.store.mark_error(fp, ErrorTag::TooLarge) {
                    println!("[fetch] Failed to record sticky error: {}", e);
                }
                return Err(FetchFailure::TooLarge);
            }
        }

        let upstream_last_modified = header_string(&response, reqwest::header::LAST_MODIFIED);
        let upstream_etag = header_string(&response, reqwest::header::ETAG);

        let temp = self.temp_path(fp);
        let mut file = tokio::fs::File::create(&temp).await.map_err(|e| {
            println!("[fetch] Failed to open temp file {}: {}", temp.display(), e);
            FetchFailure::Internal
        })?;

        let mut stream = response.bytes_stream();
        let mut sniff_buf: Vec<u8> = Vec::with_capacity(sniff::SNIFF_LIMIT);
        let mut content_type: Option<&'static str> = None;
        let mut total: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                println!("[fetch] Upstream stream broke for {}: {}", url, e);
                FetchFailure::CannotRead
            })?;
            total += chunk.len() as u64;
            if total > self.max_size {
                println!("[fetch] {} exceeded {} bytes mid-stream", url, self.max_size);
                return Err(FetchFailure::TooLarge);
            }

            match content_type {
                None => {
                    sniff_buf.extend_from_slice(&chunk);
                    if sniff_buf.len() > sniff::SNIFF_LIMIT {
                        let sniffed = sniff::sniff(&sniff_buf[..sniff::SNIFF_LIMIT])
                            .ok_or(FetchFailure::BadFormat)?;
                        content_type = Some(sniffed);
                        file.write_all(&sniff_buf).await.map_err(io_failure)?;
                        sniff_buf.clear();
                    }
                }
                Some(_) => file.write_all(&chunk).await.map_err(io_failure)?,
            }
        }

        // Streams shorter than the sniff window are judged on what arrived
        let content_type = match content_type {
            Some(ct) => ct,
            None => {
                let sniffed = sniff::sniff(&sniff_buf).ok_or(FetchFailure::BadFormat)?;
                file.write_all(&sniff_buf).await.map_err(io_failure)?;
                sniffed
            }
        };

        file.flush().await.map_err(io_failure)?;
        drop(file);

        let mut headers = ReplayHeaders {
            content_type: content_type.to_string(),
            content_length: total,
            cache_control: CACHE_CONTROL_VALUE.to_string(),
            last_modified: upstream_last_modified.unwrap_or_else(now_rfc1123),
            etag: upstream_etag.unwrap_or_else(|| url_etag(url)),
            original_length: None,
        };

        if !options.is_noop() {
            let new_len = self
                .resizer
                .resize(temp.clone(), options.clone())
                .await
                .map_err(|e| {
                    println!("[fetch] Transform failed for {}: {}", url, e);
                    FetchFailure::CannotRead
                })?;
            headers.original_length = Some(total);
            headers.content_length = new_len;
        }

        let meta = CacheMeta::for_payload(headers.clone());
        let payload = self.store.store(fp, &temp, &meta).map_err(|e| {
            println!("[fetch] Failed to install cache entry: {}", e);
            FetchFailure::Internal
        })?;

        println!(
            "[fetch] Cached {} ({} bytes, {})",
            url, headers.content_length, headers.content_type
        );
        Ok(FetchOutcome::Served { headers, payload })
    }

    /// Temp file for a fetch. The registry guarantees one fetch per
    /// fingerprint, so the name cannot collide.
    fn temp_path(&self, fp: &Fingerprint) -> PathBuf {
        self.store.temp_dir().join(format!("{}.part", fp.hex()))
    }

    fn cleanup_temp(&self, fp: &Fingerprint) {
        let _ = std::fs::remove_file(self.temp_path(fp));
    }
}

fn io_failure(e: std::io::Error) -> FetchFailure {
    println!("[fetch] Temp file write failed: {}", e);
    FetchFailure::Internal
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// RFC 1123 timestamp for responses whose origin sent no Last-Modified.
fn now_rfc1123() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Deterministic ETag for origins that send none: a hash of the URL.
fn url_etag(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("\"{}\"", hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_to_asset_tag() {
        assert_eq!(FetchFailure::TooLarge.tag(), Some(ErrorTag::TooLarge));
        assert_eq!(FetchFailure::BadFormat.tag(), Some(ErrorTag::BadFormat));
        assert_eq!(FetchFailure::CannotRead.tag(), Some(ErrorTag::CannotRead));
        assert_eq!(FetchFailure::Internal.tag(), None);
    }

    #[test]
    fn test_url_etag_deterministic_and_quoted() {
        let a = url_etag("http://example.com/img.png");
        let b = url_etag("http://example.com/img.png");
        let c = url_etag("http://example.com/other.png");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with('"') && a.ends_with('"'));
    }

    #[test]
    fn test_now_rfc1123_shape() {
        let stamp = now_rfc1123();
        // e.g. "Sat, 02 Aug 2026 10:00:00 GMT"
        assert!(stamp.ends_with(" GMT"));
        assert_eq!(stamp.len(), 29);
    }
}
