//! The request dispatcher.
//!
//! Per request: normalize the path, check the referer, then route to a
//! cache hit, a subscription to an in-flight fetch, or a fresh fetch of our
//! own. Conditional revalidations (`If-None-Match` / `If-Modified-Since`)
//! are answered 304 straight from the metadata record.

use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::cache::{CacheLookup, ErrorTag, Fingerprint, ReplayHeaders};
use crate::fetch::{FetchFailure, FetchOutcome};
use crate::normalize::normalize;
use crate::referer::RefererDecision;
use crate::server::assets::ErrorAssets;
use crate::server::state::AppState;

/// GET /*path - proxy one upstream image.
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    request_headers: HeaderMap,
) -> Response {
    let Some(normalized) = normalize(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // The client's query string belongs to the upstream URL
    let mut url = normalized.url;
    if let Some(q) = query.as_deref() {
        url.push('?');
        url.push_str(q);
    }

    let referer = request_headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok());
    if state.gate.check(referer) == RefererDecision::Redirect {
        println!("[server] Referer denied, redirecting to {}", url);
        return redirect_upstream(&url);
    }

    let options = normalized.options;
    let fp = Fingerprint::derive(&url, &options);
    let bypass =
        query.as_deref().is_some_and(has_uncache) || state.config.is_bypass_host(&url);

    if !bypass {
        match state.store.lookup(&fp) {
            CacheLookup::StickyError(tag) => {
                return error_asset_response(&state.assets, tag);
            }
            CacheLookup::Fresh { meta, payload } => {
                if conditional_matches(&request_headers, &meta.etag, &meta.last_modified) {
                    return not_modified(&meta.etag, &meta.last_modified);
                }
                if let Some(headers) = meta.headers.as_ref() {
                    return payload_response(headers, &payload).await;
                }
                // Neither payload headers nor error tag: refetch
            }
            CacheLookup::Absent => {}
        }
    }

    let (slot, leader) = state.registry.join(&fp);
    if leader {
        let fetcher = state.fetcher.clone();
        let url = url.clone();
        let options = options.clone();
        let fp = fp.clone();
        tokio::spawn(async move {
            fetcher.run(url, options, fp).await;
        });
    }

    match slot.await {
        Ok(FetchOutcome::Served { headers, payload }) => payload_response(&headers, &payload).await,
        Ok(FetchOutcome::Failed(failure)) => failure_response(&state.assets, failure),
        Err(_) => {
            println!("[server] Fetch task vanished for {}", url);
            (StatusCode::INTERNAL_SERVER_ERROR, "fetch aborted").into_response()
        }
    }
}

/// `uncache=1` anywhere in the query forces a fresh upstream fetch.
fn has_uncache(query: &str) -> bool {
    query.split('&').any(|pair| pair == "uncache=1")
}

/// Exact-match conditional check against the stored validators.
fn conditional_matches(request: &HeaderMap, etag: &str, last_modified: &str) -> bool {
    if !etag.is_empty() {
        if let Some(candidate) = request
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
        {
            if candidate == etag {
                return true;
            }
        }
    }
    if !last_modified.is_empty() {
        if let Some(candidate) = request
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
        {
            if candidate == last_modified {
                return true;
            }
        }
    }
    false
}

/// 200 with the stored headers and a stream over the payload file. Each
/// response opens its own descriptor, positioned at zero.
async fn payload_response(headers: &ReplayHeaders, payload: &FsPath) -> Response {
    match tokio::fs::File::open(payload).await {
        Ok(file) => replay_response(headers, Body::from_stream(ReaderStream::new(file))),
        Err(e) => {
            println!(
                "[server] Failed to open payload {}: {}",
                payload.display(),
                e
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "cache read failed").into_response()
        }
    }
}

fn replay_response(headers: &ReplayHeaders, body: Body) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &headers.content_type)
        .header(header::CONTENT_LENGTH, headers.content_length)
        .header(header::CACHE_CONTROL, &headers.cache_control)
        .header(header::LAST_MODIFIED, &headers.last_modified)
        .header(header::ETAG, &headers.etag);
    if let Some(original) = headers.original_length {
        builder = builder.header("x-image-original-length", original);
    }
    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn not_modified(etag: &str, last_modified: &str) -> Response {
    let mut builder = Response::builder().status(StatusCode::NOT_MODIFIED);
    if !etag.is_empty() {
        builder = builder.header(header::ETAG, etag);
    }
    if !last_modified.is_empty() {
        builder = builder.header(header::LAST_MODIFIED, last_modified);
    }
    builder
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// 301 to the bare upstream URL (hot-link protection).
fn redirect_upstream(url: &str) -> Response {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, url)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::NOT_FOUND.into_response())
}

/// 200 OK image/gif with the matching error asset.
fn error_asset_response(assets: &ErrorAssets, tag: ErrorTag) -> Response {
    (
        [(header::CONTENT_TYPE, "image/gif")],
        assets.get(tag).to_vec(),
    )
        .into_response()
}

fn failure_response(assets: &ErrorAssets, failure: FetchFailure) -> Response {
    match failure.tag() {
        Some(tag) => error_asset_response(assets, tag),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "proxy failure").into_response(),
    }
}
