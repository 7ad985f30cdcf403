//! # Request Path Normalization
//!
//! Turns the free-form request path into an upstream URL plus transform
//! options. The accepted forms are:
//!
//! | Path | Meaning |
//! |------|---------|
//! | `/<url>` | pass-through fetch |
//! | `/<W>/<url>` | shrink to width W |
//! | `/<W>/<H>/<url>` | shrink to fit W×H |
//! | `/still/<url>` | first-frame extraction |
//! | `/still/<W>/<H>/<url>` | combine |
//!
//! A dimension of `0` means "no constraint"; `0/0` means no resize at all.
//! The URL may omit its scheme (`http://` is assumed), may contain `&amp;`
//! (decoded to `&`) and may contain literal spaces (encoded to `%20`).

/// Requested transformation, parsed from the path prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Extract the first frame and composite a play badge.
    pub still: bool,
    /// Maximum width in pixels. `Some(0)` means unconstrained.
    pub width: Option<u32>,
    /// Maximum height in pixels. `Some(0)` means unconstrained.
    pub height: Option<u32>,
}

impl TransformOptions {
    /// True when no transformation is requested at all.
    pub fn is_noop(&self) -> bool {
        !self.still && self.width.is_none() && self.height.is_none()
    }

    /// Canonical suffix appended to the upstream URL when deriving a
    /// fingerprint. Equal options always produce equal suffixes.
    pub fn fingerprint_suffix(&self) -> String {
        let mut suffix = String::new();
        if self.still {
            suffix.push_str("|still");
        }
        if let Some(w) = self.width {
            suffix.push_str(&format!("|w={}", w));
        }
        if let Some(h) = self.height {
            suffix.push_str(&format!("|h={}", h));
        }
        suffix
    }
}

/// A successfully normalized request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    /// Upstream URL, scheme included, query string not included.
    pub url: String,
    pub options: TransformOptions,
}

/// Normalize a request path (mount prefix already stripped).
///
/// Returns `None` when the path is empty or yields no upstream URL.
pub fn normalize(path: &str) -> Option<NormalizedRequest> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let mut segments = trimmed.split('/').filter(|s| !s.is_empty()).peekable();
    let mut options = TransformOptions::default();

    if segments.peek() == Some(&"still") {
        segments.next();
        options.still = true;
    }

    if let Some(w) = segments.peek().and_then(|s| parse_dimension(s)) {
        segments.next();
        options.width = Some(w);

        if let Some(h) = segments.peek().and_then(|s| parse_dimension(s)) {
            segments.next();
            options.height = Some(h);
        }
    }

    // 0/0 is the spelled-out way of saying "no resize"
    if options.width == Some(0) && options.height == Some(0) {
        options.width = None;
        options.height = None;
    }

    let rest: Vec<&str> = segments.collect();
    if rest.is_empty() {
        return None;
    }

    let url = rest.join("/");
    let url = url.replace("&amp;", "&");
    let url = url.replace(' ', "%20");
    let url = repair_scheme(&url);
    let url = ensure_scheme(url);

    if url.is_empty() {
        return None;
    }

    Some(NormalizedRequest { url, options })
}

/// Parse a path segment as a dimension. Only all-digit segments count; a
/// segment too large for `u32` is treated as part of the URL instead.
fn parse_dimension(segment: &str) -> Option<u32> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Joining non-empty segments collapses `http://` to `http:/`; put the
/// second slash back. Case-insensitive, `https` included.
fn repair_scheme(url: &str) -> String {
    for scheme in ["http:/", "https:/"] {
        let n = scheme.len();
        if url.len() > n
            && url.as_bytes()[..n].eq_ignore_ascii_case(scheme.as_bytes())
            && url.as_bytes()[n] != b'/'
        {
            return format!("{}/{}", &url[..n], &url[n..]);
        }
    }
    url.to_string()
}

/// Prepend `http://` when no scheme is present.
fn ensure_scheme(url: String) -> String {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url
    } else {
        format!("http://{}", url)
    }
}

// ============================================================================
// TESTS
// ============================================================================
