//! # Proxy Configuration
//!
//! This module defines the tunables of the proxy: cache location, size cap,
//! referer allow-list, resize pool sizing and cache bypass hosts.
//!
//! ## Defaults
//!
//! | Option | Default |
//! |--------|---------|
//! | max_size | 4 MiB |
//! | cache TTL | 30 days |
//! | pool_size | 4 workers |
//! | recycle_after | 250 jobs |

use std::path::PathBuf;
use std::time::Duration;

/// Upstream responses larger than this are rejected as "toolarge".
pub const DEFAULT_MAX_SIZE: u64 = 4 * 1024 * 1024;

/// Cache entries older than this are treated as absent.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Number of resize workers.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Jobs a resize worker serves before it is recycled.
pub const DEFAULT_RECYCLE_AFTER: usize = 250;

/// Upstream receive timeout, headers and body inclusive.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Outer guard around a whole fetch, slightly above [`UPSTREAM_TIMEOUT`] so
/// the client timeout normally fires first.
pub const FETCH_DEADLINE: Duration = Duration::from_secs(61);

/// Proxy configuration shared by every component.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Root of the on-disk cache.
    pub cache_root: PathBuf,
    /// Directory holding the static error GIFs.
    pub asset_dir: PathBuf,
    /// Maximum upstream payload size in bytes.
    pub max_size: u64,
    /// Referer allow-list patterns. Empty list allows everything.
    pub referer_patterns: Vec<String>,
    /// Number of resize workers.
    pub pool_size: usize,
    /// Jobs a resize worker serves before recycling.
    pub recycle_after: usize,
    /// Hosts whose cache read is always bypassed (written through anyway).
    pub bypass_hosts: Vec<String>,
    /// Cache entry time-to-live.
    pub ttl: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("cache"),
            asset_dir: PathBuf::from("assets"),
            max_size: DEFAULT_MAX_SIZE,
            referer_patterns: Vec::new(),
            pool_size: DEFAULT_POOL_SIZE,
            recycle_after: DEFAULT_RECYCLE_AFTER,
            bypass_hosts: Vec::new(),
            ttl: DEFAULT_TTL,
        }
    }
}

impl ProxyConfig {
    /// True if the host part of `url` is in the bypass set.
    ///
    /// Matching is by exact host string, case-insensitive, ignoring any
    /// port or userinfo.
    pub fn is_bypass_host(&self, url: &str) -> bool {
        if self.bypass_hosts.is_empty() {
            return false;
        }
        let Some(host) = host_of(url) else {
            return false;
        };
        self.bypass_hosts
            .iter()
            .any(|h| h.eq_ignore_ascii_case(host))
    }
}

/// Extract the host portion of an http(s) URL, without port or userinfo.
fn host_of(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = ProxyConfig::default();
        assert_eq!(config.max_size, 4 * 1024 * 1024);
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.recycle_after, 250);
        assert_eq!(config.ttl.as_secs(), 30 * 24 * 60 * 60);
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("http://example.com/img.png"), Some("example.com"));
        assert_eq!(host_of("https://example.com:8080/x"), Some("example.com"));
        assert_eq!(host_of("http://user@example.com/x"), Some("example.com"));
        assert_eq!(host_of("http://example.com"), Some("example.com"));
        assert_eq!(host_of("example.com/img.png"), None);
    }

    #[test]
    fn test_bypass_host_matching() {
        let config = ProxyConfig {
            bypass_hosts: vec!["gravatar.com".to_string()],
            ..ProxyConfig::default()
        };
        assert!(config.is_bypass_host("http://gravatar.com/avatar/abc"));
        assert!(config.is_bypass_host("http://GRAVATAR.COM/avatar/abc"));
        assert!(!config.is_bypass_host("http://example.com/avatar/abc"));
        assert!(!config.is_bypass_host("not a url"));
    }

    #[test]
    fn test_empty_bypass_list_matches_nothing() {
        let config = ProxyConfig::default();
        assert!(!config.is_bypass_host("http://gravatar.com/avatar/abc"));
    }
}
