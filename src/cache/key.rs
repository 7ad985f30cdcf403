//! Cache and single-flight keys.

use sha2::{Digest, Sha256};

use crate::normalize::TransformOptions;

/// A stable identifier for a cached artifact, derived from the normalized
/// upstream URL plus the transform options. Equal `(url, options)` pairs
/// yield equal fingerprints.
///
/// The fingerprint doubles as the single-flight key, so one in-flight fetch
/// covers both the plain and the transformed variants only when their
/// options match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    key: String,
    hex: String,
}

impl Fingerprint {
    /// Derive the fingerprint for a `(url, options)` pair.
    pub fn derive(url: &str, options: &TransformOptions) -> Self {
        let key = format!("{}{}", url, options.fingerprint_suffix());
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let hex = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self { key, hex }
    }

    /// The raw key (URL plus option suffix). Used in log lines.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Lowercase hex hash. Stable across runs; used for the on-disk path
    /// layout and as the fallback ETag source.
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_inputs_equal_fingerprints() {
        let opts = TransformOptions {
            still: false,
            width: Some(200),
            height: None,
        };
        let a = Fingerprint::derive("http://example.com/img.png", &opts);
        let b = Fingerprint::derive("http://example.com/img.png", &opts);
        assert_eq!(a, b);
        assert_eq!(a.hex(), b.hex());
    }

    #[test]
    fn test_options_change_fingerprint() {
        let url = "http://example.com/img.png";
        let plain = Fingerprint::derive(url, &TransformOptions::default());
        let resized = Fingerprint::derive(
            url,
            &TransformOptions {
                still: false,
                width: Some(200),
                height: None,
            },
        );
        let still = Fingerprint::derive(
            url,
            &TransformOptions {
                still: true,
                width: None,
                height: None,
            },
        );
        assert_ne!(plain, resized);
        assert_ne!(plain, still);
        assert_ne!(resized, still);
    }

    #[test]
    fn test_hex_is_sha256_hex() {
        let fp = Fingerprint::derive("http://example.com/a", &TransformOptions::default());
        assert_eq!(fp.hex().len(), 64);
        assert!(fp.hex().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
