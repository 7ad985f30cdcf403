//! Static error responses.
//!
//! Three small GIFs answer the three client-visible failure classes. They
//! are read once at startup and held in memory; every response gets a fresh
//! copy of the bytes. A missing asset file falls back to a built-in 1×1
//! transparent GIF so the proxy still answers something image-shaped.

use std::fs;
use std::path::Path;

use crate::cache::ErrorTag;

/// Built-in 1×1 transparent GIF, served when an asset file is absent.
const FALLBACK_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, // GIF89a
    0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, // 1x1, 2-color palette
    0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, // palette
    0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, // transparent
    0x2C, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, // descriptor
    0x02, 0x02, 0x44, 0x01, 0x00, // image data
    0x3B, // trailer
];

/// The pre-loaded error GIFs.
#[derive(Debug, Clone)]
pub struct ErrorAssets {
    toolarge: Vec<u8>,
    badformat: Vec<u8>,
    cannotread: Vec<u8>,
}

impl ErrorAssets {
    /// Load `toolarge.gif`, `badformat.gif` and `cannotread.gif` from
    /// `dir`, substituting the built-in fallback for anything missing.
    pub fn load(dir: &Path) -> Self {
        Self {
            toolarge: load_asset(dir, "toolarge.gif"),
            badformat: load_asset(dir, "badformat.gif"),
            cannotread: load_asset(dir, "cannotread.gif"),
        }
    }

    /// The GIF bytes for an error tag.
    pub fn get(&self, tag: ErrorTag) -> &[u8] {
        match tag {
            ErrorTag::TooLarge => &self.toolarge,
            ErrorTag::BadFormat => &self.badformat,
            ErrorTag::CannotRead => &self.cannotread,
        }
    }
}

fn load_asset(dir: &Path, name: &str) -> Vec<u8> {
    let path = dir.join(name);
    match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!(
                "[server] Missing error asset {} ({}); using built-in fallback",
                path.display(),
                e
            );
            FALLBACK_GIF.to_vec()
        }
    }
}
