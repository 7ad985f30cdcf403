//! # On-Disk Cache Store
//!
//! Content-addressed store keyed by [`Fingerprint`]. Each entry is a payload
//! file plus a JSON metadata sidecar:
//!
//! ```text
//! <root>/<h0>/<h1>/<hex>          payload bytes
//! <root>/<h0>/<h1>/<hex>-meta     metadata record
//! <root>/tmp/                     in-progress downloads
//! ```
//!
//! where `h0`/`h1` are the first two characters of the fingerprint's hex
//! hash, keeping directory sizes bounded. Payloads are written through the
//! `tmp/` directory and promoted with a rename, so readers never observe a
//! partial file. The store never evicts on its own; entries past their TTL
//! simply report as absent.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::key::Fingerprint;
use super::meta::{CacheMeta, ErrorTag};

/// Result of a cache lookup.
#[derive(Debug)]
pub enum CacheLookup {
    /// A fresh entry with an existing payload file.
    Fresh { meta: CacheMeta, payload: PathBuf },
    /// A fresh metadata-only record carrying a sticky error.
    StickyError(ErrorTag),
    /// Nothing usable; the caller should fetch.
    Absent,
}

/// Disk-backed cache store. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    temp_dir: PathBuf,
    ttl: Duration,
}

impl CacheStore {
    /// Open the store, creating the root and temp directories and sweeping
    /// temp files left behind by a previous run.
    pub fn open(root: impl Into<PathBuf>, ttl: Duration) -> std::io::Result<Self> {
        let root = root.into();
        let temp_dir = root.join("tmp");
        fs::create_dir_all(&temp_dir)?;

        let mut swept = 0usize;
        for entry in fs::read_dir(&temp_dir)?.flatten() {
            if fs::remove_file(entry.path()).is_ok() {
                swept += 1;
            }
        }
        if swept > 0 {
            println!("[cache] Swept {} leftover temp file(s)", swept);
        }

        Ok(Self {
            root,
            temp_dir,
            ttl,
        })
    }

    /// Directory for in-progress downloads. Same filesystem as the payload
    /// tree, so promotion is a rename.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Payload path for a fingerprint.
    pub fn payload_path(&self, fp: &Fingerprint) -> PathBuf {
        let h = fp.hex();
        self.root.join(&h[0..1]).join(&h[1..2]).join(h)
    }

    fn meta_path(&self, fp: &Fingerprint) -> PathBuf {
        let h = fp.hex();
        self.root
            .join(&h[0..1])
            .join(&h[1..2])
            .join(format!("{}-meta", h))
    }

    /// Look up an entry. Expired, orphaned or unparsable records report as
    /// [`CacheLookup::Absent`].
    pub fn lookup(&self, fp: &Fingerprint) -> CacheLookup {
        let meta_path = self.meta_path(fp);
        let Ok(bytes) = fs::read(&meta_path) else {
            return CacheLookup::Absent;
        };

        let meta: CacheMeta = match serde_json::from_slice(&bytes) {
            Ok(meta) => meta,
            Err(e) => {
                println!("[cache] Dropping unparsable record {}: {}", fp.hex(), e);
                self.remove(fp);
                return CacheLookup::Absent;
            }
        };

        if meta.age_seconds() > self.ttl.as_secs() {
            return CacheLookup::Absent;
        }

        if let Some(tag) = meta.error {
            return CacheLookup::StickyError(tag);
        }

        // A record without its payload is treated as absent
        let payload = self.payload_path(fp);
        let Ok(file_meta) = fs::metadata(&payload) else {
            return CacheLookup::Absent;
        };
        if let Some(headers) = &meta.headers {
            if headers.content_length != file_meta.len() {
                println!("[cache] Dropping truncated payload {}", fp.hex());
                self.remove(fp);
                return CacheLookup::Absent;
            }
        }

        CacheLookup::Fresh { meta, payload }
    }

    /// Promote a completed temp file into place and write its metadata
    /// record. The payload lands first, the sidecar second, both atomically
    /// from a reader's standpoint; a crash in between leaves an orphan that
    /// `lookup` ignores.
    pub fn store(
        &self,
        fp: &Fingerprint,
        temp: &Path,
        meta: &CacheMeta,
    ) -> std::io::Result<PathBuf> {
        let payload = self.payload_path(fp);
        if let Some(parent) = payload.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(temp, &payload)?;
        self.write_meta(fp, meta)?;
        Ok(payload)
    }

    /// Store a metadata-only record with a sticky error, removing any
    /// payload a previous fetch left behind.
    pub fn mark_error(&self, fp: &Fingerprint, tag: ErrorTag) -> std::io::Result<()> {
        let _ = fs::remove_file(self.payload_path(fp));
        self.write_meta(fp, &CacheMeta::for_error(tag))
    }

    /// Remove both halves of an entry. Missing files are fine.
    pub fn remove(&self, fp: &Fingerprint) {
        let _ = fs::remove_file(self.payload_path(fp));
        let _ = fs::remove_file(self.meta_path(fp));
    }

    fn write_meta(&self, fp: &Fingerprint, meta: &CacheMeta) -> std::io::Result<()> {
        let meta_path = self.meta_path(fp);
        if let Some(parent) = meta_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_vec(meta)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let tmp = self.temp_dir.join(format!("{}-meta.tmp", fp.hex()));
        fs::write(&tmp, &serialized)?;
        match fs::rename(&tmp, &meta_path) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
