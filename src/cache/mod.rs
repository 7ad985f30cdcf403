//! # Cache Store
//!
//! On-disk content-addressed cache. See [`store::CacheStore`] for the
//! layout, [`key::Fingerprint`] for the keying scheme and [`meta`] for the
//! sidecar record format.

pub mod key;
pub mod meta;
pub mod store;

pub use key::Fingerprint;
pub use meta::{CacheMeta, ErrorTag, ReplayHeaders};
pub use store::{CacheLookup, CacheStore};
