//! Server state and configuration.

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::config::ProxyConfig;
use crate::error::EspejoError;
use crate::fetch::{Fetcher, Registry};
use crate::referer::RefererGate;
use crate::resize::ResizePool;

use super::assets::ErrorAssets;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    pub listen_addr: String,
    /// Everything below the HTTP surface.
    pub proxy: ProxyConfig,
}

/// Application state shared across handlers.
///
/// Every service is constructed once here and passed by reference; there
/// are no process-wide singletons.
#[derive(Debug)]
pub struct AppState {
    pub config: ProxyConfig,
    pub store: Arc<CacheStore>,
    pub registry: Arc<Registry>,
    pub fetcher: Fetcher,
    pub assets: ErrorAssets,
    pub gate: RefererGate,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self, EspejoError> {
        let store = Arc::new(CacheStore::open(&config.cache_root, config.ttl)?);
        let registry = Arc::new(Registry::new());
        let resizer = Arc::new(ResizePool::new(config.pool_size, config.recycle_after));
        let fetcher = Fetcher::new(
            store.clone(),
            registry.clone(),
            resizer,
            config.max_size,
        )?;
        let assets = ErrorAssets::load(&config.asset_dir);
        let gate = RefererGate::new(&config.referer_patterns)?;

        Ok(Self {
            config,
            store,
            registry,
            fetcher,
            assets,
            gate,
        })
    }
}
