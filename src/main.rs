//! # Espejo CLI
//!
//! Command-line entry point for the image proxy.
//!
//! ## Usage
//!
//! ```bash
//! # Serve on the default port with a local cache directory
//! espejo serve
//!
//! # Production-ish invocation
//! espejo serve \
//!     --listen 0.0.0.0:8080 \
//!     --cache-dir /var/cache/espejo \
//!     --asset-dir /usr/share/espejo \
//!     --max-size 4194304 \
//!     --referer '^https?://mysite\.example/' \
//!     --bypass-host gravatar.com
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use espejo::{
    config::{self, ProxyConfig},
    server::{serve, ServerConfig},
    EspejoError,
};

/// Espejo - caching HTTP image proxy
#[derive(Parser, Debug)]
#[command(name = "espejo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the proxy server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,

        /// Cache root directory
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Directory holding the error GIFs
        #[arg(long, default_value = "assets")]
        asset_dir: PathBuf,

        /// Maximum upstream payload size in bytes
        #[arg(long, default_value_t = config::DEFAULT_MAX_SIZE)]
        max_size: u64,

        /// Allowed referer pattern (repeatable); no patterns allows all
        #[arg(long = "referer", value_name = "REGEX")]
        referer: Vec<String>,

        /// Number of resize workers
        #[arg(long, default_value_t = config::DEFAULT_POOL_SIZE)]
        pool_size: usize,

        /// Jobs served before a resize worker is recycled
        #[arg(long, default_value_t = config::DEFAULT_RECYCLE_AFTER)]
        recycle_after: usize,

        /// Host whose cache read is always bypassed (repeatable)
        #[arg(long = "bypass-host", value_name = "HOST")]
        bypass_host: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), EspejoError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            listen,
            cache_dir,
            asset_dir,
            max_size,
            referer,
            pool_size,
            recycle_after,
            bypass_host,
        } => {
            let proxy = ProxyConfig {
                cache_root: cache_dir,
                asset_dir,
                max_size,
                referer_patterns: referer,
                pool_size,
                recycle_after,
                bypass_hosts: bypass_host,
                ttl: config::DEFAULT_TTL,
            };
            serve(ServerConfig {
                listen_addr: listen,
                proxy,
            })
            .await
        }
    }
}
