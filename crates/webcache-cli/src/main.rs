//! Webcache CLI - fetch URLs through a local or bucket-backed cache.
//!
//! `webcache get <url>` prints the (possibly cached) body to stdout;
//! `webcache delete <key>` removes one entry.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use webcache_core::{
    Cache, CacheError, CacheStore, FsStore, HttpClient, ObjectStore, ObjectStoreSettings,
    Recovered, Ttl,
};

#[derive(Parser, Debug)]
#[command(name = "webcache")]
#[command(about = "Read-through cache for HTTP resources")]
struct Args {
    /// Cache directory (defaults to the platform cache dir)
    #[arg(long, conflicts_with = "bucket")]
    root: Option<PathBuf>,

    /// Store entries in this object-storage bucket instead of on disk.
    /// Requests are unsigned, so the bucket must allow anonymous access
    /// (public buckets or S3-compatible gateways without credentials).
    #[arg(long)]
    bucket: Option<String>,

    /// Bucket region (defaults to $AWS_REGION, then us-east-1)
    #[arg(long, requires = "bucket")]
    region: Option<String>,

    /// S3-compatible endpoint, addressed path-style
    #[arg(long, requires = "bucket")]
    endpoint: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a URL, serving it from the cache while fresh
    Get {
        url: String,

        /// Maximum age in seconds (0 = refresh, negative = forever)
        #[arg(long, default_value = "3600", allow_hyphen_values = true)]
        ttl: i64,
    },
    /// Remove a cache entry by key
    Delete { key: String },
}

fn open_store(args: &Args) -> Result<Arc<dyn CacheStore>> {
    if let Some(bucket) = &args.bucket {
        let mut settings = ObjectStoreSettings::from_env(bucket.clone());
        if let Some(region) = &args.region {
            settings = settings.with_region(region.clone());
        }
        if let Some(endpoint) = &args.endpoint {
            settings = settings.with_endpoint(endpoint.clone());
        }
        info!("Using bucket {} ({})", settings.bucket, settings.region);
        return Ok(Arc::new(ObjectStore::connect(settings)?));
    }

    let root = match &args.root {
        Some(path) => path.clone(),
        None => dirs::cache_dir()
            .context("no platform cache directory; pass --root")?
            .join("webcache"),
    };
    info!("Using cache directory {}", root.display());
    Ok(Arc::new(FsStore::new(root)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so bodies can be piped from stdout
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let store = open_store(&args)?;
    let cache = Cache::from_shared(store, Arc::new(HttpClient::new()?));

    match args.command {
        Command::Get { url, ttl } => {
            let body = match cache.cache_url_data(&url, Ttl::from_secs(ttl)).await {
                Ok(body) => body,
                Err(CacheError::WriteBack { recovered, source }) => {
                    warn!("Fetched {} but could not cache it: {}", url, source);
                    match *recovered {
                        Recovered::Response(response) => response.into_body(),
                        Recovered::Bytes(data) => data.into(),
                    }
                }
                Err(e) => return Err(e).with_context(|| format!("failed to fetch {}", url)),
            };
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&body)?;
            stdout.flush()?;
        }
        Command::Delete { key } => {
            cache
                .invalidate(&key)
                .await
                .with_context(|| format!("failed to delete {}", key))?;
            info!("Deleted {}", key);
        }
    }

    Ok(())
}
