//! LocalLift Proxy - runs the offline engine in front of an origin server.
//!
//! Every request the engine intercepts is answered with the same caching
//! strategies the web client uses; everything else is forwarded upstream.

mod handler;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use locallift_core::{
    CacheStorage, DynFetcher, HttpFetcher, MemoryCache, PollOptions, Poller, ServiceWorker,
    SqliteCache, UpdateSource, WorkerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "locallift-proxy")]
#[command(about = "Offline caching proxy for the LocalLift web client")]
struct Args {
    /// Origin server to forward requests to
    #[arg(long)]
    upstream: Url,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cache database path (defaults to the user data directory)
    #[arg(long, conflicts_with = "memory")]
    cache_db: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long)]
    memory: bool,

    /// Maximum number of requests handled at once
    #[arg(long, default_value = "64")]
    max_concurrency: usize,

    /// Poll the origin for new posts and log them
    #[arg(long)]
    poll_posts: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn open_storage(args: &Args) -> Result<Arc<dyn CacheStorage>> {
    if args.memory {
        info!("Using in-memory cache");
        return Ok(Arc::new(MemoryCache::new()));
    }

    let path = match args.cache_db.clone().or_else(ServiceWorker::default_cache_db_path) {
        Some(path) => path,
        None => {
            warn!("No data directory available, using in-memory cache");
            return Ok(Arc::new(MemoryCache::new()));
        }
    };

    info!("Cache database: {}", path.display());
    let storage = SqliteCache::new(&path)
        .with_context(|| format!("failed to open cache database {}", path.display()))?;
    Ok(Arc::new(storage))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting LocalLift proxy for {}", args.upstream);

    let config = match &args.config {
        Some(path) => WorkerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => WorkerConfig {
            origin: args.upstream.to_string(),
            ..Default::default()
        },
    };

    let storage = open_storage(&args)?;
    let fetcher: DynFetcher = Arc::new(HttpFetcher::with_options(
        Some(args.upstream.clone()),
        config.request_timeout(),
    )?);

    let mut builder = ServiceWorker::builder(config.clone())
        .storage(storage)
        .fetcher(Arc::clone(&fetcher));
    if args.poll_posts {
        let poller = Poller::new(fetcher, &config.origin_url()?, PollOptions::default())?;
        builder = builder.update_source(UpdateSource::Poll(poller));
    }
    let worker = Arc::new(builder.build()?);
    worker
        .events()
        .subscribe(|event| debug!("Worker event: {:?}", event));

    let report = worker.start().await.context("worker install failed")?;
    info!(
        "Worker {}: {} pre-cached, {} failed",
        worker.state(),
        report.cached.len(),
        report.failed.len()
    );

    if args.poll_posts {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            while let Some(posts) = worker.next_posts().await {
                for active in posts {
                    info!("New post: {} ({})", active.post.title, active.link);
                }
            }
        });
    }

    let addr = server::start_server(worker, &args.host, args.port, args.max_concurrency).await?;

    // Print port for the launcher to read (intentional stdout)
    println!("PROXY_PORT={}", addr.port());

    info!("Proxy running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
