//! Sealock server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use sealock_core::config::{AppConfig, StorageConfig};
use sealock_core::Chunker;
use sealock_engine::{FileService, GarbageCollector, SnapshotService, UploadCoordinator};
use sealock_metadata::MetadataStore;
use sealock_server::{create_router, AppState};
use sealock_storage::{BlockStore, CachedStore, FilesystemStore, HotStore, MemoryHotStore, RedisHotStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Sealock - content-addressed document storage with versioning
#[derive(Parser, Debug)]
#[command(name = "sealockd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "SEALOCK_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// How often the session reaper prunes claims for expired sessions.
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "sealockd=info,sealock_server=info,sealock_engine=info,sealock_storage=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config: AppConfig = Figment::new()
        .merge(Toml::file(&args.config))
        .merge(Env::prefixed("SEALOCK_").split("__"))
        .extract()
        .with_context(|| format!("failed to load configuration from {}", args.config))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // The block store, and the hot store backing both the cache and the
    // upload session state. Plain local storage keeps session state
    // in-process; the cached variant shares the Redis endpoint.
    let (storage, hot): (Arc<dyn BlockStore>, Arc<dyn HotStore>) = match &config.storage {
        StorageConfig::Local { path } => {
            let backend: Arc<dyn BlockStore> = Arc::new(FilesystemStore::new(path).await?);
            let hot: Arc<dyn HotStore> = Arc::new(MemoryHotStore::new());
            (backend, hot)
        }
        StorageConfig::LocalCached { path, cache } => {
            let backend: Arc<dyn BlockStore> = Arc::new(FilesystemStore::new(path).await?);
            let hot: Arc<dyn HotStore> = Arc::new(RedisHotStore::connect(&cache.address).await?);
            let cached: Arc<dyn BlockStore> =
                Arc::new(CachedStore::new(backend, hot.clone(), cache.ttl_secs));
            (cached, hot)
        }
    };

    let metadata = sealock_metadata::from_config(&config.metadata).await?;
    metadata.health_check().await?;

    let block_io_timeout = Duration::from_secs(config.server.block_io_timeout_secs);
    let coordinator = Arc::new(
        UploadCoordinator::new(
            hot,
            storage.clone(),
            metadata.clone(),
            Duration::from_secs(config.upload.session_ttl_secs),
        )
        .with_block_io_timeout(block_io_timeout),
    );
    let snapshots = Arc::new(SnapshotService::new(metadata.clone()));
    let chunker = Chunker::from_config(&config.chunker)
        .map_err(|e| anyhow::anyhow!("invalid chunker config: {e}"))?;
    let files = Arc::new(
        FileService::new(
            chunker,
            storage.clone(),
            metadata.clone(),
            snapshots.clone(),
            true,
        )
        .with_block_io_timeout(block_io_timeout),
    );

    let _reaper = coordinator.clone().spawn_reaper(REAPER_INTERVAL);

    let gc = Arc::new(GarbageCollector::new(
        storage,
        metadata.clone(),
        coordinator.claims(),
        config.gc.batch_size,
    ));
    let _gc_task = gc.spawn_periodic(Duration::from_secs(config.gc.interval_secs));
    if config.gc.interval_secs == 0 {
        tracing::info!("periodic GC disabled (gc.interval_secs = 0)");
    }

    let bind: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;

    let state = AppState {
        config: Arc::new(config),
        coordinator,
        files,
        snapshots,
        metadata,
    };
    let router = create_router(state);

    tracing::info!(%bind, "sealockd listening");
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
