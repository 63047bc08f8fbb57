//! docquery-cache server binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docquery_cache::cache::{CacheBackend, ConnectionManager, MemoryBackend, RedisBackend};
use docquery_cache::config::{BackendKind, Config};
use docquery_cache::database::{Database, MongoExecutor};
use docquery_cache::executor::CacheInstaller;
use docquery_cache::http::{self, AppState};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docquery_cache=info,mongodb=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting docquery-cache...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    info!("Cache backend: {:?}", config.backend);

    info!("Connecting to MongoDB...");
    let db = Database::connect(&config.mongodb_uri, &config.mongodb_database).await?;
    info!("Database connected");

    let backend: Arc<dyn CacheBackend> = match config.backend {
        BackendKind::Redis => Arc::new(RedisBackend::new(config.redis.clone())?),
        BackendKind::Memory => Arc::new(MemoryBackend::new(config.memory_capacity)),
    };
    let connection = ConnectionManager::with_reconnect(backend, config.reconnect);
    let installer = CacheInstaller::new(connection.clone(), config.cache.clone());

    let executor = installer.install(Arc::new(MongoExecutor::new(db))).await;
    if !connection.is_connected() {
        warn!("Cache backend unavailable, queries pass through until it reconnects");
    }

    let app = http::router(AppState::new(executor.clone()));
    let listener = tokio::net::TcpListener::bind(config.http_bind)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind))?;
    info!("Listening on {}", config.http_bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    executor.settle().await;
    if let Err(e) = connection.backend().disconnect().await {
        warn!("Cache backend disconnect failed: {}", e);
    }
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
