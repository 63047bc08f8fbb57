//! Key-value cache backend interface.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cache backend is not connected")]
    NotConnected,

    #[error("cache backend operation timed out")]
    Timeout,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid key pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Unsolicited connectivity notifications emitted by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The connection became usable (e.g. after a reconnect).
    Connected,
    /// The connection failed.
    Error(String),
    /// The connection was closed.
    Ended,
}

/// Thin interface over an external key-value store.
///
/// Implementations must be thread-safe. `set` clears any expiry previously
/// attached to the key, matching Redis `SET`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a value. `Ok(None)` if the key is absent or expired.
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Store a value without expiry.
    async fn set(&self, key: &str, value: &[u8]) -> BackendResult<()>;

    /// Attach a TTL to an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, seconds: u64) -> BackendResult<bool>;

    /// Delete a key. Returns `true` if it existed.
    async fn del(&self, key: &str) -> BackendResult<bool>;

    /// List keys matching a glob pattern (`*`, `?`).
    async fn keys(&self, pattern: &str) -> BackendResult<Vec<String>>;

    /// Open the connection.
    async fn connect(&self) -> BackendResult<()>;

    /// Forcibly tear the connection down.
    async fn disconnect(&self) -> BackendResult<()>;

    /// Subscribe to connectivity events.
    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
