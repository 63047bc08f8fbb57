//! Redis-backed cache backend.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use tokio::sync::broadcast;
use tracing::{error, info};

use super::backend::{BackendError, BackendEvent, BackendResult, CacheBackend};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://:password@localhost:6379/0`.
    pub url: String,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(2),
        }
    }
}

/// Cache backend over a multiplexed Redis connection.
///
/// IO failures on any command drop the connection and broadcast
/// [`BackendEvent::Error`].
pub struct RedisBackend {
    client: Client,
    config: RedisConfig,
    conn: RwLock<Option<MultiplexedConnection>>,
    events: broadcast::Sender<BackendEvent>,
}

impl RedisBackend {
    /// Create a backend. No connection is opened until `connect`.
    pub fn new(config: RedisConfig) -> BackendResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            config,
            conn: RwLock::new(None),
            events,
        })
    }

    fn connection(&self) -> BackendResult<MultiplexedConnection> {
        self.conn.read().clone().ok_or(BackendError::NotConnected)
    }

    /// Map a command result, tearing the connection down on transport errors.
    fn observe<T>(&self, result: RedisResult<T>) -> BackendResult<T> {
        result.map_err(|err| {
            if is_transport_error(&err) {
                error!("Redis connection error: {}", err);
                self.conn.write().take();
                let _ = self.events.send(BackendEvent::Error(err.to_string()));
            }
            if err.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::Redis(err)
            }
        })
    }
}

fn is_transport_error(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut conn = self.connection()?;
        let result: RedisResult<Option<Vec<u8>>> = conn.get(key).await;
        self.observe(result)
    }

    async fn set(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        let mut conn = self.connection()?;
        let result: RedisResult<()> = conn.set(key, value).await;
        self.observe(result)
    }

    async fn expire(&self, key: &str, seconds: u64) -> BackendResult<bool> {
        let mut conn = self.connection()?;
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        let result: RedisResult<bool> = conn.expire(key, seconds).await;
        self.observe(result)
    }

    async fn del(&self, key: &str) -> BackendResult<bool> {
        let mut conn = self.connection()?;
        let result: RedisResult<i64> = conn.del(key).await;
        self.observe(result).map(|removed| removed > 0)
    }

    async fn keys(&self, pattern: &str) -> BackendResult<Vec<String>> {
        let mut conn = self.connection()?;
        let result: RedisResult<Vec<String>> = conn.keys(pattern).await;
        self.observe(result)
    }

    async fn connect(&self) -> BackendResult<()> {
        let conn = self
            .client
            .get_multiplexed_async_connection_with_timeouts(
                self.config.response_timeout,
                self.config.connect_timeout,
            )
            .await?;

        *self.conn.write() = Some(conn);
        info!("Redis connected");
        Ok(())
    }

    async fn disconnect(&self) -> BackendResult<()> {
        if self.conn.write().take().is_some() {
            info!("Redis connection closed");
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("connected", &self.conn.read().is_some())
            .field("connect_timeout", &self.config.connect_timeout)
            .finish()
    }
}
