//! Get-or-execute-and-store orchestration for one query execution.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use super::backend::CacheBackend;
use super::codec;
use super::config::CacheOptions;
use super::key::CacheKey;
use super::lifecycle::ConnectionManager;
use super::stats::CacheStats;
use crate::error::QueryResult;
use crate::query::{CacheDirective, QueryDescriptor};

type LockTable = DashMap<String, KeyLock>;

/// The caching decision engine.
///
/// Backend failures never reach the caller: reads fail open into a miss and
/// writes run in the background, dropped with a warning on failure. Only
/// errors from the underlying executor propagate.
pub struct CacheEngine {
    connection: Arc<ConnectionManager>,
    options: CacheOptions,
    stats: Arc<CacheStats>,
    /// Per-key locks used when `single_flight` is enabled.
    in_flight: Arc<LockTable>,
    writes: Arc<PendingWrites>,
}

impl CacheEngine {
    pub fn new(connection: Arc<ConnectionManager>, options: CacheOptions) -> Self {
        Self {
            connection,
            options,
            stats: Arc::new(CacheStats::new()),
            in_flight: Arc::new(DashMap::new()),
            writes: Arc::new(PendingWrites::default()),
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of background cache writes still running.
    pub fn pending_writes(&self) -> usize {
        self.writes.count.load(Ordering::SeqCst)
    }

    /// Wait until every background cache write has finished.
    pub async fn settle(&self) {
        self.writes.wait_idle().await;
    }

    /// Serve `descriptor` from the cache, or run `execute` and memoize it.
    ///
    /// With the directive disabled or the backend not connected, `execute`
    /// runs directly and the backend is never touched. On a miss the result
    /// is returned as soon as `execute` finishes; SET and EXPIRE follow in a
    /// spawned task.
    pub async fn execute_with_cache<F, Fut>(
        &self,
        descriptor: &QueryDescriptor,
        directive: &mut CacheDirective,
        execute: F,
    ) -> QueryResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<Value>>,
    {
        if !directive.enabled || !self.connection.is_connected() {
            self.stats.record_pass_through();
            return execute().await;
        }

        let key = directive.resolve_key(descriptor).clone();
        let ttl = self.options.effective_ttl(directive.ttl_seconds);

        if let Some(hit) = self.read(&key).await {
            self.stats.record_hit();
            self.trace("Cache hit", &key);
            return Ok(hit);
        }

        if !self.options.single_flight {
            self.stats.record_miss();
            self.trace("Cache miss", &key);
            let result = execute().await?;
            self.spawn_store(&key, &result, ttl, ());
            return Ok(result);
        }

        let (ticket, lock) = InFlightTicket::register(&self.in_flight, key.as_str());
        let guard = lock.lock_owned().await;

        // Another execution may have filled the entry while we waited.
        if let Some(hit) = self.read(&key).await {
            self.stats.record_hit();
            self.trace("Cache hit after wait", &key);
            return Ok(hit);
        }

        self.stats.record_miss();
        self.trace("Cache miss", &key);
        let result = execute().await?;
        // Followers stay parked until the write lands.
        self.spawn_store(&key, &result, ttl, (guard, ticket));
        Ok(result)
    }

    /// Read and validate an entry. Any failure reads as a miss.
    async fn read(&self, key: &CacheKey) -> Option<Value> {
        let backend = self.connection.backend();

        match backend.get(key.as_str()).await {
            Ok(Some(bytes)) => {
                let value = codec::decode_entry(&bytes);
                if value.is_none() {
                    self.trace("Ignoring unusable cache entry", key);
                }
                value
            }
            Ok(None) => None,
            Err(err) => {
                warn!("Cache read failed for {}: {}", key, err);
                self.stats.record_backend_error();
                None
            }
        }
    }

    /// Queue a best-effort write. `hold` is released once the write is done.
    fn spawn_store<H: Send + 'static>(
        &self,
        key: &CacheKey,
        result: &Value,
        ttl: Option<u64>,
        hold: H,
    ) {
        let payload = match codec::serialize(result) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Failed to serialize result for {}: {}", key, err);
                self.stats.record_write_failure();
                return;
            }
        };

        let write = StoreTask {
            backend: self.connection.backend().clone(),
            stats: self.stats.clone(),
            key: key.clone(),
            payload,
            ttl,
            debug: self.options.debug,
        };
        let pending = self.writes.begin();

        tokio::spawn(async move {
            write.run().await;
            drop(hold);
            drop(pending);
        });
    }

    fn trace(&self, message: &str, key: &CacheKey) {
        trace(self.options.debug, message, key);
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("connection", &self.connection)
            .field("options", &self.options)
            .field("in_flight", &self.in_flight.len())
            .field("pending_writes", &self.pending_writes())
            .finish()
    }
}

fn trace(verbose: bool, message: &str, key: &CacheKey) {
    if verbose {
        info!("{}: {}", message, key);
    } else {
        debug!("{}: {}", message, key);
    }
}

/// One SET followed by an optional EXPIRE.
struct StoreTask {
    backend: Arc<dyn CacheBackend>,
    stats: Arc<CacheStats>,
    key: CacheKey,
    payload: String,
    ttl: Option<u64>,
    debug: bool,
}

impl StoreTask {
    async fn run(self) {
        let key = &self.key;

        if let Err(err) = self.backend.set(key.as_str(), self.payload.as_bytes()).await {
            warn!("Cache write failed for {}: {}", key, err);
            self.stats.record_write_failure();
            return;
        }

        if let Some(seconds) = self.ttl
            && let Err(err) = self.backend.expire(key.as_str(), seconds).await
        {
            warn!("Failed to set {}s expiry on {}: {}", seconds, key, err);
            self.stats.record_write_failure();
        }

        trace(self.debug, "Cached result", key);
    }
}

/// Counter of background writes with a wakeup when it reaches zero.
#[derive(Debug, Default)]
struct PendingWrites {
    count: AtomicUsize,
    idle: Notify,
}

impl PendingWrites {
    fn begin(self: &Arc<Self>) -> PendingWrite {
        self.count.fetch_add(1, Ordering::SeqCst);
        PendingWrite(self.clone())
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements the pending count on drop, including when the task is cancelled.
struct PendingWrite(Arc<PendingWrites>);

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Per-key lock shared by every execution registered for that key.
#[derive(Debug, Default)]
struct KeyLock {
    lock: Arc<Mutex<()>>,
    holders: usize,
}

/// Registration in the lock table. Dropping the last ticket for a key
/// removes its entry, whether the execution finished or was cancelled.
struct InFlightTicket {
    table: Arc<LockTable>,
    key: String,
}

impl InFlightTicket {
    fn register(table: &Arc<LockTable>, key: &str) -> (Self, Arc<Mutex<()>>) {
        let lock = {
            let mut entry = table.entry(key.to_string()).or_default();
            entry.holders += 1;
            entry.lock.clone()
        };
        let ticket = Self {
            table: table.clone(),
            key: key.to_string(),
        };
        (ticket, lock)
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.table.entry(self.key.clone()) {
            entry.get_mut().holders -= 1;
            if entry.get().holders == 0 {
                entry.remove();
            }
        }
    }
}
