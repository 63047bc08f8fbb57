//! Wildcard (pattern-based) bulk invalidation.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tracing::{info, warn};

use super::key::entity_pattern;
use super::lifecycle::ConnectionManager;

/// Maximum number of DEL commands in flight at once.
const DELETE_CONCURRENCY: usize = 16;

/// Result of a bulk invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlushOutcome {
    /// Caching is disabled; nothing was attempted.
    NoCache,
    /// Keys were listed and deleted. `deleted` may be lower than `matched`
    /// when individual deletes fail.
    Flushed { matched: usize, deleted: usize },
}

/// Deletes every entry whose key matches a glob pattern.
#[derive(Debug, Clone)]
pub struct WildcardInvalidator {
    connection: Arc<ConnectionManager>,
}

impl WildcardInvalidator {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    /// Delete all keys matching `pattern`.
    ///
    /// Per-key failures are logged and skipped. When the backend is not
    /// connected this returns [`FlushOutcome::NoCache`] without touching it.
    pub async fn invalidate(&self, pattern: &str) -> FlushOutcome {
        if !self.connection.is_connected() {
            return FlushOutcome::NoCache;
        }

        let backend = self.connection.backend();

        let keys = match backend.keys(pattern).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!("Failed to list cache keys for '{}': {}", pattern, err);
                return FlushOutcome::Flushed {
                    matched: 0,
                    deleted: 0,
                };
            }
        };
        let matched = keys.len();

        let deleted = futures::stream::iter(keys)
            .map(|key| async move {
                match backend.del(&key).await {
                    Ok(removed) => removed,
                    Err(err) => {
                        warn!("Failed to delete cache key {}: {}", key, err);
                        false
                    }
                }
            })
            .buffer_unordered(DELETE_CONCURRENCY)
            .filter(|removed| futures::future::ready(*removed))
            .count()
            .await;

        info!(
            "Invalidated '{}': {} matched, {} deleted",
            pattern, matched, deleted
        );
        FlushOutcome::Flushed { matched, deleted }
    }

    /// Flush every cached result belonging to one entity.
    pub async fn flush_entity(&self, entity: &str) -> FlushOutcome {
        self.invalidate(&entity_pattern(entity)).await
    }
}
