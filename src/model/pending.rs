//! Builder for a query awaiting execution.

use mongodb::bson::Document;
use serde_json::Value;

use crate::error::QueryResult;
use crate::executor::{CachingExecutor, QueryExecutor};
use crate::query::{CacheDirective, QueryDescriptor};

/// A query that has been described but not yet run.
#[derive(Debug)]
pub struct PendingQuery {
    executor: CachingExecutor,
    descriptor: QueryDescriptor,
    directive: CacheDirective,
}

impl PendingQuery {
    pub(crate) fn new(executor: CachingExecutor, descriptor: QueryDescriptor) -> Self {
        Self {
            executor,
            descriptor,
            directive: CacheDirective::disabled(),
        }
    }

    /// Restrict returned fields.
    #[must_use]
    pub fn select(mut self, projection: Document) -> Self {
        self.descriptor = self.descriptor.with_projection(projection);
        self
    }

    /// Set sort/limit/skip (finds) or allowDiskUse/batchSize (aggregations).
    #[must_use]
    pub fn options(mut self, options: Document) -> Self {
        self.descriptor = self.descriptor.with_options(options);
        self
    }

    /// Mark the query cacheable, optionally under an explicit key and TTL.
    #[must_use]
    pub fn cache(mut self, key: Option<String>, ttl_seconds: Option<u64>) -> Self {
        self.directive = CacheDirective::cached(key, ttl_seconds);
        self
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    pub fn directive(&self) -> &CacheDirective {
        &self.directive
    }

    /// Run the query, through the cache if it was marked cacheable.
    pub async fn exec(mut self) -> QueryResult<Value> {
        if self.directive.enabled {
            self.executor
                .execute_cached(&self.descriptor, &mut self.directive)
                .await
        } else {
            self.executor.execute(&self.descriptor).await
        }
    }
}
