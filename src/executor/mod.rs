//! Query execution capability and its caching decorator.
//!
//! [`QueryExecutor`] is the seam between the cache and whatever actually
//! runs queries. [`CachingExecutor`] wraps one and adds the cache;
//! [`CacheInstaller`] captures the original executor exactly once.

mod caching;
mod install;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::QueryResult;
use crate::query::QueryDescriptor;

pub use caching::CachingExecutor;
pub use install::CacheInstaller;

/// Runs a read query against the underlying store.
///
/// Implementations must be read-only: the cache may call them any number of
/// times for the same descriptor.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, descriptor: &QueryDescriptor) -> QueryResult<Value>;
}
