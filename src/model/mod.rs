//! Entity-level convenience surface.
//!
//! A [`Model`] binds an entity name to a [`CachingExecutor`] and exposes
//! builder-style queries that can be marked cacheable before execution.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let users = Model::new("User", executor.clone());
//!
//! let ann = users
//!     .find_one(doc! { "id": 1 })
//!     .cache(None, Some(60))
//!     .exec()
//!     .await?;
//!
//! users.flush_cache().await;
//! ```

mod pending;

use mongodb::bson::{Bson, Document};
use serde_json::Value;

use crate::cache::FlushOutcome;
use crate::error::QueryResult;
use crate::executor::CachingExecutor;
use crate::query::{CacheDirective, QueryDescriptor};

pub use pending::PendingQuery;

/// Options for the one-shot [`Model::get_one`] / [`Model::get_many`] helpers.
#[derive(Debug, Clone, PartialEq)]
pub struct GetOptions {
    pub conditions: Document,
    pub projection: Document,
    pub options: Document,
    /// Cache the result. Defaults to `true`.
    pub cached: bool,
    pub cache_key: Option<String>,
    pub ttl_seconds: Option<u64>,
}

impl GetOptions {
    pub fn new(conditions: Document) -> Self {
        Self {
            conditions,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = projection;
        self
    }

    #[must_use]
    pub fn options(mut self, options: Document) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn uncached(mut self) -> Self {
        self.cached = false;
        self
    }

    #[must_use]
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }

    fn directive(&self) -> CacheDirective {
        if self.cached {
            CacheDirective::cached(self.cache_key.clone(), self.ttl_seconds)
        } else {
            CacheDirective::disabled()
        }
    }
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            conditions: Document::new(),
            projection: Document::new(),
            options: Document::new(),
            cached: true,
            cache_key: None,
            ttl_seconds: None,
        }
    }
}

/// Query handle for one entity.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    executor: CachingExecutor,
}

impl Model {
    pub fn new(name: impl Into<String>, executor: CachingExecutor) -> Self {
        Self {
            name: name.into(),
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start a filtered find.
    pub fn find(&self, conditions: Document) -> PendingQuery {
        PendingQuery::new(
            self.executor.clone(),
            QueryDescriptor::find(self.name.as_str(), conditions),
        )
    }

    /// Start a point lookup.
    pub fn find_one(&self, conditions: Document) -> PendingQuery {
        PendingQuery::new(
            self.executor.clone(),
            QueryDescriptor::find_one(self.name.as_str(), conditions),
        )
    }

    /// Start an aggregation.
    pub fn aggregate(&self, pipeline: Vec<Document>) -> PendingQuery {
        PendingQuery::new(
            self.executor.clone(),
            QueryDescriptor::aggregate(self.name.as_str(), pipeline),
        )
    }

    /// Fetch the first matching document (or `null`).
    ///
    /// Adds `limit: 1` to the options so the derived key never collides
    /// with an unlimited [`get_many`](Self::get_many) over the same filter.
    pub async fn get_one(&self, get: GetOptions) -> QueryResult<Value> {
        let mut options = get.options.clone();
        if !options.contains_key("limit") {
            options.insert("limit", Bson::Int32(1));
        }

        let descriptor = QueryDescriptor::find_one(self.name.as_str(), get.conditions.clone())
            .with_projection(get.projection.clone())
            .with_options(options);
        self.executor
            .execute_cached(&descriptor, &mut get.directive())
            .await
    }

    /// Fetch every matching document.
    pub async fn get_many(&self, get: GetOptions) -> QueryResult<Value> {
        let descriptor = QueryDescriptor::find(self.name.as_str(), get.conditions.clone())
            .with_projection(get.projection.clone())
            .with_options(get.options.clone());
        self.executor
            .execute_cached(&descriptor, &mut get.directive())
            .await
    }

    /// Drop every cached result for this entity.
    pub async fn flush_cache(&self) -> FlushOutcome {
        self.executor.flush(&self.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::testing::caching_fixture;
    use mongodb::bson::doc;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_one_and_get_many_use_distinct_keys() {
        let (executor, backend, direct) = caching_fixture(json!([{ "id": 1 }]), CacheOptions::default()).await;
        let users = Model::new("User", executor);

        users.get_one(GetOptions::new(doc! { "id": 1 })).await.unwrap();
        users.get_many(GetOptions::new(doc! { "id": 1 })).await.unwrap();
        assert_eq!(direct.calls(), 2);
        users.executor.settle().await;

        assert!(
            backend
                .peek(r#"User_{"query":{"id":1},"fields":{},"options":{"limit":1}}"#)
                .await
                .is_some()
        );
        assert!(
            backend
                .peek(r#"User_{"query":{"id":1},"fields":{},"options":{}}"#)
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_get_many_cached_and_uncached() {
        let (executor, _backend, direct) = caching_fixture(json!([]), CacheOptions::default()).await;
        let orders = Model::new("Order", executor);

        orders.get_many(GetOptions::new(doc! {})).await.unwrap();
        orders.executor.settle().await;
        orders.get_many(GetOptions::new(doc! {})).await.unwrap();
        assert_eq!(direct.calls(), 1);

        orders.get_many(GetOptions::new(doc! {}).uncached()).await.unwrap();
        assert_eq!(direct.calls(), 2);
    }

    #[tokio::test]
    async fn test_get_with_key_and_ttl() {
        let (executor, backend, _direct) = caching_fixture(json!([]), CacheOptions::default()).await;
        let orders = Model::new("Order", executor);

        orders
            .get_many(GetOptions::new(doc! {}).cache_key("Order_recent").ttl(30))
            .await
            .unwrap();
        orders.executor.settle().await;

        assert_eq!(backend.expirations(), vec![("Order_recent".to_string(), 30)]);
    }

    #[tokio::test]
    async fn test_flush_cache_removes_entity_entries() {
        let (executor, backend, direct) = caching_fixture(json!([]), CacheOptions::default()).await;
        let orders = Model::new("Order", executor.clone());
        let users = Model::new("User", executor);

        orders.get_many(GetOptions::new(doc! {})).await.unwrap();
        users.get_many(GetOptions::new(doc! {})).await.unwrap();
        users.executor.settle().await;

        assert_eq!(
            orders.flush_cache().await,
            FlushOutcome::Flushed { matched: 1, deleted: 1 }
        );
        assert_eq!(backend.keys_calls(), 1);

        orders.get_many(GetOptions::new(doc! {})).await.unwrap();
        users.get_many(GetOptions::new(doc! {})).await.unwrap();
        assert_eq!(direct.calls(), 3);
    }
}
