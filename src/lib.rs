//! docquery-cache - Transparent result cache for MongoDB reads
//!
//! Caches the results of finds and aggregations in Redis (or memory) under
//! keys derived from the query itself, and flushes them by entity.
//!
//! ## Architecture
//!
//! - `query` - Query descriptors and per-call cache directives
//! - `cache` - Key derivation, backends, connection lifecycle, decision engine
//! - `executor` - Executor seam, caching decorator and one-time installation
//! - `database` - MongoDB connection and the direct executor
//! - `model` - Entity-level query builders
//! - `http` - Axum routes over the caching executor
//! - `config` - Environment configuration

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod http;
pub mod model;
pub mod query;

#[cfg(test)]
mod testing;

pub use error::{QueryError, QueryResult};
