//! Cache module - result caching in front of document queries.
//!
//! ## Architecture
//!
//! - `key` - Deterministic cache keys derived from query descriptors
//! - `backend` - Key-value store interface (`memory`, `redis_store` implementations)
//! - `lifecycle` - Connection state machine gating cache use
//! - `engine` - Get-or-execute-and-store decision logic
//! - `invalidate` - Wildcard bulk invalidation
//!
//! ## Usage
//!
//! ```rust,ignore
//! let connection = ConnectionManager::new(Arc::new(MemoryBackend::default()));
//! connection.install().await;
//!
//! let engine = CacheEngine::new(connection.clone(), CacheOptions::default());
//! let result = engine
//!     .execute_with_cache(&descriptor, &mut directive, || executor.execute(&descriptor))
//!     .await?;
//! ```

mod backend;
mod codec;
mod config;
mod engine;
mod invalidate;
mod key;
mod lifecycle;
mod memory;
mod redis_store;
mod stats;

pub use backend::{BackendError, BackendEvent, BackendResult, CacheBackend};
pub use codec::{decode_entry, deserialize, serialize};
pub use config::CacheOptions;
pub use engine::CacheEngine;
pub use invalidate::{FlushOutcome, WildcardInvalidator};
pub use key::{derive_key, entity_pattern, CacheKey, KEY_SEPARATOR};
pub use lifecycle::{ConnectionManager, ConnectionState, ReconnectPolicy};
pub use memory::{key_pattern, MemoryBackend};
pub use redis_store::{RedisBackend, RedisConfig};
pub use stats::{CacheStats, StatsSnapshot};
