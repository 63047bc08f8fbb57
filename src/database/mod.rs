//! Database module exports.

mod executor;
mod mongo;

pub use executor::MongoExecutor;
pub use mongo::Database;
