//! Query descriptors and per-call cache directives.
//!
//! A [`QueryDescriptor`] is an immutable snapshot of a read operation, either
//! a filtered find or an aggregation pipeline. A [`CacheDirective`] is the
//! per-call cache configuration a caller attaches before execution.

mod descriptor;
mod directive;

pub use descriptor::{QueryDescriptor, QueryShape};
pub use directive::CacheDirective;
