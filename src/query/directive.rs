//! Per-call cache configuration.

use crate::cache::{derive_key, CacheKey};

use super::QueryDescriptor;

/// Cache settings a caller attaches to one pending query.
///
/// A directive is consumed at execution time. The key it resolves to is
/// memoized, so executing twice with the same directive derives it once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDirective {
    pub enabled: bool,
    /// Used verbatim instead of a derived key.
    pub explicit_key: Option<String>,
    /// Expiry in seconds. `None` falls back to the configured default.
    pub ttl_seconds: Option<u64>,
    resolved_key: Option<CacheKey>,
}

impl CacheDirective {
    /// A directive that leaves the query uncached.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Mark the query cacheable with an optional explicit key and TTL.
    pub fn cached(key: Option<String>, ttl_seconds: Option<u64>) -> Self {
        Self {
            enabled: true,
            explicit_key: key,
            ttl_seconds,
            resolved_key: None,
        }
    }

    /// Resolve the cache key for `descriptor`, deriving it on first use.
    pub fn resolve_key(&mut self, descriptor: &QueryDescriptor) -> &CacheKey {
        let explicit = self.explicit_key.as_deref();
        self.resolved_key.get_or_insert_with(|| match explicit {
            Some(key) => CacheKey::from(key),
            None => derive_key(descriptor),
        })
    }

    /// Key resolved by a previous call to [`resolve_key`](Self::resolve_key).
    pub fn resolved_key(&self) -> Option<&CacheKey> {
        self.resolved_key.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_explicit_key_used_verbatim() {
        let descriptor = QueryDescriptor::find("User", doc! { "id": 1 });
        let mut directive = CacheDirective::cached(Some("users:first".to_string()), None);

        assert_eq!(directive.resolve_key(&descriptor).as_str(), "users:first");
    }

    #[test]
    fn test_resolved_key_is_memoized() {
        let first = QueryDescriptor::find("User", doc! { "id": 1 });
        let second = QueryDescriptor::find("User", doc! { "id": 2 });
        let mut directive = CacheDirective::cached(None, None);

        let key = directive.resolve_key(&first).clone();
        assert_eq!(directive.resolve_key(&second), &key);
        assert_eq!(directive.resolved_key(), Some(&key));
    }

    #[test]
    fn test_disabled_default() {
        let directive = CacheDirective::disabled();
        assert!(!directive.enabled);
        assert!(directive.explicit_key.is_none());
        assert!(directive.ttl_seconds.is_none());
    }
}
