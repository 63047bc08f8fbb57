//! Cache behavior options.

/// Options controlling the caching decision engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Log hits, misses and writes at `info` instead of `debug`.
    pub debug: bool,

    /// TTL in seconds applied when a directive does not carry one.
    /// `None` means entries never expire.
    pub default_expire: Option<u64>,

    /// Serialize concurrent misses for the same key so only one of them
    /// runs the underlying query.
    pub single_flight: bool,
}

impl CacheOptions {
    /// Enable verbose hit/miss logging.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the default TTL in seconds. Zero disables it.
    #[must_use]
    pub fn default_expire(mut self, seconds: u64) -> Self {
        self.default_expire = (seconds > 0).then_some(seconds);
        self
    }

    /// Enable per-key coalescing of concurrent misses.
    #[must_use]
    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Resolve the TTL for one execution.
    ///
    /// A directive TTL wins; zero counts as absent.
    pub fn effective_ttl(&self, directive_ttl: Option<u64>) -> Option<u64> {
        directive_ttl
            .filter(|seconds| *seconds > 0)
            .or(self.default_expire)
    }
}
