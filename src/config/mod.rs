//! Configuration module for docquery-cache.
//!
//! Loads configuration from environment variables.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::cache::{CacheOptions, ReconnectPolicy, RedisConfig};

/// Which cache store backs the engine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Redis,
    Memory,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // MongoDB
    pub mongodb_uri: String,
    pub mongodb_database: String,

    // Cache
    pub backend: BackendKind,
    pub redis: RedisConfig,
    /// Maximum entries held by the in-memory backend.
    pub memory_capacity: u64,
    pub cache: CacheOptions,
    /// Backoff used to reconnect after a backend error.
    pub reconnect: ReconnectPolicy,

    // HTTP
    pub http_bind: SocketAddr,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Fails if `MONGODB_URI` is missing or a value cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mongodb_uri = var("MONGODB_URI").context("MONGODB_URI must be set")?;
        let mongodb_database = var("MONGODB_DATABASE").unwrap_or_else(|| "docquery".to_string());

        let backend = match var("CACHE_BACKEND").map(|v| v.to_lowercase()).as_deref() {
            None | Some("redis") => BackendKind::Redis,
            Some("memory") => BackendKind::Memory,
            Some(other) => bail!("CACHE_BACKEND must be 'redis' or 'memory', got '{other}'"),
        };

        let defaults = RedisConfig::default();
        let redis = RedisConfig {
            url: var("REDIS_URL").unwrap_or(defaults.url),
            connect_timeout: parse_secs(&var, "REDIS_CONNECT_TIMEOUT_SECS")?
                .unwrap_or(defaults.connect_timeout),
            response_timeout: parse_secs(&var, "REDIS_RESPONSE_TIMEOUT_SECS")?
                .unwrap_or(defaults.response_timeout),
        };

        let memory_capacity = match var("CACHE_MEMORY_CAPACITY") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("CACHE_MEMORY_CAPACITY is not a number: {raw}"))?,
            None => 10_000,
        };

        let mut cache = CacheOptions::default()
            .debug(parse_flag(var("CACHE_DEBUG")))
            .single_flight(parse_flag(var("CACHE_SINGLE_FLIGHT")));
        if let Some(raw) = var("CACHE_DEFAULT_EXPIRE") {
            let secs = raw
                .parse::<u64>()
                .with_context(|| format!("CACHE_DEFAULT_EXPIRE is not a number: {raw}"))?;
            cache = cache.default_expire(secs);
        }

        let retry = ReconnectPolicy::default();
        let reconnect = ReconnectPolicy {
            initial_delay: parse_number(&var, "CACHE_RECONNECT_MIN_MS")?
                .map(Duration::from_millis)
                .unwrap_or(retry.initial_delay),
            max_delay: parse_secs(&var, "CACHE_RECONNECT_MAX_SECS")?.unwrap_or(retry.max_delay),
        };
        if reconnect.initial_delay.is_zero() || reconnect.initial_delay > reconnect.max_delay {
            bail!("CACHE_RECONNECT_MIN_MS must be positive and not exceed CACHE_RECONNECT_MAX_SECS");
        }

        let http_bind = var("HTTP_BIND")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("HTTP_BIND must be a socket address")?;

        Ok(Self {
            mongodb_uri,
            mongodb_database,
            backend,
            redis,
            memory_capacity,
            cache,
            reconnect,
            http_bind,
        })
    }
}

fn parse_number(var: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<u64>> {
    var(name)
        .map(|raw| {
            raw.parse::<u64>()
                .with_context(|| format!("{name} is not a number: {raw}"))
        })
        .transpose()
}

fn parse_secs(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> anyhow::Result<Option<Duration>> {
    Ok(parse_number(var, name)?.map(Duration::from_secs))
}

fn parse_flag(value: Option<String>) -> bool {
    matches!(
        value.map(|v| v.to_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}
