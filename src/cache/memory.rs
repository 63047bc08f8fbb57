//! In-process cache backend built on Moka.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use glob::{Pattern, PatternError};
use moka::sync::Cache;
use moka::Expiry;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::backend::{BackendError, BackendEvent, BackendResult, CacheBackend};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// A stored value and the TTL attached to it, if any.
#[derive(Clone)]
struct StoredValue {
    bytes: Arc<[u8]>,
    ttl: Option<Duration>,
}

/// Per-entry expiry: each insert restarts the clock with the value's own TTL.
struct EntryExpiry;

impl Expiry<String, StoredValue> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// In-memory key-value backend with Redis-like semantics.
///
/// Useful for single-node deployments and tests. The backend starts
/// offline; [`connect`](CacheBackend::connect) brings it online.
pub struct MemoryBackend {
    inner: Cache<String, StoredValue>,
    online: AtomicBool,
    events: broadcast::Sender<BackendEvent>,
}

impl MemoryBackend {
    /// Create a backend holding at most `max_capacity` entries.
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner,
            online: AtomicBool::new(false),
            events,
        }
    }

    /// Drop the connection as if the store became unreachable.
    ///
    /// Stored entries are kept and become visible again after [`resume`](Self::resume).
    pub fn interrupt(&self, reason: &str) {
        self.online.store(false, Ordering::SeqCst);
        let _ = self.events.send(BackendEvent::Error(reason.to_string()));
    }

    /// Report the connection as closed by the remote side.
    pub fn end(&self) {
        self.online.store(false, Ordering::SeqCst);
        let _ = self.events.send(BackendEvent::Ended);
    }

    /// Bring an interrupted backend back online.
    pub fn resume(&self) {
        self.online.store(true, Ordering::SeqCst);
        let _ = self.events.send(BackendEvent::Connected);
    }

    fn ensure_online(&self) -> BackendResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::NotConnected)
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        self.ensure_online()?;
        Ok(self.inner.get(key).map(|value| value.bytes.to_vec()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        self.ensure_online()?;
        self.inner.insert(
            key.to_string(),
            StoredValue {
                bytes: Arc::from(value),
                ttl: None,
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: u64) -> BackendResult<bool> {
        self.ensure_online()?;
        match self.inner.get(key) {
            Some(existing) => {
                self.inner.insert(
                    key.to_string(),
                    StoredValue {
                        bytes: existing.bytes,
                        ttl: Some(Duration::from_secs(seconds)),
                    },
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> BackendResult<bool> {
        self.ensure_online()?;
        Ok(self.inner.remove(key).is_some())
    }

    async fn keys(&self, pattern: &str) -> BackendResult<Vec<String>> {
        self.ensure_online()?;
        let pattern = key_pattern(pattern)?;
        let keys = self
            .inner
            .iter()
            .map(|(key, _)| key.as_ref().clone())
            .filter(|key| pattern.matches(key))
            .collect();
        Ok(keys)
    }

    async fn connect(&self) -> BackendResult<()> {
        self.online.store(true, Ordering::SeqCst);
        info!("In-memory cache backend ready");
        Ok(())
    }

    async fn disconnect(&self) -> BackendResult<()> {
        self.online.store(false, Ordering::SeqCst);
        debug!("In-memory cache backend closed");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("online", &self.online.load(Ordering::SeqCst))
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

/// Compile a Redis `KEYS` pattern.
///
/// Supports `*`, `?`, `[abc]`, `[^a]`, `[a-z]` and `\x` escapes. Runs of `*`
/// collapse into one.
pub fn key_pattern(pattern: &str) -> Result<Pattern, PatternError> {
    let mut glob = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut after_star = false;

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if !after_star {
                    glob.push('*');
                }
                after_star = true;
                continue;
            }
            '?' => glob.push('?'),
            '\\' => push_literal(&mut glob, chars.next().unwrap_or('\\')),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'^') {
                    chars.next();
                    class.push('!');
                }
                while let Some(member) = chars.next() {
                    match member {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                class.push(escaped);
                            }
                        }
                        _ => class.push(member),
                    }
                }

                if closed {
                    glob.push('[');
                    glob.push_str(&class);
                    glob.push(']');
                } else {
                    push_literal(&mut glob, '[');
                    for member in class.chars() {
                        push_literal(&mut glob, member);
                    }
                }
            }
            other => push_literal(&mut glob, other),
        }
        after_star = false;
    }

    Pattern::new(&glob)
}

fn push_literal(glob: &mut String, c: char) {
    let mut buf = [0; 4];
    glob.push_str(&Pattern::escape(c.encode_utf8(&mut buf)));
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn online() -> MemoryBackend {
        let backend = MemoryBackend::default();
        backend.connect().await.unwrap();
        backend
    }

    fn matches(pattern: &str, key: &str) -> bool {
        key_pattern(pattern).unwrap().matches(key)
    }

    #[test]
    fn test_key_pattern_wildcards() {
        assert!(matches("User_*", "User_{\"query\":{}}"));
        assert!(matches("*", ""));
        assert!(matches("U?er_*", "User_x"));
        assert!(matches("*_1", "Order_1"));
        assert!(matches("a*b*c", "axxbyyc"));
        assert!(matches("a**b", "axxb"));
        assert!(matches("User_*", r#"User_{"query":{"name":"/^A/i"}}"#));
        assert!(!matches("User_*", "Order_{}"));
        assert!(!matches("User_*", "User"));
        assert!(!matches("a*b", "axxbyy"));
    }

    #[test]
    fn test_key_pattern_escapes() {
        assert!(matches("\\*lit", "*lit"));
        assert!(!matches("\\*lit", "xlit"));
        assert!(matches("\\[x\\]", "[x]"));
        assert!(matches("open[", "open["));
    }

    #[test]
    fn test_key_pattern_classes() {
        assert!(matches("Order_[12]", "Order_1"));
        assert!(matches("Order_[12]", "Order_2"));
        assert!(!matches("Order_[12]", "Order_3"));
        assert!(matches("Order_[^1]", "Order_3"));
        assert!(!matches("Order_[^1]", "Order_1"));
        assert!(matches("Order_[a-c]*", "Order_b{}"));
        assert!(!matches("Order_[a-c]*", "Order_d{}"));
    }

    #[tokio::test]
    async fn test_offline_backend_rejects_calls() {
        let backend = MemoryBackend::default();
        assert!(matches!(backend.get("k").await, Err(BackendError::NotConnected)));
        assert!(matches!(backend.set("k", b"v").await, Err(BackendError::NotConnected)));
    }

    #[tokio::test]
    async fn test_set_get_del() {
        let backend = online().await;

        backend.set("k", b"value").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"value".to_vec()));

        assert!(backend.del("k").await.unwrap());
        assert!(!backend.del("k").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expire_after_set() {
        let backend = online().await;

        backend.set("short", b"[]").await.unwrap();
        assert!(backend.expire("short", 1).await.unwrap());
        assert!(!backend.expire("missing", 1).await.unwrap());
        assert!(backend.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(backend.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_clears_expiry() {
        let backend = online().await;

        backend.set("k", b"[1]").await.unwrap();
        backend.expire("k", 1).await.unwrap();
        backend.set("k", b"[2]").await.unwrap();

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(backend.get("k").await.unwrap(), Some(b"[2]".to_vec()));
    }

    #[tokio::test]
    async fn test_keys_by_pattern() {
        let backend = online().await;

        backend.set("Order_1", b"[]").await.unwrap();
        backend.set("Order_2", b"[]").await.unwrap();
        backend.set("User_1", b"[]").await.unwrap();

        let mut keys = backend.keys("Order_*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["Order_1".to_string(), "Order_2".to_string()]);

        assert_eq!(backend.keys("Order_[1]").await.unwrap(), vec!["Order_1".to_string()]);
        assert!(matches!(
            backend.keys("Order_[]").await,
            Err(BackendError::InvalidPattern(_))
        ));
    }

    #[tokio::test]
    async fn test_interrupt_emits_error() {
        let backend = online().await;
        let mut events = backend.subscribe();

        backend.interrupt("socket closed");
        assert_eq!(
            events.recv().await.unwrap(),
            BackendEvent::Error("socket closed".to_string())
        );
        assert!(backend.get("k").await.is_err());

        backend.resume();
        assert_eq!(events.recv().await.unwrap(), BackendEvent::Connected);
        assert!(backend.get("k").await.is_ok());
    }
}
