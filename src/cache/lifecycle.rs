//! Backend connectivity state machine.
//!
//! ```text
//!  Disconnected --connected--> Connected --error--> Failed
//!       ^                          ^                  |
//!       |                          +----reconnect-----+
//!       +----------ended-----------+------ended-------+
//! ```
//!
//! Caching is honored only in `Connected`. Every other state is
//! pass-through: queries run directly and invalidation reports "no cache".
//! State is only mutated in response to backend events. While `Failed`, a
//! background task retries `connect` with exponential backoff.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::backend::{BackendEvent, CacheBackend};

/// Backend connectivity as seen by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Failed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Failed,
            _ => Self::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connected => 1,
            Self::Failed => 2,
        }
    }
}

/// Backoff between reconnect attempts after a backend error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(2).min(self.max_delay)
    }
}

/// Tracks backend connectivity and switches caching on and off.
pub struct ConnectionManager {
    backend: Arc<dyn CacheBackend>,
    state: AtomicU8,
    policy: ReconnectPolicy,
    me: Weak<Self>,
    listener: OnceLock<JoinHandle<()>>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Arc<Self> {
        Self::with_reconnect(backend, ReconnectPolicy::default())
    }

    pub fn with_reconnect(backend: Arc<dyn CacheBackend>, policy: ReconnectPolicy) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            backend,
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            policy,
            me: me.clone(),
            listener: OnceLock::new(),
            reconnect: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether cache directives are currently honored.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Start listening for backend events and connect if not connected.
    ///
    /// Safe to call repeatedly: the event listener is spawned once and an
    /// already connected backend is left untouched.
    pub async fn install(self: &Arc<Self>) -> ConnectionState {
        self.listener.get_or_init(|| self.spawn_listener());

        if self.is_connected() {
            return ConnectionState::Connected;
        }

        match self.backend.connect().await {
            Ok(()) => self.handle_event(BackendEvent::Connected).await,
            Err(err) => self.handle_event(BackendEvent::Error(err.to_string())).await,
        }

        self.state()
    }

    /// Apply one backend event.
    pub async fn handle_event(&self, event: BackendEvent) {
        let name = self.backend.name();

        match event {
            BackendEvent::Connected => {
                if self.transition(ConnectionState::Connected) != ConnectionState::Connected {
                    info!("Cache backend '{}' connected, caching enabled", name);
                }
            }
            BackendEvent::Error(reason) => {
                if self.transition(ConnectionState::Failed) == ConnectionState::Failed {
                    return;
                }
                error!("Cache backend '{}' error: {}, caching disabled", name, reason);

                if let Err(err) = self.backend.disconnect().await {
                    warn!("Failed to tear down cache backend '{}': {}", name, err);
                }
                self.schedule_reconnect();
            }
            BackendEvent::Ended => {
                if self.transition(ConnectionState::Disconnected) != ConnectionState::Disconnected {
                    info!("Cache backend '{}' connection ended, caching disabled", name);
                }
            }
        }
    }

    /// Retry `connect` until it succeeds or the state leaves `Failed`.
    fn schedule_reconnect(&self) {
        let mut slot = self.reconnect.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let manager = self.me.clone();
        let policy = self.policy;
        *slot = Some(tokio::spawn(async move {
            let mut delay = policy.initial_delay;
            loop {
                tokio::time::sleep(delay).await;

                let Some(manager) = manager.upgrade() else {
                    return;
                };
                if manager.state() != ConnectionState::Failed {
                    return;
                }

                match manager.backend.connect().await {
                    Ok(()) => {
                        manager.handle_event(BackendEvent::Connected).await;
                        return;
                    }
                    Err(err) => {
                        delay = policy.next_delay(delay);
                        warn!(
                            "Reconnect to cache backend '{}' failed: {}, retrying in {:?}",
                            manager.backend.name(),
                            err,
                            delay
                        );
                    }
                }
            }
        }));
    }

    /// Store `next`, returning the previous state.
    fn transition(&self, next: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.state.swap(next.as_u8(), Ordering::SeqCst))
    }

    fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.backend.subscribe();
        let manager: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Dropped {} cache backend events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                match manager.upgrade() {
                    Some(manager) => manager.handle_event(event).await,
                    None => break,
                }
            }
        })
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get() {
            listener.abort();
        }
        if let Some(reconnect) = self.reconnect.lock().take() {
            reconnect.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .field("policy", &self.policy)
            .finish()
    }
}
