//! Idempotent installation of the cache around an executor.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use super::{CachingExecutor, QueryExecutor};
use crate::cache::{CacheOptions, ConnectionManager, ConnectionState};

/// Captures the original executor once and (re)connects the backend.
///
/// Calling [`install`](Self::install) again never re-captures: passing an
/// already wrapped executor on a later call cannot hide the original.
pub struct CacheInstaller {
    connection: Arc<ConnectionManager>,
    options: CacheOptions,
    installed: OnceLock<CachingExecutor>,
}

impl CacheInstaller {
    pub fn new(connection: Arc<ConnectionManager>, options: CacheOptions) -> Self {
        Self {
            connection,
            options,
            installed: OnceLock::new(),
        }
    }

    /// Wrap `direct` (first call only) and connect the cache backend.
    pub async fn install(&self, direct: Arc<dyn QueryExecutor>) -> CachingExecutor {
        let mut captured = false;
        let executor = self
            .installed
            .get_or_init(|| {
                captured = true;
                CachingExecutor::new(direct, self.connection.clone(), self.options.clone())
            })
            .clone();

        if !captured {
            debug!("Cache already installed, keeping the original executor");
        }

        let state = self.connection.install().await;
        if state == ConnectionState::Connected {
            info!("Query cache installed");
        } else {
            info!("Query cache installed in pass-through mode ({:?})", state);
        }

        executor
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CacheDirective, QueryDescriptor};
    use crate::testing::{CountingExecutor, RecordingBackend};
    use mongodb::bson::doc;
    use serde_json::json;

    #[tokio::test]
    async fn test_reinstall_keeps_original_executor() {
        let backend = Arc::new(RecordingBackend::new());
        let installer = CacheInstaller::new(
            ConnectionManager::new(backend.clone()),
            CacheOptions::default(),
        );
        let original = Arc::new(CountingExecutor::new(json!([1])));

        let first = installer.install(original.clone()).await;
        // Re-installing over the wrapped executor must not wrap it again.
        let second = installer.install(Arc::new(first.clone())).await;

        second
            .execute(&QueryDescriptor::find("User", doc! {}))
            .await
            .unwrap();
        assert_eq!(original.calls(), 1);
        assert_eq!(backend.connects(), 1);
    }

    #[tokio::test]
    async fn test_install_in_pass_through_mode() {
        let backend = Arc::new(RecordingBackend::new());
        backend.set_failing(true);
        let installer = CacheInstaller::new(
            ConnectionManager::new(backend.clone()),
            CacheOptions::default(),
        );
        let direct = Arc::new(CountingExecutor::new(json!([1])));

        let executor = installer.install(direct.clone()).await;
        let result = executor
            .execute_cached(
                &QueryDescriptor::find("User", doc! {}),
                &mut CacheDirective::cached(None, None),
            )
            .await
            .unwrap();

        assert_eq!(result, json!([1]));
        assert_eq!(installer.connection().state(), ConnectionState::Failed);
        assert_eq!(backend.gets(), 0);
    }
}
