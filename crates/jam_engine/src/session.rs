//! Session lifetime.
//!
//! A [`Session`] owns one store and its mutation serializer. Starting a
//! session spawns the serializer; shutting it down drains queued writes and
//! joins the task.

use jam_core::Db;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::serializer::{MutationSerializer, SerializerHandle, SerializerTask};
use crate::store::AppStore;
use crate::sync::SyncEngine;
use crate::transport::SyncTransport;
use crate::view::{View, ViewLoader, ViewOutcome, ViewRequest};

/// A running store.
#[derive(Debug)]
pub struct Session {
    config: EngineConfig,
    store: AppStore,
    serializer: SerializerHandle,
    views: ViewLoader,
    task: SerializerTask,
}

impl Session {
    /// Starts a session with an empty store.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: EngineConfig) -> Self {
        let db = Db::with_config(config.core.clone());
        Self::with_db(config, db)
    }

    /// Starts a session around an existing store.
    pub fn with_db(config: EngineConfig, db: Db) -> Self {
        let store = AppStore::new(db, config.event_capacity);
        let (serializer, task) = MutationSerializer::spawn(store.clone(), config.queue_capacity);
        let views = ViewLoader::new(store.clone(), serializer.clone());
        info!(queue_capacity = config.queue_capacity, "session started");
        Self {
            config,
            store,
            serializer,
            views,
            task,
        }
    }

    /// Gets the store.
    pub fn store(&self) -> &AppStore {
        &self.store
    }

    /// Gets the serializer handle.
    pub fn serializer(&self) -> &SerializerHandle {
        &self.serializer
    }

    /// Gets the view loader.
    pub fn views(&self) -> &ViewLoader {
        &self.views
    }

    /// Loads a view.
    pub async fn load_view(&self, request: ViewRequest) -> ViewOutcome {
        self.views.load_view(request).await
    }

    /// Drops a view's cached results.
    pub fn clear_view(&self, name: &str) -> Option<View> {
        self.views.clear_view(name)
    }

    /// Creates a sync engine bound to this session.
    pub fn sync_engine<T: SyncTransport>(&self, transport: T) -> SyncEngine<T> {
        SyncEngine::new(
            self.config.retry.clone(),
            transport,
            self.store.clone(),
            self.serializer.clone(),
        )
    }

    /// Stops the session.
    ///
    /// Writes already queued are applied; later submissions fail with
    /// [`EngineError::SerializerClosed`](crate::EngineError::SerializerClosed).
    pub async fn shutdown(self) -> EngineResult<()> {
        self.task.shutdown().await?;
        info!(version = %self.store.version(), "session stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::transport::MockTransport;

    #[tokio::test]
    async fn start_and_shutdown() {
        let session = Session::start(EngineConfig::default());
        session.serializer().start_transaction("edit").await.unwrap();
        assert_eq!(session.store().db().transaction_names(), vec!["edit"]);

        let handle = session.serializer().clone();
        session.shutdown().await.unwrap();
        assert!(matches!(
            handle.commit().await,
            Err(EngineError::SerializerClosed)
        ));
    }

    #[tokio::test]
    async fn session_uses_core_config() {
        let config = EngineConfig::default()
            .with_core(jam_core::Config::new().temporary_id_prefix("local-"));
        let session = Session::start(config);
        assert_eq!(
            session.store().db().config().temporary_id_prefix,
            "local-"
        );

        let engine = session.sync_engine(MockTransport::new());
        assert!(engine.sync().await.is_ok());
        session.shutdown().await.unwrap();
    }
}
