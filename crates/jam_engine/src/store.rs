//! Application store handle.
//!
//! [`AppStore`] holds the current [`Db`] snapshot, the views region and the
//! event bus. Readers take cheap `Arc<Db>` snapshots; only the mutation
//! serializer publishes new ones.

use jam_core::{Db, SnapshotVersion};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::events::{RequestId, StoreEvent};
use crate::view::{View, ViewStatus};

struct Snapshot {
    version: SnapshotVersion,
    db: Arc<Db>,
}

struct Inner {
    snapshot: RwLock<Snapshot>,
    views: RwLock<BTreeMap<String, View>>,
    events: broadcast::Sender<StoreEvent>,
}

/// Shared handle to the application store.
#[derive(Clone)]
pub struct AppStore {
    inner: Arc<Inner>,
}

impl AppStore {
    /// Creates a store around an initial snapshot.
    pub fn new(db: Db, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                snapshot: RwLock::new(Snapshot {
                    version: SnapshotVersion::default(),
                    db: Arc::new(db),
                }),
                views: RwLock::new(BTreeMap::new()),
                events,
            }),
        }
    }

    /// Returns the current snapshot.
    pub fn db(&self) -> Arc<Db> {
        Arc::clone(&self.inner.snapshot.read().db)
    }

    /// Returns the version of the current snapshot.
    pub fn version(&self) -> SnapshotVersion {
        self.inner.snapshot.read().version
    }

    /// Replaces the snapshot and announces it.
    pub(crate) fn publish(&self, db: Db, request: RequestId) -> SnapshotVersion {
        let version = {
            let mut snapshot = self.inner.snapshot.write();
            snapshot.version = snapshot.version.next();
            snapshot.db = Arc::new(db);
            snapshot.version
        };
        self.emit(StoreEvent::SnapshotPublished { request, version });
        version
    }

    /// Subscribes to store events.
    ///
    /// Only events emitted after the call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Applies an event to the views region and broadcasts it.
    pub(crate) fn emit(&self, event: StoreEvent) {
        self.reduce_views(&event);
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }

    fn reduce_views(&self, event: &StoreEvent) {
        match event {
            StoreEvent::LoadViewRequest { name } => {
                let mut views = self.inner.views.write();
                views
                    .entry(name.clone())
                    .or_insert_with(|| View::new(name.clone()))
                    .status = ViewStatus::Requested;
            }
            StoreEvent::LoadViewSuccess {
                name,
                results,
                meta,
            } => {
                let mut views = self.inner.views.write();
                let view = views
                    .entry(name.clone())
                    .or_insert_with(|| View::new(name.clone()));
                view.status = ViewStatus::Loaded;
                view.results = results.clone();
                view.meta = meta.clone();
            }
            StoreEvent::LoadViewFailure { name, errors } => {
                let mut views = self.inner.views.write();
                views
                    .entry(name.clone())
                    .or_insert_with(|| View::new(name.clone()))
                    .status = ViewStatus::Failed {
                    errors: errors.clone(),
                };
            }
            _ => {}
        }
    }

    /// Returns a view by name.
    pub fn view(&self, name: &str) -> Option<View> {
        self.inner.views.read().get(name).cloned()
    }

    /// Returns all views.
    pub fn views(&self) -> BTreeMap<String, View> {
        self.inner.views.read().clone()
    }

    /// Removes a view's cached results.
    pub(crate) fn remove_view(&self, name: &str) -> Option<View> {
        self.inner.views.write().remove(name)
    }
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new(Db::new(), 1024)
    }
}

impl std::fmt::Debug for AppStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppStore")
            .field("version", &self.version())
            .field("views", &self.inner.views.read().len())
            .finish()
    }
}
