//! Mutation serializer.
//!
//! A single task owns every write to the store. Write intents are queued on
//! a bounded channel and handled strictly one at a time in arrival order:
//! read the current snapshot, apply the intent to a copy, publish the copy.
//! A failed intent publishes nothing.

use jam_core::{CommitResponse, Document, Overlay, SnapshotVersion};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::events::{RequestId, StoreEvent, WriteIntent};
use crate::store::AppStore;

#[derive(Debug)]
struct Envelope {
    request: RequestId,
    intent: WriteIntent,
    reply: oneshot::Sender<EngineResult<SnapshotVersion>>,
}

/// Pending outcome of a dispatched write intent.
#[derive(Debug)]
pub struct Ack {
    request: RequestId,
    rx: oneshot::Receiver<EngineResult<SnapshotVersion>>,
}

impl Ack {
    /// Returns the id assigned to the intent.
    pub fn request(&self) -> RequestId {
        self.request
    }

    /// Waits until the intent has been applied.
    ///
    /// Returns the version of the snapshot the intent produced.
    pub async fn wait(self) -> EngineResult<SnapshotVersion> {
        self.rx.await.map_err(|_| EngineError::SerializerClosed)?
    }
}

/// Handle for submitting write intents.
#[derive(Clone, Debug)]
pub struct SerializerHandle {
    tx: mpsc::Sender<Envelope>,
    next_request: Arc<AtomicU64>,
}

impl SerializerHandle {
    /// Enqueues an intent without waiting for it to be applied.
    ///
    /// Waits only for queue capacity. Intents dispatched from one task are
    /// applied in dispatch order.
    pub async fn dispatch(&self, intent: WriteIntent) -> EngineResult<Ack> {
        let request = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed) + 1);
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                intent,
                reply,
            })
            .await
            .map_err(|_| EngineError::SerializerClosed)?;
        Ok(Ack { request, rx })
    }

    /// Enqueues an intent and waits until it has been applied.
    pub async fn submit(&self, intent: WriteIntent) -> EngineResult<SnapshotVersion> {
        self.dispatch(intent).await?.wait().await
    }

    /// Opens a named transaction.
    pub async fn start_transaction(&self, name: impl Into<String>) -> EngineResult<SnapshotVersion> {
        self.submit(WriteIntent::StartTransaction { name: name.into() })
            .await
    }

    /// Replaces a transaction's overlay.
    pub async fn save_transaction(
        &self,
        name: impl Into<String>,
        overlay: Overlay,
    ) -> EngineResult<SnapshotVersion> {
        self.submit(WriteIntent::SaveTransaction {
            name: name.into(),
            overlay,
        })
        .await
    }

    /// Discards a transaction.
    pub async fn abort_transaction(&self, name: impl Into<String>) -> EngineResult<SnapshotVersion> {
        self.submit(WriteIntent::AbortTransaction { name: name.into() })
            .await
    }

    /// Merges a transaction into its parent.
    pub async fn commit_transaction(
        &self,
        name: impl Into<String>,
    ) -> EngineResult<SnapshotVersion> {
        self.submit(WriteIntent::CommitTransaction { name: name.into() })
            .await
    }

    /// Seals pending changes into a change set.
    pub async fn commit(&self) -> EngineResult<SnapshotVersion> {
        self.submit(WriteIntent::Commit).await
    }

    /// Applies a server response to the diff in flight.
    pub async fn post_commit_diff(&self, response: CommitResponse) -> EngineResult<SnapshotVersion> {
        self.submit(WriteIntent::PostCommitDiff { response }).await
    }

    /// Loads a batch of JSON:API documents.
    pub async fn load_json(&self, documents: Vec<Document>) -> EngineResult<SnapshotVersion> {
        self.submit(WriteIntent::LoadJson { documents }).await
    }

    /// Resets the store.
    pub async fn clear(&self) -> EngineResult<SnapshotVersion> {
        self.submit(WriteIntent::Clear).await
    }

    /// Returns true once the serializer has stopped accepting intents.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Running serializer task.
///
/// Dropping this stops the serializer after it drains queued intents.
#[derive(Debug)]
pub struct SerializerTask {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl SerializerTask {
    /// Stops accepting intents, drains the queue and waits for the task.
    pub async fn shutdown(self) -> EngineResult<()> {
        // The task may already be gone.
        let _ = self.shutdown.send(());
        self.join
            .await
            .map_err(|e| EngineError::TaskFailed(e.to_string()))
    }
}

/// The single consumer of write intents.
pub struct MutationSerializer {
    store: AppStore,
    rx: mpsc::Receiver<Envelope>,
    shutdown: oneshot::Receiver<()>,
}

impl MutationSerializer {
    /// Spawns the serializer on the current tokio runtime.
    pub fn spawn(store: AppStore, capacity: usize) -> (SerializerHandle, SerializerTask) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown) = oneshot::channel();
        let serializer = Self {
            store,
            rx,
            shutdown,
        };
        let join = tokio::spawn(serializer.run());
        let handle = SerializerHandle {
            tx,
            next_request: Arc::new(AtomicU64::new(0)),
        };
        (
            handle,
            SerializerTask {
                shutdown: shutdown_tx,
                join,
            },
        )
    }

    async fn run(mut self) {
        debug!("mutation serializer started");
        loop {
            tokio::select! {
                envelope = self.rx.recv() => match envelope {
                    Some(envelope) => self.handle(envelope),
                    None => break,
                },
                _ = &mut self.shutdown => {
                    self.rx.close();
                    while let Some(envelope) = self.rx.recv().await {
                        self.handle(envelope);
                    }
                    break;
                }
            }
        }
        debug!("mutation serializer stopped");
    }

    fn handle(&self, envelope: Envelope) {
        let Envelope {
            request,
            intent,
            reply,
        } = envelope;
        debug!(%request, kind = intent.kind(), "applying write intent");

        let mut next = (*self.store.db()).clone();
        let outcome = match intent.apply(&mut next) {
            Ok(()) => {
                let version = self.store.publish(next, request);
                if let Some(ack) = intent.acknowledgement(request) {
                    self.store.emit(ack);
                }
                Ok(version)
            }
            Err(e) => {
                warn!(%request, kind = intent.kind(), error = %e, "write intent failed");
                self.store.emit(StoreEvent::WriteFailed {
                    request,
                    errors: e.to_string(),
                });
                Err(EngineError::from(e))
            }
        };
        // The submitter may have stopped waiting.
        let _ = reply.send(outcome);
    }
}
