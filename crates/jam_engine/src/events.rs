//! Write intents and store events.
//!
//! Every mutation of the store is expressed as a [`WriteIntent`] and handed
//! to the mutation serializer. Everything observable about the store's
//! progress is published as a [`StoreEvent`] on the store's event bus:
//!
//! - acknowledgements of applied writes
//! - view load lifecycle
//! - sync lifecycle

use jam_core::{CommitResponse, CoreResult, Db, Document, Overlay, SnapshotVersion};
use std::collections::BTreeMap;
use std::fmt;

use crate::view::{Meta, ViewResult};

/// Identifies one envelope submitted to the serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Returns the raw id value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req:{}", self.0)
    }
}

/// A request to mutate the store.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteIntent {
    /// Open a named transaction.
    StartTransaction {
        /// Transaction name.
        name: String,
    },
    /// Replace a transaction's overlay.
    SaveTransaction {
        /// Transaction name.
        name: String,
        /// New overlay contents.
        overlay: Overlay,
    },
    /// Discard a transaction and everything nested inside it.
    AbortTransaction {
        /// Transaction name.
        name: String,
    },
    /// Merge a transaction into its parent.
    CommitTransaction {
        /// Transaction name.
        name: String,
    },
    /// Seal pending changes into a change set.
    Commit,
    /// Apply the server's answer to the diff in flight.
    PostCommitDiff {
        /// Server response.
        response: CommitResponse,
    },
    /// Merge a batch of JSON:API documents.
    LoadJson {
        /// Documents to load, in order.
        documents: Vec<Document>,
    },
    /// Reset the store to empty.
    Clear,
}

impl WriteIntent {
    /// Short name of the intent kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WriteIntent::StartTransaction { .. } => "start_transaction",
            WriteIntent::SaveTransaction { .. } => "save_transaction",
            WriteIntent::AbortTransaction { .. } => "abort_transaction",
            WriteIntent::CommitTransaction { .. } => "commit_transaction",
            WriteIntent::Commit => "commit",
            WriteIntent::PostCommitDiff { .. } => "post_commit_diff",
            WriteIntent::LoadJson { .. } => "load_json",
            WriteIntent::Clear => "clear",
        }
    }

    /// Applies the intent to a store.
    ///
    /// On error the store may be partially modified; callers apply intents
    /// to a scratch copy.
    pub fn apply(&self, db: &mut Db) -> CoreResult<()> {
        match self {
            WriteIntent::StartTransaction { name } => db.start_transaction(name),
            WriteIntent::SaveTransaction { name, overlay } => {
                db.save_transaction(name, overlay.clone())
            }
            WriteIntent::AbortTransaction { name } => db.abort_transaction(name),
            WriteIntent::CommitTransaction { name } => db.commit_transaction(name),
            WriteIntent::Commit => {
                db.commit();
                Ok(())
            }
            WriteIntent::PostCommitDiff { response } => db.post_commit_diff(response),
            WriteIntent::LoadJson { documents } => db.load_documents(documents).map(|_| ()),
            WriteIntent::Clear => {
                db.clear();
                Ok(())
            }
        }
    }

    /// The acknowledgement published after this intent is applied, if any.
    pub(crate) fn acknowledgement(&self, request: RequestId) -> Option<StoreEvent> {
        match self {
            WriteIntent::LoadJson { .. } => Some(StoreEvent::LoadJsonDone { request }),
            WriteIntent::PostCommitDiff { .. } => Some(StoreEvent::PostCommitDiffDone { request }),
            _ => None,
        }
    }
}

/// Events published on the store's event bus.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A write was applied and a new snapshot published.
    SnapshotPublished {
        /// Request that produced the snapshot.
        request: RequestId,
        /// Version of the new snapshot.
        version: SnapshotVersion,
    },
    /// A write failed and the snapshot was left unchanged.
    WriteFailed {
        /// Request that failed.
        request: RequestId,
        /// Error message.
        errors: String,
    },
    /// A `LoadJson` intent was applied.
    LoadJsonDone {
        /// Request that carried the documents.
        request: RequestId,
    },
    /// A `PostCommitDiff` intent was applied.
    PostCommitDiffDone {
        /// Request that carried the response.
        request: RequestId,
    },
    /// A view load started.
    LoadViewRequest {
        /// View name.
        name: String,
    },
    /// A view load completed.
    LoadViewSuccess {
        /// View name.
        name: String,
        /// Per-query identifiers.
        results: BTreeMap<String, ViewResult>,
        /// Per-query metadata for collection results.
        meta: BTreeMap<String, Meta>,
    },
    /// A view load failed.
    LoadViewFailure {
        /// View name.
        name: String,
        /// Error message.
        errors: String,
    },
    /// A sync run started.
    SyncRequest,
    /// A sync run drained every pending diff.
    SyncSuccess,
    /// A sync run failed.
    SyncFailure {
        /// Error message.
        errors: String,
    },
}
