//! Sync transport abstraction.
//!
//! The transport carries one diff to the server and returns the server's
//! answer. It is responsible only for the round trip; applying the answer
//! to the store is the sync engine's job.

use futures::future::BoxFuture;
use jam_core::{CommitResponse, Diff, DiffOperation};
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;

use crate::error::{EngineError, EngineResult};
use crate::view::FetchError;

/// Transport for submitting diffs to the server.
pub trait SyncTransport: Send + Sync {
    /// Sends a diff and returns the server's response.
    fn commit(&self, diff: &Diff) -> impl Future<Output = EngineResult<CommitResponse>> + Send;
}

/// Function posting an atomic operations document and returning the result
/// document.
pub type AtomicFn =
    Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value, FetchError>> + Send + Sync>;

/// Transport speaking JSON:API Atomic Operations through a caller-supplied
/// function.
pub struct AtomicTransport {
    post: AtomicFn,
}

impl AtomicTransport {
    /// Wraps a posting function.
    pub fn new<F, Fut>(post: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        Self {
            post: Box::new(move |body| Box::pin(post(body))),
        }
    }
}

impl SyncTransport for AtomicTransport {
    async fn commit(&self, diff: &Diff) -> EngineResult<CommitResponse> {
        let results = (self.post)(diff.to_document())
            .await
            .map_err(|e| EngineError::transport_retryable(e.to_string()))?;
        CommitResponse::from_atomic_results(diff, &results)
            .map_err(|e| EngineError::transport_fatal(format!("unusable atomic results: {e}")))
    }
}

#[derive(Debug, Default)]
struct MockState {
    received: Vec<Diff>,
    next_id: u64,
    failures: u32,
}

/// In-memory transport for tests.
///
/// Assigns sequential server ids to resources added under temporary
/// identifiers and records every diff it accepts.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` round trips fail with a retryable error.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().failures = count;
    }

    /// Returns the diffs accepted so far.
    pub fn received(&self) -> Vec<Diff> {
        self.state.lock().received.clone()
    }

    fn respond(&self, diff: &Diff) -> EngineResult<CommitResponse> {
        let mut state = self.state.lock();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(EngineError::transport_retryable("injected failure"));
        }

        let mut response = CommitResponse::acknowledge(diff);
        for op in &diff.operations {
            if let DiffOperation::Add { entity } = op {
                if !entity.identifier.is_temporary(diff.temporary_prefix()) {
                    continue;
                }
                state.next_id += 1;
                response = response
                    .with_assigned_id(entity.identifier.clone(), state.next_id.to_string());
            }
        }
        state.received.push(diff.clone());
        Ok(response)
    }
}

impl SyncTransport for MockTransport {
    async fn commit(&self, diff: &Diff) -> EngineResult<CommitResponse> {
        self.respond(diff)
    }
}
