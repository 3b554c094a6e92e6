//! Sync loop.
//!
//! A sync run drains committed change sets one at a time, oldest first:
//! compute the diff, send it through the transport, then submit the
//! server's response to the mutation serializer and wait for it to be
//! applied before looking at the next diff.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::RetryConfig;
use crate::error::EngineResult;
use crate::events::{StoreEvent, WriteIntent};
use crate::serializer::SerializerHandle;
use crate::store::AppStore;
use crate::transport::SyncTransport;

/// What a finished sync run sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Diffs acknowledged by the server.
    pub diffs: u64,
    /// Operations across those diffs.
    pub operations: u64,
    /// Wall time of the run.
    pub duration: Duration,
}

/// Drains committed changes to the server.
pub struct SyncEngine<T: SyncTransport> {
    retry: RetryConfig,
    transport: Arc<T>,
    store: AppStore,
    serializer: SerializerHandle,
    running: Mutex<()>,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates a new sync engine.
    pub fn new(
        retry: RetryConfig,
        transport: T,
        store: AppStore,
        serializer: SerializerHandle,
    ) -> Self {
        Self {
            retry,
            transport: Arc::new(transport),
            store,
            serializer,
            running: Mutex::new(()),
        }
    }

    /// Gets the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends every pending diff to the server.
    ///
    /// Publishes `SyncRequest`, then `SyncSuccess` once no diff is left or
    /// `SyncFailure` on the first error. A failed run leaves the diff in
    /// flight so the next run sends it again. Runs started while another is
    /// in progress wait for it to finish.
    pub async fn sync(&self) -> EngineResult<SyncReport> {
        let _running = self.running.lock().await;
        let start = Instant::now();
        info!("sync started");
        self.store.emit(StoreEvent::SyncRequest);

        match self.drain(start).await {
            Ok(report) => {
                info!(diffs = report.diffs, "sync finished");
                self.store.emit(StoreEvent::SyncSuccess);
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "sync failed");
                self.store.emit(StoreEvent::SyncFailure {
                    errors: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Runs [`sync`](Self::sync) until it succeeds or the retry policy
    /// gives up, pausing between runs.
    pub async fn sync_with_retry(&self) -> EngineResult<SyncReport> {
        let mut failures = 0;
        loop {
            match self.sync().await {
                Ok(report) => return Ok(report),
                Err(e) => {
                    failures += 1;
                    if !self.retry.allows(&e, failures) {
                        return Err(e);
                    }
                    let pause = self.retry.pause_after(failures);
                    warn!(failures, ?pause, error = %e, "retrying sync");
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    async fn drain(&self, start: Instant) -> EngineResult<SyncReport> {
        let mut report = SyncReport {
            diffs: 0,
            operations: 0,
            duration: Duration::ZERO,
        };

        while let Some(diff) = self.store.db().commit_diff() {
            debug!(
                sequence = %diff.sequence,
                operations = diff.operations.len(),
                "sending diff"
            );

            let response = self.transport.commit(&diff).await?;
            self.serializer
                .submit(WriteIntent::PostCommitDiff { response })
                .await?;

            report.diffs += 1;
            report.operations += diff.operations.len() as u64;
        }

        report.duration = start.elapsed();
        Ok(report)
    }
}
