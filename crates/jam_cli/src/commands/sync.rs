//! Sync command implementation.

use jam_engine::{EngineConfig, MockTransport, RetryConfig, Session, SyncReport};
use std::path::Path;
use std::time::Duration;

use super::diff::describe;
use super::staged_db;

/// Syncs staged edits against an in-memory server.
///
/// The first `fail` round trips fail with a retryable error.
pub async fn sync(
    base: &Path,
    edits: &Path,
    fail: u32,
) -> Result<(SyncReport, Vec<String>), Box<dyn std::error::Error>> {
    let db = staged_db(base, edits)?;
    let config = EngineConfig::default().with_retry(
        RetryConfig::new(fail.saturating_add(1))
            .with_backoff(Duration::from_millis(50))
            .with_max_backoff(Duration::from_secs(1)),
    );
    let session = Session::with_db(config, db);

    let transport = MockTransport::new();
    transport.fail_next(fail);
    let engine = session.sync_engine(transport);
    let result = engine.sync_with_retry().await;

    let sent = engine
        .transport()
        .received()
        .iter()
        .flat_map(|diff| diff.operations.iter().map(describe))
        .collect();
    session.shutdown().await?;
    Ok((result?, sent))
}

/// Runs the sync command.
pub fn run(base: &Path, edits: &Path, fail: u32) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    let (result, sent) = runtime.block_on(sync(base, edits, fail))?;

    println!(
        "Synced {} diff(s), {} operation(s) in {:?}",
        result.diffs, result.operations, result.duration
    );
    for line in sent {
        println!("  {}", line);
    }

    Ok(())
}
