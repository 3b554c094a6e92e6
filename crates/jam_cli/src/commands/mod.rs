//! CLI command implementations.

pub mod diff;
pub mod load;
pub mod sync;

use jam_core::{Db, Document};
use std::path::Path;
use tracing::debug;

/// Name of the transaction edits are staged in.
const EDIT_TRANSACTION: &str = "cli-edits";

/// Reads a JSON:API document from a file.
pub fn read_document(path: &Path) -> Result<Document, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    Ok(Document::from_json(&text)?)
}

/// Builds a store from a server document and a document of local edits.
///
/// The edits are staged in a transaction, merged and committed, so the store
/// ends up with one change set waiting for the server.
pub fn staged_db(base: &Path, edits: &Path) -> Result<Db, Box<dyn std::error::Error>> {
    let mut db = Db::new();
    db.load_json_api(&read_document(base)?)?;

    db.start_transaction(EDIT_TRANSACTION)?;
    db.load_json_api(&read_document(edits)?)?;
    db.commit_transaction(EDIT_TRANSACTION)?;
    let sequence = db.commit();
    debug!(?sequence, entities = db.len(), "staged edits");
    Ok(db)
}
