//! # Jam Core
//!
//! Normalized, transactional client store for JSON:API resources.
//!
//! This crate provides:
//! - Identifiers derived from resource type and id
//! - A JSON:API document model and loader that flattens resources
//! - Named, nested transactions layered over the base store
//! - Diffs of committed changes and application of the server's response
//!
//! Everything here is synchronous and free of I/O. The `jam_engine` crate
//! serializes writes against a shared snapshot and talks to the server.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod db;
mod diff;
mod entity;
mod error;
pub mod jsonapi;
mod transaction;
mod types;

pub use config::Config;
pub use db::Db;
pub use diff::{CommitResponse, Diff, DiffOperation};
pub use entity::{Attributes, Entity, Identifier, Relationship};
pub use error::{CoreError, CoreResult};
pub use jsonapi::{Document, PrimaryIdentifiers, ResourceObject};
pub use transaction::{Overlay, Slot, Transaction, TransactionManager};
pub use types::{SequenceNumber, SnapshotVersion};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
