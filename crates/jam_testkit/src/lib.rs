//! # Jam Testkit
//!
//! Test utilities for Jam.
//!
//! This crate provides:
//! - Fixtures for building documents and seeded stores
//! - Property-based test generators using proptest
//! - A reference applier for random store operations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jam_testkit::prelude::*;
//!
//! let db = seeded_db(&[post("1", "Hello")]);
//! assert!(db.contains(&Identifier::new("post", "1")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use jam_core::{Db, Document, Identifier, ResourceObject};
}

pub use fixtures::*;
pub use generators::*;
