//! Named, nested transactions.
//!
//! A transaction is an [`Overlay`] of entity changes pushed on a stack above
//! the base store. Reads walk the stack innermost first, so code working
//! inside a transaction sees its own uncommitted edits:
//! - **Commit** merges an overlay into its parent scope
//! - **Abort** discards an overlay and everything opened after it
//! - **Save** replaces an overlay's contents as a checkpoint

mod manager;
mod overlay;

pub use manager::{Transaction, TransactionManager};
pub use overlay::{Overlay, Slot};
