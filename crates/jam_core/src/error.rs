//! Error types for the Jam store engine.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A transaction with this name is already open.
    #[error("transaction already active: {name}")]
    DuplicateTransaction {
        /// Name of the transaction.
        name: String,
    },

    /// No open transaction has this name.
    #[error("unknown transaction: {name}")]
    UnknownTransaction {
        /// Name of the transaction.
        name: String,
    },

    /// Transactions opened after this one are still active.
    #[error("transaction {name} has open nested transactions: {nested:?}")]
    NestedTransactionOpen {
        /// Name of the transaction being committed.
        name: String,
        /// Names of the still-open nested transactions, outermost first.
        nested: Vec<String>,
    },

    /// The JSON:API document does not have the expected shape.
    #[error("malformed JSON:API document: {message}")]
    MalformedDocument {
        /// Description of the problem.
        message: String,
    },

    /// Entity not found in any layer of the store.
    #[error("entity not found: {identifier}")]
    EntityNotFound {
        /// The identifier that was looked up.
        identifier: String,
    },

    /// A commit response does not match the diff currently in flight.
    #[error("stale diff: expected sequence {expected:?}, got {actual}")]
    StaleDiff {
        /// Sequence of the oldest committed change set, if any.
        expected: Option<u64>,
        /// Sequence carried by the response.
        actual: u64,
    },

    /// A string could not be parsed as an identifier.
    #[error("invalid identifier: {value}")]
    InvalidIdentifier {
        /// The rejected input.
        value: String,
    },
}

impl CoreError {
    /// Creates a duplicate transaction error.
    pub fn duplicate_transaction(name: impl Into<String>) -> Self {
        Self::DuplicateTransaction { name: name.into() }
    }

    /// Creates an unknown transaction error.
    pub fn unknown_transaction(name: impl Into<String>) -> Self {
        Self::UnknownTransaction { name: name.into() }
    }

    /// Creates a malformed document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }

    /// Creates an entity not found error.
    pub fn entity_not_found(identifier: impl ToString) -> Self {
        Self::EntityNotFound {
            identifier: identifier.to_string(),
        }
    }
}
