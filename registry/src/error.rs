//! # Workflow Error Taxonomy
//!
//! Every operation in the registry fails into exactly one of five classes,
//! and callers are expected to branch on them:
//!
//! | Variant        | Meaning                                   | Retry?          |
//! |----------------|-------------------------------------------|-----------------|
//! | `Validation`   | Malformed input (empty/oversized field)   | No — fix input  |
//! | `NotFound`     | Referenced student id does not exist      | No              |
//! | `Unauthorized` | Caller lacks the required role            | No              |
//! | `InvalidState` | Transition illegal from the current state | No — re-fetch   |
//! | `Store`        | Underlying storage failure                | Reads only      |
//!
//! None of these should ever crash the caller's process — they are ordinary
//! result values, not faults.

use thiserror::Error;

use crate::record::StudentId;
use crate::store::StoreError;

/// Errors produced by registry operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A required text field was empty or exceeded its length bound.
    #[error("invalid field '{field}': must be non-empty text within length bounds")]
    Validation {
        /// The offending input field.
        field: &'static str,
    },

    /// The referenced student record does not exist.
    #[error("student {0} not found")]
    NotFound(StudentId),

    /// The caller does not hold the role this operation requires.
    ///
    /// Deliberately names only the caller and the missing role — never the
    /// identities that do hold it.
    #[error("unauthorized: {caller} lacks the {role} role")]
    Unauthorized {
        /// The identity that attempted the operation.
        caller: String,
        /// The role required ("owner" or "approver").
        role: &'static str,
    },

    /// The operation is not legal from the record's current state.
    #[error("invalid state: cannot {operation} a record that is {current}")]
    InvalidState {
        /// The record's current status.
        current: String,
        /// The attempted operation ("request" or "approve").
        operation: &'static str,
    },

    /// The underlying store failed. The only class the engine will retry,
    /// and only on the read path.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias used throughout the workflow layer.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
