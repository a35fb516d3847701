//! # Student Records — The Registry's State Machine
//!
//! A [`StudentRecord`] is created once and then only ever moves forward:
//!
//! ```text
//! Added --mark_requested--> Requested --mark_approved--> Approved (terminal)
//! ```
//!
//! The status is a three-variant enum rather than a pair of booleans, so
//! "approved but never requested" is not a representable state. The external
//! view ([`StudentView`]) still renders the `requested`/`approved` boolean
//! pair that API consumers expect.
//!
//! Name, email, and course are set at creation and immutable thereafter —
//! there is no update operation, by design.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::WorkflowError;

/// A caller or approver identity — the equivalent of a wallet address.
/// Opaque to the registry; ownership and approver rights attach to the
/// exact string.
pub type Identity = String;

/// Sequential student record id, assigned by the store at creation time.
/// Monotonically increasing, never reused.
pub type StudentId = u64;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Where a record sits in the recommendation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Registered, no recommendation requested yet.
    Added,
    /// A recommendation has been requested and awaits approval.
    Requested,
    /// Approved by an authorized approver. Terminal — no further
    /// transitions are permitted.
    Approved,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Added => write!(f, "Added"),
            RecordStatus::Requested => write!(f, "Requested"),
            RecordStatus::Approved => write!(f, "Approved"),
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A single student's entry in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    /// Sequential id, unique for the registry's lifetime.
    pub id: StudentId,
    /// Student's full name. Immutable after creation.
    pub name: String,
    /// Contact email. Immutable after creation.
    pub email: String,
    /// Course of study. Immutable after creation.
    pub course: String,
    /// Current workflow status.
    pub status: RecordStatus,
    /// Timestamp when the record was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent state change.
    pub updated_at: DateTime<Utc>,
}

/// Validates a required text field: non-empty after trimming, and within
/// the configured length bound.
pub(crate) fn validate_field(field: &'static str, value: &str) -> Result<(), WorkflowError> {
    if value.trim().is_empty() || value.len() > config::MAX_FIELD_LENGTH {
        return Err(WorkflowError::Validation { field });
    }
    Ok(())
}

/// Validates a caller or target identity string.
pub(crate) fn validate_identity(field: &'static str, value: &str) -> Result<(), WorkflowError> {
    if value.trim().is_empty() || value.len() > config::MAX_IDENTITY_LENGTH {
        return Err(WorkflowError::Validation { field });
    }
    Ok(())
}

impl StudentRecord {
    /// Creates a new record in `Added` status.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] if any field is empty
    /// (whitespace-only counts as empty) or oversized.
    pub fn new(id: StudentId, name: &str, email: &str, course: &str) -> Result<Self, WorkflowError> {
        validate_field("name", name)?;
        validate_field("email", email)?;
        validate_field("course", course)?;

        let now = Utc::now();
        Ok(Self {
            id,
            name: name.to_string(),
            email: email.to_string(),
            course: course.to_string(),
            status: RecordStatus::Added,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether a recommendation has been requested (true in `Requested`
    /// and `Approved`).
    pub fn requested(&self) -> bool {
        matches!(self.status, RecordStatus::Requested | RecordStatus::Approved)
    }

    /// Whether the recommendation has been approved.
    pub fn approved(&self) -> bool {
        self.status == RecordStatus::Approved
    }

    /// Transitions `Added -> Requested`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidState`] if a request was already
    /// made, or the record is already approved.
    pub fn mark_requested(&mut self) -> Result<(), WorkflowError> {
        if self.status != RecordStatus::Added {
            return Err(WorkflowError::InvalidState {
                current: self.status.to_string(),
                operation: "request",
            });
        }
        self.status = RecordStatus::Requested;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transitions `Requested -> Approved`. Approved is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidState`] if no request was made,
    /// or the record is already approved.
    pub fn mark_approved(&mut self) -> Result<(), WorkflowError> {
        if self.status != RecordStatus::Requested {
            return Err(WorkflowError::InvalidState {
                current: self.status.to_string(),
                operation: "approve",
            });
        }
        self.status = RecordStatus::Approved;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The external view of this record, with the status rendered as the
    /// `requested`/`approved` boolean pair.
    pub fn view(&self) -> StudentView {
        StudentView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            course: self.course.clone(),
            requested: self.requested(),
            approved: self.approved(),
        }
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// What `GetStudent` returns to callers: the record's fields plus its
/// workflow position as booleans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentView {
    /// The record's sequential id.
    pub id: StudentId,
    /// Student's full name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Course of study.
    pub course: String,
    /// Whether a recommendation has been requested.
    pub requested: bool,
    /// Whether the recommendation has been approved.
    pub approved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StudentRecord {
        StudentRecord::new(0, "Alice", "a@x.com", "CS").unwrap()
    }

    #[test]
    fn new_record_starts_added() {
        let r = record();
        assert_eq!(r.status, RecordStatus::Added);
        assert!(!r.requested());
        assert!(!r.approved());
    }

    #[test]
    fn empty_fields_rejected() {
        assert!(StudentRecord::new(0, "", "a@x.com", "CS").is_err());
        assert!(StudentRecord::new(0, "Alice", "", "CS").is_err());
        assert!(StudentRecord::new(0, "Alice", "a@x.com", "").is_err());
    }

    #[test]
    fn whitespace_only_field_rejected() {
        let result = StudentRecord::new(0, "   ", "a@x.com", "CS");
        assert!(matches!(
            result,
            Err(WorkflowError::Validation { field: "name" })
        ));
    }

    #[test]
    fn oversized_field_rejected() {
        let long = "x".repeat(crate::config::MAX_FIELD_LENGTH + 1);
        assert!(StudentRecord::new(0, &long, "a@x.com", "CS").is_err());
    }

    #[test]
    fn request_transitions_to_requested() {
        let mut r = record();
        r.mark_requested().unwrap();
        assert_eq!(r.status, RecordStatus::Requested);
        assert!(r.requested());
        assert!(!r.approved());
    }

    #[test]
    fn duplicate_request_rejected() {
        let mut r = record();
        r.mark_requested().unwrap();
        let result = r.mark_requested();
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidState { operation: "request", .. })
        ));
    }

    #[test]
    fn approve_before_request_rejected() {
        let mut r = record();
        let result = r.mark_approved();
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidState { operation: "approve", .. })
        ));
        assert_eq!(r.status, RecordStatus::Added);
    }

    #[test]
    fn approve_after_request_succeeds() {
        let mut r = record();
        r.mark_requested().unwrap();
        r.mark_approved().unwrap();
        assert!(r.requested());
        assert!(r.approved());
    }

    #[test]
    fn approved_is_terminal() {
        let mut r = record();
        r.mark_requested().unwrap();
        r.mark_approved().unwrap();

        assert!(r.mark_requested().is_err());
        assert!(r.mark_approved().is_err());
        assert_eq!(r.status, RecordStatus::Approved);
    }

    #[test]
    fn view_renders_status_as_booleans() {
        let mut r = record();
        r.mark_requested().unwrap();

        let view = r.view();
        assert_eq!(view.id, 0);
        assert_eq!(view.name, "Alice");
        assert!(view.requested);
        assert!(!view.approved);
    }

    #[test]
    fn view_serialization_roundtrip() {
        let view = record().view();
        let json = serde_json::to_string(&view).unwrap();
        let restored: StudentView = serde_json::from_str(&json).unwrap();
        assert_eq!(view, restored);
    }
}
