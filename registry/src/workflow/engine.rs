//! # Workflow Engine
//!
//! Validates and applies the five registry operations against the
//! [`RegistryStore`], enforcing ownership, approver authorization, and
//! state-machine legality. The lifecycle per record is:
//!
//! 1. **AddStudent** — any connected identity registers a student.
//! 2. **AuthorizeApprover** — the owner vets an approver (idempotent).
//! 3. **RequestRecommendation** — anyone requests, exactly once.
//! 4. **ApproveRecommendation** — an authorized approver signs off, once.
//! 5. **GetStudent** — pure read, open to all.
//!
//! ## Concurrency
//!
//! Per-record transitions are serialized through a lock table keyed by
//! student id: the read-validate-write sequence holds the record's mutex
//! end to end, so under N racing transitions on one id exactly one
//! succeeds and the rest observe the post-transition state and are
//! rejected. Id allocation is atomic inside the store. There is no global
//! lock — operations on different records proceed in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config;
use crate::error::{WorkflowError, WorkflowResult};
use crate::record::{self, StudentId, StudentRecord, StudentView};
use crate::store::RegistryStore;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events broadcast after each successful mutation, for live UI refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegistryEvent {
    /// A new student record was created.
    #[serde(rename = "student_added")]
    StudentAdded {
        id: StudentId,
        name: String,
        course: String,
    },
    /// The owner authorized an approver.
    #[serde(rename = "approver_authorized")]
    ApproverAuthorized { target: String },
    /// A recommendation was requested on a record.
    #[serde(rename = "recommendation_requested")]
    RecommendationRequested { id: StudentId, caller: String },
    /// A recommendation was approved on a record.
    #[serde(rename = "recommendation_approved")]
    RecommendationApproved { id: StudentId, approver: String },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The Workflow Engine. Construct one per registry with an injected store;
/// there is no process-wide singleton.
///
/// Cheap to share — hold it in an `Arc` and call from as many threads or
/// tasks as you like.
pub struct WorkflowEngine {
    /// The authoritative store. The engine is its sole writer.
    store: Arc<RegistryStore>,
    /// Per-record locks serializing check-then-act transitions.
    record_locks: DashMap<StudentId, Arc<Mutex<()>>>,
    /// Broadcast channel for mutation events.
    events: broadcast::Sender<RegistryEvent>,
}

impl WorkflowEngine {
    /// Creates an engine over the given store.
    pub fn new(store: Arc<RegistryStore>) -> Self {
        let (events, _) = broadcast::channel(config::EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            record_locks: DashMap::new(),
            events,
        }
    }

    /// Subscribe to mutation events. Each successful mutation is sent to
    /// every active subscriber; lagging subscribers drop oldest first.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Read access to the underlying store, for status reporting.
    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    // -- Operations ---------------------------------------------------------

    /// Registers a new student and returns the allocated id.
    ///
    /// Open to any connected identity — registering requires a caller, not
    /// a role.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] if the caller identity or any
    /// record field is empty.
    pub fn add_student(
        &self,
        caller: &str,
        name: &str,
        email: &str,
        course: &str,
    ) -> WorkflowResult<StudentId> {
        record::validate_identity("caller", caller)?;

        let student = self.store.create_student(name, email, course)?;
        tracing::info!(id = student.id, caller, "student added");

        let _ = self.events.send(RegistryEvent::StudentAdded {
            id: student.id,
            name: student.name.clone(),
            course: student.course.clone(),
        });
        Ok(student.id)
    }

    /// Adds `target` to the approver set. Owner only.
    ///
    /// Idempotent: re-authorizing an existing approver succeeds silently.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Unauthorized`] if `caller` is not the
    /// registry owner.
    pub fn authorize_approver(&self, caller: &str, target: &str) -> WorkflowResult<()> {
        record::validate_identity("caller", caller)?;
        record::validate_identity("target", target)?;

        if !self.store.is_owner(caller) {
            return Err(WorkflowError::Unauthorized {
                caller: caller.to_string(),
                role: "owner",
            });
        }

        self.store.add_approver(target)?;
        tracing::info!(target, "approver authorized");

        let _ = self.events.send(RegistryEvent::ApproverAuthorized {
            target: target.to_string(),
        });
        Ok(())
    }

    /// Requests a recommendation on record `id`.
    ///
    /// Any connected identity may request on behalf of any student id —
    /// the registry deliberately does not tie requests to the student's
    /// own identity.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] if the record does not exist,
    /// or [`WorkflowError::InvalidState`] if a request was already made.
    pub fn request_recommendation(&self, caller: &str, id: StudentId) -> WorkflowResult<StudentView> {
        record::validate_identity("caller", caller)?;

        let lock = self.record_lock(id);
        let _guard = lock.lock();

        let mut student = self.fetch_for_update(id)?;
        student.mark_requested()?;
        self.store.put_student(&student)?;
        tracing::info!(id, caller, "recommendation requested");

        let _ = self.events.send(RegistryEvent::RecommendationRequested {
            id,
            caller: caller.to_string(),
        });
        Ok(student.view())
    }

    /// Approves the recommendation on record `id`. Approvers only.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Unauthorized`] if `caller` is not an
    /// authorized approver (checked before the record is even looked up),
    /// [`WorkflowError::NotFound`] if the record does not exist, or
    /// [`WorkflowError::InvalidState`] unless the record is requested and
    /// not yet approved.
    pub fn approve_recommendation(&self, caller: &str, id: StudentId) -> WorkflowResult<StudentView> {
        record::validate_identity("caller", caller)?;

        if !self.store.is_approver(caller)? {
            return Err(WorkflowError::Unauthorized {
                caller: caller.to_string(),
                role: "approver",
            });
        }

        let lock = self.record_lock(id);
        let _guard = lock.lock();

        let mut student = self.fetch_for_update(id)?;
        student.mark_approved()?;
        self.store.put_student(&student)?;
        tracing::info!(id, approver = caller, "recommendation approved");

        let _ = self.events.send(RegistryEvent::RecommendationApproved {
            id,
            approver: caller.to_string(),
        });
        Ok(student.view())
    }

    /// Fetches the record view for `id`. Pure read, no authorization.
    ///
    /// Transient store failures on this path are retried a bounded number
    /// of times before surfacing — the only automatic retry in the engine.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] if the record does not exist.
    pub fn get_student(&self, id: StudentId) -> WorkflowResult<StudentView> {
        let mut attempts = 0;
        loop {
            match self.store.get_student(id) {
                Ok(Some(student)) => return Ok(student.view()),
                Ok(None) => return Err(WorkflowError::NotFound(id)),
                Err(err) if attempts < config::READ_RETRY_ATTEMPTS => {
                    attempts += 1;
                    tracing::warn!(%err, id, attempt = attempts, "transient read failure, retrying");
                    std::thread::sleep(config::READ_RETRY_BACKOFF);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // -- Internals ----------------------------------------------------------

    /// The mutex guarding transitions on `id`. Lazily created, never
    /// removed — the table grows with the set of ids ever transitioned,
    /// one small allocation each.
    fn record_lock(&self, id: StudentId) -> Arc<Mutex<()>> {
        self.record_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Loads a record on the mutation path. No retry: a transient failure
    /// here fails the operation closed rather than risk a double-apply.
    fn fetch_for_update(&self, id: StudentId) -> WorkflowResult<StudentRecord> {
        self.store
            .get_student(id)?
            .ok_or(WorkflowError::NotFound(id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
