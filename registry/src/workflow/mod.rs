//! # Workflow Module
//!
//! The Workflow Engine — the component with all the business rules, and
//! the only write path into the Registry Store.
//!
//! Every operation takes the caller's identity explicitly (the equivalent
//! of the transaction sender) and runs the same sequence: authorize the
//! caller, validate the target record's current state, apply the
//! transition, report the result. The check-then-act sequence is atomic
//! per record id, so two racing callers can never both win the same
//! transition.

pub mod engine;

pub use engine::{RegistryEvent, WorkflowEngine};
