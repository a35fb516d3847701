// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ENDORSE — Core Registry Library
//!
//! The ledger-backed registry behind the ENDORSE recommendation workflow:
//! students are registered once, recommendations are requested once, and an
//! owner-vetted set of approvers signs off — in that order, enforced, no
//! exceptions.
//!
//! A record moves forward through exactly three states:
//!
//! ```text
//! Added --request--> Requested --approve--> Approved (terminal)
//! ```
//!
//! Nothing moves backward, nothing is deleted, and nothing is approved that
//! was never requested. If that sounds strict, good — a recommendation
//! registry that can be rewritten after the fact is just a rumor mill with
//! extra steps.
//!
//! ## Architecture
//!
//! The library is split along the two real responsibilities:
//!
//! - **store** — The Registry Store: sled-backed, durable storage of student
//!   records and the approver set. Owns id allocation and the fixed owner
//!   identity. Knows nothing about who is allowed to do what.
//! - **workflow** — The Workflow Engine: the single write path. Authorizes
//!   the caller, validates the record's current state, applies the
//!   transition, and reports the result. All the business rules live here.
//! - **record** — The student record itself and its state machine.
//! - **config** — Constants. Ports, retry policy, field bounds.
//!
//! ## Design Philosophy
//!
//! 1. State transitions are explicit: enum variants, not boolean flags.
//! 2. Every failure is an ordinary `Result` value with a typed variant —
//!    callers branch on errors, they don't parse them.
//! 3. The store is injected, never a process-wide singleton.
//! 4. If it gates a credential, it has tests. Plural.

pub mod config;
pub mod error;
pub mod record;
pub mod store;
pub mod workflow;

pub use error::WorkflowError;
pub use record::{Identity, RecordStatus, StudentId, StudentRecord, StudentView};
pub use store::RegistryStore;
pub use workflow::{RegistryEvent, WorkflowEngine};
