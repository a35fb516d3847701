//! # Store Module
//!
//! Durable, authoritative storage for the registry: student records keyed
//! by sequential id, the approver set, and the fixed owner identity.
//!
//! ```text
//! db.rs — sled persistence: named trees, bincode values, id allocation
//! ```
//!
//! The store is deliberately rule-free. It will happily persist any record
//! the Workflow Engine hands it — authorization and state-machine legality
//! are enforced one layer up, and the engine is the only write path.
//!
//! ## Design Decisions
//!
//! 1. **sled with named trees.** Students, approvers, and metadata each
//!    get their own tree, so each keyspace stays simple and scans stay
//!    cheap.
//! 2. **Bincode for on-disk serialization.** Compact, fast, deterministic.
//!    JSON is for APIs and debugging; bincode is for storage.
//! 3. **Big-endian u64 keys.** sled orders keys lexicographically; BE
//!    encoding makes that match numeric id order for free.

pub mod db;

pub use db::{RegistryStore, StoreError, StoreResult};
