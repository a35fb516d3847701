//! # RegistryStore — Persistent Storage Engine
//!
//! The persistence layer for the registry, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees" (analogous to column families in
//! RocksDB or tables in SQL). Each tree is an independent B+ tree with its
//! own keyspace:
//!
//! | Tree        | Key                 | Value                    |
//! |-------------|---------------------|--------------------------|
//! | `students`  | `id` (8B BE)        | `bincode(StudentRecord)` |
//! | `approvers` | identity (UTF-8)    | empty marker             |
//! | `metadata`  | key (UTF-8)         | value (bytes)            |
//!
//! Student ids are stored as big-endian u64 so that sled's lexicographic
//! ordering matches numeric ordering — range scans over records work
//! naturally.
//!
//! ## Id Allocation
//!
//! The next id lives in the `metadata` tree and is bumped with sled's
//! `update_and_fetch`, a compare-and-swap loop. Two concurrent creators can
//! never be handed the same id, and the counter is durable — a restart
//! resumes the sequence instead of reissuing old ids.
//!
//! ## Durability
//!
//! Every mutation flushes sled before returning, so success reported to the
//! caller means the data is on disk. No partial-success reporting.

use sled::{Db, Tree};
use std::path::Path;

use crate::error::WorkflowError;
use crate::record::{self, Identity, StudentId, StudentRecord};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt registry metadata: {0}")]
    Corrupt(String),

    #[error("registry owner identity must be non-empty")]
    EmptyOwner,
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree for the registry owner, written
/// exactly once when the registry is created.
const META_OWNER: &[u8] = b"owner";

/// Well-known key in the `metadata` tree for the next student id (8B BE).
const META_NEXT_STUDENT_ID: &[u8] = b"next_student_id";

// ---------------------------------------------------------------------------
// RegistryStore
// ---------------------------------------------------------------------------

/// Persistent storage engine for the registry.
///
/// Wraps a sled `Db` instance and exposes typed accessors for student
/// records, the approver set, and registry metadata. On-disk serialization
/// uses bincode for compactness and speed.
///
/// # Thread Safety
///
/// sled is inherently thread-safe — all trees support lock-free concurrent
/// reads and serialized writes, and id allocation goes through a CAS loop.
/// `RegistryStore` can be shared across threads via `Arc<RegistryStore>`
/// without external synchronization. Per-record check-then-act sequences
/// are serialized one layer up, by the Workflow Engine's lock table.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    /// The underlying sled database handle.
    db: Db,
    /// Student records keyed by id (big-endian u64 keys).
    students: Tree,
    /// Authorized approver identities (UTF-8 keys, empty values).
    approvers: Tree,
    /// Registry metadata (owner, id counter).
    metadata: Tree,
    /// The registry owner, cached from metadata at open time. Fixed for
    /// the registry's lifetime.
    owner: Identity,
}

impl RegistryStore {
    /// Open or create a registry at the given filesystem path.
    ///
    /// On first creation, `creator` becomes the registry owner and is
    /// persisted. Reopening an existing registry keeps the stored owner
    /// and ignores `creator` — ownership is fixed at creation, full stop.
    pub fn open<P: AsRef<Path>>(path: P, creator: &str) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db, creator)
    }

    /// Create a temporary registry that lives in memory and is cleaned up
    /// automatically when dropped.
    ///
    /// Ideal for unit tests — no filesystem side effects, no cleanup needed.
    pub fn open_temporary(creator: &str) -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db, creator)
    }

    /// Internal constructor: opens named trees and resolves the owner.
    fn from_db(db: Db, creator: &str) -> StoreResult<Self> {
        let students = db.open_tree("students")?;
        let approvers = db.open_tree("approvers")?;
        let metadata = db.open_tree("metadata")?;

        let owner = match metadata.get(META_OWNER)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|_| StoreError::Corrupt("owner is not valid UTF-8".into()))?,
            None => {
                let creator = creator.trim();
                if creator.is_empty() {
                    return Err(StoreError::EmptyOwner);
                }
                metadata.insert(META_OWNER, creator.as_bytes())?;
                db.flush()?;
                creator.to_string()
            }
        };

        Ok(Self {
            db,
            students,
            approvers,
            metadata,
            owner,
        })
    }

    // -- Student operations -------------------------------------------------

    /// Allocates the next sequential id and stores a new record in `Added`
    /// status. Returns the stored record, id included — callers never have
    /// to re-query a running count to learn what they just created.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] if any field is empty or
    /// oversized (checked before an id is consumed, so rejected input
    /// leaves no gap in the sequence).
    pub fn create_student(
        &self,
        name: &str,
        email: &str,
        course: &str,
    ) -> Result<StudentRecord, WorkflowError> {
        record::validate_field("name", name)?;
        record::validate_field("email", email)?;
        record::validate_field("course", course)?;

        let id = self.allocate_id()?;
        let student = StudentRecord::new(id, name, email, course)?;
        self.put_student(&student)?;
        Ok(student)
    }

    /// Retrieve a student record by id.
    ///
    /// Returns `None` if no record exists with the given id.
    pub fn get_student(&self, id: StudentId) -> StoreResult<Option<StudentRecord>> {
        match self.students.get(id.to_be_bytes())? {
            Some(bytes) => {
                let record: StudentRecord = bincode::deserialize(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Persist a student record (insert or overwrite), flushing to disk
    /// before returning.
    ///
    /// The store does not validate transitions — the Workflow Engine
    /// guarantees legality before calling.
    pub fn put_student(&self, student: &StudentRecord) -> StoreResult<()> {
        let bytes = bincode::serialize(student)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.students.insert(student.id.to_be_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    /// Atomically reserve the next sequential student id.
    fn allocate_id(&self) -> StoreResult<StudentId> {
        let bumped = self
            .metadata
            .update_and_fetch(META_NEXT_STUDENT_ID, |old| {
                let current = old
                    .and_then(|b| <[u8; 8]>::try_from(b).ok())
                    .map(u64::from_be_bytes)
                    .unwrap_or(0);
                Some(current.saturating_add(1).to_be_bytes().to_vec())
            })?
            .ok_or_else(|| StoreError::Corrupt("id counter vanished during allocation".into()))?;

        let next = <[u8; 8]>::try_from(bumped.as_ref())
            .map(u64::from_be_bytes)
            .map_err(|_| StoreError::Corrupt("id counter has invalid width".into()))?;

        // `next` is the post-bump value; the reserved id is one below it.
        Ok(next - 1)
    }

    // -- Approver operations ------------------------------------------------

    /// Add an identity to the approver set. Idempotent — re-adding an
    /// existing member is a no-op, not an error.
    pub fn add_approver(&self, identity: &str) -> StoreResult<()> {
        self.approvers.insert(identity.as_bytes(), Vec::<u8>::new())?;
        self.db.flush()?;
        Ok(())
    }

    /// Whether `identity` is in the approver set.
    pub fn is_approver(&self, identity: &str) -> StoreResult<bool> {
        Ok(self.approvers.contains_key(identity.as_bytes())?)
    }

    /// Whether `identity` is the registry owner.
    pub fn is_owner(&self, identity: &str) -> bool {
        identity == self.owner
    }

    /// The registry owner, fixed at creation.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    // -- Utility operations -------------------------------------------------

    /// Number of student records in the registry.
    pub fn student_count(&self) -> usize {
        self.students.len()
    }

    /// Number of authorized approvers.
    pub fn approver_count(&self) -> usize {
        self.approvers.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordStatus;

    #[test]
    fn open_temporary_fixes_owner() {
        let store = RegistryStore::open_temporary("dean_pk").unwrap();
        assert_eq!(store.owner(), "dean_pk");
        assert!(store.is_owner("dean_pk"));
        assert!(!store.is_owner("someone_else"));
        assert_eq!(store.student_count(), 0);
        assert_eq!(store.approver_count(), 0);
    }

    #[test]
    fn empty_owner_rejected_at_creation() {
        assert!(matches!(
            RegistryStore::open_temporary("   "),
            Err(StoreError::EmptyOwner)
        ));
    }

    #[test]
    fn owner_survives_reopen_and_ignores_new_creator() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = RegistryStore::open(dir.path(), "alice").unwrap();
            assert_eq!(store.owner(), "alice");
        }
        // Reopening with a different creator must NOT transfer ownership.
        let store = RegistryStore::open(dir.path(), "mallory").unwrap();
        assert_eq!(store.owner(), "alice");
        assert!(!store.is_owner("mallory"));
    }

    #[test]
    fn create_student_assigns_sequential_ids() {
        let store = RegistryStore::open_temporary("owner").unwrap();
        let a = store.create_student("Alice", "a@x.com", "CS").unwrap();
        let b = store.create_student("Bob", "b@x.com", "EE").unwrap();
        let c = store.create_student("Carol", "c@x.com", "ME").unwrap();
        assert_eq!(a.id, 0);
        assert_eq!(b.id, 1);
        assert_eq!(c.id, 2);
        assert_eq!(store.student_count(), 3);
    }

    #[test]
    fn rejected_input_leaves_no_gap_in_ids() {
        let store = RegistryStore::open_temporary("owner").unwrap();
        store.create_student("Alice", "a@x.com", "CS").unwrap();

        assert!(store.create_student("Bob", "", "EE").is_err());

        // Validation failed before allocation — the next id is still 1.
        let next = store.create_student("Carol", "c@x.com", "ME").unwrap();
        assert_eq!(next.id, 1);
    }

    #[test]
    fn get_student_returns_none_for_missing_id() {
        let store = RegistryStore::open_temporary("owner").unwrap();
        assert!(store.get_student(999).unwrap().is_none());
    }

    #[test]
    fn put_and_get_roundtrip_preserves_status() {
        let store = RegistryStore::open_temporary("owner").unwrap();
        let mut record = store.create_student("Alice", "a@x.com", "CS").unwrap();

        record.mark_requested().unwrap();
        store.put_student(&record).unwrap();

        let reloaded = store.get_student(record.id).unwrap().unwrap();
        assert_eq!(reloaded, record);
        assert_eq!(reloaded.status, RecordStatus::Requested);
    }

    #[test]
    fn add_approver_is_idempotent() {
        let store = RegistryStore::open_temporary("owner").unwrap();
        store.add_approver("prof_x").unwrap();
        store.add_approver("prof_x").unwrap();

        assert_eq!(store.approver_count(), 1);
        assert!(store.is_approver("prof_x").unwrap());
        assert!(!store.is_approver("prof_y").unwrap());
    }

    #[test]
    fn records_and_approvers_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = {
            let store = RegistryStore::open(dir.path(), "owner").unwrap();
            let record = store.create_student("Alice", "a@x.com", "CS").unwrap();
            store.add_approver("prof_x").unwrap();
            record.id
        };

        let store = RegistryStore::open(dir.path(), "owner").unwrap();
        let record = store.get_student(id).unwrap().expect("record persisted");
        assert_eq!(record.name, "Alice");
        assert!(store.is_approver("prof_x").unwrap());
    }

    #[test]
    fn id_allocation_resumes_after_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = RegistryStore::open(dir.path(), "owner").unwrap();
            store.create_student("Alice", "a@x.com", "CS").unwrap();
            store.create_student("Bob", "b@x.com", "EE").unwrap();
        }

        let store = RegistryStore::open(dir.path(), "owner").unwrap();
        let next = store.create_student("Carol", "c@x.com", "ME").unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn concurrent_creates_allocate_distinct_ids() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(RegistryStore::open_temporary("owner").unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..5)
                        .map(|i| {
                            store
                                .create_student(
                                    &format!("Student {t}-{i}"),
                                    &format!("s{t}{i}@x.com"),
                                    "CS",
                                )
                                .unwrap()
                                .id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("creator thread should not panic") {
                assert!(ids.insert(id), "id {id} was allocated twice");
            }
        }

        assert_eq!(ids.len(), 20);
        assert_eq!(store.student_count(), 20);
        // Sequential allocation with no gaps: exactly 0..20.
        assert_eq!(ids.iter().max(), Some(&19));
    }
}
