//! Trustline Store - versioned records with compare-and-swap commits
//!
//! Every escrow mutation is a read-check-write sequence: a caller reads a
//! record together with its [`Version`], computes a transition, and commits
//! it with the version it read. The comparison happens inside the same
//! atomic update as the write, so there is no window between check and
//! write. On mismatch the commit fails with [`StoreError::Conflict`] and
//! the caller re-reads — never a silent overwrite, never last-writer-wins.
//!
//! # Concurrency
//!
//! Two writers that read the same version race to commit; exactly one
//! wins and advances the version by 1, the other gets a conflict. The
//! store may be shared by independent processes, so correctness lives in
//! the commit protocol, not in in-process locks.

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use tokio::sync::RwLock;

use trustline_types::TrustlineError;

// =============================================================================
// Version
// =============================================================================

/// Version stamp for optimistic concurrency control.
///
/// - [`Version::NONE`] marks a record that has never been committed.
/// - Every successful commit advances the version by exactly 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(pub u64);

impl Version {
    /// Sentinel for a record that has never been committed
    pub const NONE: Version = Version(0);

    /// Create a version with a specific value
    pub fn new(value: u64) -> Self {
        Version(value)
    }

    /// The version a successful commit against this one produces
    pub fn next(self) -> Self {
        Version(self.0.saturating_add(1))
    }

    /// Check if this is the NONE sentinel
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Get the inner value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "NONE")
        } else {
            write!(f, "v{}", self.0)
        }
    }
}

// =============================================================================
// Store Error
// =============================================================================

/// Errors from record storage.
///
/// The distinction matters for callers:
/// - [`StoreError::Conflict`] means another writer committed first. This
///   is expected under concurrency; re-read and resubmit.
/// - [`StoreError::Backend`] means storage itself failed (timeout,
///   connection, serialization). Retrying without a re-read is pointless.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another writer committed this record since it was read
    #[error("version conflict on {entity} {id}: expected {expected}, actual {actual}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// Storage backend failed
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// Conflicts are retryable after a re-read; backend failures are not
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StoreError> for TrustlineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                entity,
                id,
                expected,
                actual,
            } => TrustlineError::VersionConflict {
                entity,
                id,
                expected: expected.value(),
                actual: actual.value(),
            },
            StoreError::Backend(e) => TrustlineError::Storage {
                message: e.to_string(),
            },
        }
    }
}

// =============================================================================
// Record Store
// =============================================================================

/// Persists versioned records with compare-and-swap commits.
///
/// Implementations must make `commit` atomic: the version comparison and
/// the write are one operation, keyed on the expected version.
#[async_trait]
pub trait RecordStore<Id, Record>: Send + Sync
where
    Id: Clone + Eq + Hash + Send + Sync + 'static,
    Record: Send + Sync,
{
    /// Load a record and its current version.
    ///
    /// Returns `None` if the record has never been committed.
    async fn get(&self, id: &Id) -> Result<Option<(Record, Version)>, StoreError>;

    /// Commit a record, keyed on the version the caller read.
    ///
    /// Use [`Version::NONE`] for a record that does not exist yet.
    /// Returns the new version on success and [`StoreError::Conflict`]
    /// if the stored version does not match `expected`.
    async fn commit(
        &self,
        id: &Id,
        record: &Record,
        expected: Version,
    ) -> Result<Version, StoreError>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory record store for tests, demos, and single-process deployments.
pub struct MemoryStore<Id, Record> {
    entity: &'static str,
    records: RwLock<HashMap<Id, (Record, Version)>>,
}

impl<Id, Record> MemoryStore<Id, Record> {
    /// Create an empty store.
    ///
    /// `entity` names the record type in conflict errors ("escrow",
    /// "dispute_index", ...).
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            records: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<Id, Record> RecordStore<Id, Record> for MemoryStore<Id, Record>
where
    Id: Clone + Eq + Hash + std::fmt::Display + Send + Sync + 'static,
    Record: Clone + Send + Sync + 'static,
{
    async fn get(&self, id: &Id) -> Result<Option<(Record, Version)>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn commit(
        &self,
        id: &Id,
        record: &Record,
        expected: Version,
    ) -> Result<Version, StoreError> {
        let mut records = self.records.write().await;

        let actual = records.get(id).map(|(_, v)| *v).unwrap_or(Version::NONE);
        if actual != expected {
            return Err(StoreError::Conflict {
                entity: self.entity,
                id: id.to_string(),
                expected,
                actual,
            });
        }

        let next = expected.next();
        records.insert(id.clone(), (record.clone(), next));
        Ok(next)
    }
}
