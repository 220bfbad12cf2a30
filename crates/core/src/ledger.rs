//! Progress ledger seam.
//!
//! The ledger is the only shared mutable state the pipeline touches. Both
//! write primitives must be atomic on the backend side: a patch lands as a
//! whole, and concurrent list appends from sibling tasks never lose an
//! entry. Callers never read-modify-write.

use async_trait::async_trait;

use crate::job::JobRecord;
use crate::patch::PatchDocument;
use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Job {0} not found in ledger")]
    JobNotFound(JobId),

    #[error("Ledger backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ProgressLedger: Send + Sync {
    /// Create the record for `job_id` if it does not exist yet. Returns
    /// `false` when a record was already present (it is left untouched).
    async fn create(&self, job_id: &JobId, progress: u8, step: &str)
        -> Result<bool, LedgerError>;

    /// Apply `patch` atomically. Progress never moves backwards: the stored
    /// value becomes `max(stored, patch.progress())`.
    async fn apply_patch(&self, job_id: &JobId, patch: &PatchDocument)
        -> Result<(), LedgerError>;

    /// Atomically append `value` to the list stored under `field`, creating
    /// the list if absent.
    async fn append_to_list(
        &self,
        job_id: &JobId,
        field: &str,
        value: &str,
    ) -> Result<(), LedgerError>;

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, LedgerError>;
}
