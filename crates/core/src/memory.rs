//! In-process blob store and ledger.
//!
//! Both keep their state behind a [`std::sync::Mutex`] that is never held
//! across an `.await`, which makes every operation atomic with respect to
//! concurrent callers. The ledger also keeps a write journal so that the
//! exact sequence of mutations can be inspected.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::job::JobRecord;
use crate::ledger::{LedgerError, ProgressLedger};
use crate::patch::PatchDocument;
use crate::storage::{BlobStore, StorageError};
use crate::types::JobId;

// ---------------------------------------------------------------------------
// InMemoryBlobStore
// ---------------------------------------------------------------------------

/// Namespace reported by [`InMemoryBlobStore`].
pub const MEMORY_NAMESPACE: &str = "memory";

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, StoredBlob>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob without going through the async interface.
    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>, content_type: &str) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(
                key.into(),
                StoredBlob {
                    bytes,
                    content_type: content_type.to_owned(),
                },
            );
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .lock()
            .map(|blobs| blobs.contains_key(key))
            .unwrap_or(false)
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .blobs
            .lock()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn blob(&self, key: &str) -> Option<StoredBlob> {
        self.blobs.lock().ok()?.get(key).cloned()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StoredBlob>>, StorageError> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::Backend("blob map lock poisoned".into()))
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn namespace(&self) -> &str {
        MEMORY_NAMESPACE
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()?
            .get(key)
            .map(|blob| blob.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.lock()?.insert(
            key.to_owned(),
            StoredBlob {
                bytes,
                content_type: content_type.to_owned(),
            },
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

/// One successful mutation, as recorded in the journal.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    Created { job_id: JobId },
    Patched { job_id: JobId, patch: PatchDocument },
    Appended {
        job_id: JobId,
        field: String,
        value: String,
    },
}

#[derive(Default)]
struct LedgerState {
    records: HashMap<JobId, JobRecord>,
    journal: Vec<LedgerWrite>,
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mutation applied so far, in application order.
    pub fn journal(&self) -> Vec<LedgerWrite> {
        self.state
            .lock()
            .map(|state| state.journal.clone())
            .unwrap_or_default()
    }

    /// Patches applied to `job_id`, in order.
    pub fn patches(&self, job_id: &JobId) -> Vec<PatchDocument> {
        self.journal()
            .into_iter()
            .filter_map(|write| match write {
                LedgerWrite::Patched { job_id: id, patch } if &id == job_id => Some(patch),
                _ => None,
            })
            .collect()
    }

    /// Values appended to `field` of `job_id`, in order.
    pub fn appends(&self, job_id: &JobId, field: &str) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter_map(|write| match write {
                LedgerWrite::Appended {
                    job_id: id,
                    field: f,
                    value,
                } if &id == job_id && f == field => Some(value),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Backend("ledger lock poisoned".into()))
    }
}

#[async_trait]
impl ProgressLedger for InMemoryLedger {
    async fn create(&self, job_id: &JobId, progress: u8, step: &str) -> Result<bool, LedgerError> {
        let mut state = self.lock()?;
        if state.records.contains_key(job_id) {
            return Ok(false);
        }
        let mut record = JobRecord::new(job_id.clone());
        record.progress = progress;
        record.current_step = step.to_owned();
        record.updated_at = Some(chrono::Utc::now());
        state.records.insert(job_id.clone(), record);
        state.journal.push(LedgerWrite::Created {
            job_id: job_id.clone(),
        });
        Ok(true)
    }

    async fn apply_patch(&self, job_id: &JobId, patch: &PatchDocument) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        let record = state
            .records
            .get_mut(job_id)
            .ok_or_else(|| LedgerError::JobNotFound(job_id.clone()))?;

        record.progress = record.progress.max(patch.progress());
        record.current_step = patch.current_step().to_owned();
        for (name, value) in patch.fields() {
            record.fields.insert(name.clone(), value.to_json());
        }
        record.updated_at = Some(chrono::Utc::now());

        state.journal.push(LedgerWrite::Patched {
            job_id: job_id.clone(),
            patch: patch.clone(),
        });
        Ok(())
    }

    async fn append_to_list(
        &self,
        job_id: &JobId,
        field: &str,
        value: &str,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        let record = state
            .records
            .get_mut(job_id)
            .ok_or_else(|| LedgerError::JobNotFound(job_id.clone()))?;

        let entry = record
            .fields
            .entry(field.to_owned())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        match entry {
            serde_json::Value::Array(items) => {
                items.push(serde_json::Value::String(value.to_owned()))
            }
            other => {
                let previous = other.take();
                *other = serde_json::Value::Array(vec![
                    previous,
                    serde_json::Value::String(value.to_owned()),
                ]);
            }
        }
        record.updated_at = Some(chrono::Utc::now());

        state.journal.push(LedgerWrite::Appended {
            job_id: job_id.clone(),
            field: field.to_owned(),
            value: value.to_owned(),
        });
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, LedgerError> {
        Ok(self.lock()?.records.get(job_id).cloned())
    }
}
