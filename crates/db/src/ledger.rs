//! [`ProgressLedger`] over the `jobs` table.
//!
//! Each write is a single `UPDATE` statement. PostgreSQL row locking makes
//! concurrent appends to the same job serialize on the row, and every
//! append re-reads the current document, so no entry is lost.

use async_trait::async_trait;
use lookbook_core::job::JobRecord;
use lookbook_core::ledger::{LedgerError, ProgressLedger};
use lookbook_core::patch::PatchDocument;
use lookbook_core::types::{JobId, Timestamp};
use sqlx::{FromRow, PgPool};

/// Column list for `jobs` queries.
const COLUMNS: &str = "id, progress, current_step, attributes, updated_at";

/// A row from the `jobs` table.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    progress: i16,
    current_step: String,
    attributes: serde_json::Value,
    updated_at: Timestamp,
}

impl JobRow {
    fn into_record(self) -> Result<JobRecord, LedgerError> {
        let id = JobId::new(self.id).map_err(|e| LedgerError::Backend(e.to_string()))?;
        let fields = match self.attributes {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Ok(JobRecord {
            id,
            progress: self.progress.clamp(0, 100) as u8,
            current_step: self.current_step,
            fields,
            updated_at: Some(self.updated_at),
        })
    }
}

fn backend(err: sqlx::Error) -> LedgerError {
    LedgerError::Backend(err.to_string())
}

/// Ledger backed by PostgreSQL.
#[derive(Clone)]
pub struct PgProgressLedger {
    pool: PgPool,
}

impl PgProgressLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressLedger for PgProgressLedger {
    async fn create(&self, job_id: &JobId, progress: u8, step: &str) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "INSERT INTO jobs (id, progress, current_step) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(job_id.as_str())
        .bind(i16::from(progress))
        .bind(step)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_patch(&self, job_id: &JobId, patch: &PatchDocument) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET progress = GREATEST(progress, $2), \
                 current_step = $3, \
                 attributes = attributes || $4::jsonb, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id.as_str())
        .bind(i16::from(patch.progress()))
        .bind(patch.current_step())
        .bind(patch.fields_json())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::JobNotFound(job_id.clone()));
        }
        tracing::debug!(
            job_id = %job_id,
            progress = patch.progress(),
            step = patch.current_step(),
            fields = patch.fields().len(),
            "Applied ledger patch",
        );
        Ok(())
    }

    async fn append_to_list(
        &self,
        job_id: &JobId,
        field: &str,
        value: &str,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET attributes = jsonb_set( \
                     attributes, \
                     ARRAY[$2::text], \
                     COALESCE(attributes -> $2::text, '[]'::jsonb) || jsonb_build_array($3::text), \
                     true), \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id.as_str())
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::JobNotFound(job_id.clone()));
        }
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, LedgerError> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(JobRow::into_record).transpose()
    }
}
