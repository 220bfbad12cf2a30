//! Bounded try-on fan-out.
//!
//! One spawned task per model image, at most `min(max_concurrency, tasks)`
//! holding a permit at once. Tasks run on the runtime's worker threads, so
//! payload decoding for sibling tasks proceeds in parallel on a
//! multi-threaded runtime. Each task is split in two steps:
//!
//! 1. [`compose`](TryOnExecutor::compose): gateway call, decode, blob writes.
//!    Produces a [`TryOnResult`] and never touches the ledger.
//! 2. [`commit`](TryOnExecutor::commit): appends the output key to
//!    `outputImages` for a success, nothing for a failure.
//!
//! Task failures stay inside the batch. Ledger failures do not: once every
//! dispatched task has settled the stage returns the ledger error and skips
//! the final status write. Otherwise exactly one final write at 100% is
//! issued, even when every task failed.

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lookbook_core::gateway::{GatewayError, TryOnRequest};
use lookbook_core::job::{FIELD_OUTPUT_IMAGES, STEP_IMAGES_GENERATED};
use lookbook_core::ledger::LedgerError;
use lookbook_core::patch::PatchDocument;
use lookbook_core::storage::{mask_image_key, output_content_type, output_image_key, StorageError};
use lookbook_core::types::{GarmentClass, JobId};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::calls::{random_seed, with_timeout};
use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::images::{ClothImage, ModelImage};

/// Number of tasks allowed in flight for a batch of `tasks`.
pub fn concurrency_width(ceiling: usize, tasks: usize) -> usize {
    ceiling.min(tasks)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSuccess {
    /// 1-based position of the model image in the batch.
    pub index: usize,
    pub output_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryOnResult {
    Succeeded(TaskSuccess),
    Failed(TaskFailure),
}

impl TryOnResult {
    pub fn index(&self) -> usize {
        match self {
            Self::Succeeded(s) => s.index,
            Self::Failed(f) => f.index,
        }
    }
}

/// Settled results of one batch, each list ordered by task index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: Vec<TaskSuccess>,
    pub failed: Vec<TaskFailure>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[derive(Debug, thiserror::Error)]
enum TaskError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Try-on response contained no image")]
    NoImage,

    #[error("Could not decode try-on image: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct TryOnExecutor<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> TryOnExecutor<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Run one try-on task per model image and write the final status.
    pub async fn run(
        &self,
        job_id: &JobId,
        cloth: &ClothImage,
        garment: GarmentClass,
        models: &[ModelImage],
    ) -> Result<BatchOutcome, PipelineError> {
        let width = concurrency_width(self.ctx.config.max_concurrency, models.len());
        tracing::info!(
            job_id = %job_id,
            tasks = models.len(),
            width,
            garment_type = %garment,
            "Starting try-on batch",
        );

        let permits = Arc::new(Semaphore::new(width.max(1)));
        let cloth = Arc::new(cloth.clone());
        let mut tasks = JoinSet::new();
        for (offset, model) in models.iter().enumerate() {
            let ctx = self.ctx.clone();
            let permits = Arc::clone(&permits);
            let cloth = Arc::clone(&cloth);
            let model = model.clone();
            let job_id = job_id.clone();
            let index = offset + 1;
            tasks.spawn(async move {
                // The semaphore is never closed, so this only waits.
                let _permit = permits.acquire_owned().await;
                let executor = TryOnExecutor::new(&ctx);
                let result = executor.compose(&cloth, garment, index, &model).await;
                let committed = executor.commit(&job_id, &result).await;
                (result, committed)
            });
        }

        let mut outcome = BatchOutcome::default();
        let mut ledger_error = None;
        let mut reported = BTreeSet::new();
        while let Some(joined) = tasks.join_next().await {
            let (result, committed) = match joined {
                Ok(settled) => settled,
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Try-on task aborted");
                    continue;
                }
            };
            reported.insert(result.index());
            if let Err(e) = committed {
                tracing::error!(
                    job_id = %job_id,
                    index = result.index(),
                    error = %e,
                    "Failed to record try-on output",
                );
                if ledger_error.is_none() {
                    ledger_error = Some(e);
                }
            }
            match result {
                TryOnResult::Succeeded(success) => outcome.succeeded.push(success),
                TryOnResult::Failed(failure) => outcome.failed.push(failure),
            }
        }
        // A task that panicked never reported back; it still counts as failed.
        for index in (1..=models.len()).filter(|i| !reported.contains(i)) {
            outcome.failed.push(TaskFailure {
                index,
                error: "Try-on task aborted".into(),
            });
        }
        if let Some(e) = ledger_error {
            return Err(e.into());
        }

        outcome.succeeded.sort_by_key(|s| s.index);
        outcome.failed.sort_by_key(|f| f.index);

        if outcome.failed.is_empty() {
            tracing::info!(
                job_id = %job_id,
                succeeded = outcome.succeeded.len(),
                "Try-on batch complete",
            );
        } else {
            tracing::warn!(
                job_id = %job_id,
                succeeded = outcome.succeeded.len(),
                failed = outcome.failed.len(),
                "Try-on batch complete with failures",
            );
        }

        self.ctx
            .ledger
            .apply_patch(job_id, &PatchDocument::for_step(STEP_IMAGES_GENERATED))
            .await?;
        Ok(outcome)
    }

    /// Produce the composite for one task and persist its blobs.
    pub async fn compose(
        &self,
        cloth: &ClothImage,
        garment: GarmentClass,
        index: usize,
        model: &ModelImage,
    ) -> TryOnResult {
        match self.try_compose(cloth, garment, index, model).await {
            Ok(success) => {
                tracing::debug!(index, key = %success.output_key, "Try-on task succeeded");
                TryOnResult::Succeeded(success)
            }
            Err(e) => {
                tracing::warn!(index, source = %model.key, error = %e, "Try-on task failed");
                TryOnResult::Failed(TaskFailure {
                    index,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Ledger side effect of one settled task.
    pub async fn commit(&self, job_id: &JobId, result: &TryOnResult) -> Result<(), LedgerError> {
        match result {
            TryOnResult::Succeeded(success) => {
                self.ctx
                    .ledger
                    .append_to_list(job_id, FIELD_OUTPUT_IMAGES, &success.output_key)
                    .await
            }
            TryOnResult::Failed(_) => Ok(()),
        }
    }

    async fn try_compose(
        &self,
        cloth: &ClothImage,
        garment: GarmentClass,
        index: usize,
        model: &ModelImage,
    ) -> Result<TaskSuccess, TaskError> {
        let request = TryOnRequest {
            source_image: &model.bytes,
            reference_image: &cloth.bytes,
            garment_class: garment,
            seed: random_seed(),
        };
        let response = with_timeout(
            self.ctx.config.gateway_timeout,
            self.ctx.gateway.virtual_try_on(&request),
        )
        .await?;

        let encoded = response.images.first().ok_or(TaskError::NoImage)?;
        let image = STANDARD.decode(encoded)?;
        let output_key = output_image_key(&cloth.key, index);
        self.ctx
            .blobs
            .put(&output_key, image, output_content_type())
            .await?;

        let mask_key = match &response.mask_image {
            Some(mask) => self.persist_mask(&cloth.key, index, mask).await,
            None => None,
        };

        Ok(TaskSuccess {
            index,
            output_key,
            mask_key,
        })
    }

    /// Best effort: a mask that cannot be stored leaves the task successful.
    async fn persist_mask(&self, cloth_key: &str, index: usize, encoded: &str) -> Option<String> {
        let key = mask_image_key(cloth_key, index);
        let stored = match STANDARD.decode(encoded) {
            Ok(bytes) => self
                .ctx
                .blobs
                .put(&key, bytes, output_content_type())
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match stored {
            Ok(()) => Some(key),
            Err(error) => {
                tracing::warn!(index, key = %key, error = %error, "Failed to store try-on mask");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_never_exceeds_work_or_ceiling() {
        assert_eq!(concurrency_width(10, 3), 3);
        assert_eq!(concurrency_width(2, 5), 2);
        assert_eq!(concurrency_width(4, 0), 0);
    }

    #[test]
    fn outcome_serializes_camel_case() {
        let outcome = BatchOutcome {
            succeeded: vec![TaskSuccess {
                index: 1,
                output_key: "output/shirt/1.jpg".into(),
                mask_key: None,
            }],
            failed: vec![TaskFailure {
                index: 2,
                error: "Gateway call timed out after 1s".into(),
            }],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["succeeded"][0]["outputKey"], "output/shirt/1.jpg");
        assert!(json["succeeded"][0].get("maskKey").is_none());
        assert_eq!(json["failed"][0]["index"], 2);
        assert_eq!(outcome.total(), 2);
    }
}
