//! Try-on stage entry point.

use lookbook_core::types::JobId;
use serde::Deserialize;

use crate::classifier::classify_garment;
use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::executor::{BatchOutcome, TryOnExecutor};
use crate::images::ClothImage;
use crate::model_images::{GenerationParams, ModelImageProvider};

/// Input for one invocation of the try-on stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnStageRequest {
    pub job_id: JobId,
    /// Blob key of the garment photo, e.g. `input/shirt.png`.
    pub cloth_key: String,
    pub params: GenerationParams,
    /// Blob key of a captured person image; skips generation when set.
    #[serde(default)]
    pub human_model_key: Option<String>,
}

pub struct TryOnStage<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> TryOnStage<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Resolve model images, classify the garment, record both in a single
    /// ledger write, then run the try-on fan-out.
    pub async fn classify_and_run_try_on(
        &self,
        request: &TryOnStageRequest,
    ) -> Result<BatchOutcome, PipelineError> {
        let job_id = &request.job_id;
        tracing::info!(job_id = %job_id, cloth_key = %request.cloth_key, "Try-on stage started");

        let cloth = ClothImage::new(
            request.cloth_key.clone(),
            self.ctx.blobs.get(&request.cloth_key).await?,
        );

        let provider = ModelImageProvider::new(self.ctx);
        let models = provider
            .resolve(
                job_id,
                &cloth,
                &request.params,
                request.human_model_key.as_deref(),
            )
            .await?;

        let garment = classify_garment(self.ctx, &cloth.bytes, cloth.extension()).await;

        provider.record(job_id, &models, &cloth.key, garment).await?;

        TryOnExecutor::new(self.ctx)
            .run(job_id, &cloth, garment, &models.images)
            .await
    }
}
