//! Service wiring and stage dispatch.

use std::sync::Arc;

use anyhow::Context;
use lookbook_cloud::{LocalBlobStore, S3BlobStore};
use lookbook_core::ledger::ProgressLedger;
use lookbook_core::storage::BlobStore;
use lookbook_db::PgProgressLedger;
use lookbook_gateway::HttpModelGateway;
use lookbook_pipeline::attribution::{AttributionStage, TemplateLibrary};
use lookbook_pipeline::product_attribution::ProductAttributionStage;
use lookbook_pipeline::{PipelineContext, TryOnStage};
use serde_json::Value;

use crate::config::{BlobBackend, WorkerConfig};
use crate::event::{AttributionEvent, ProductAttributionEvent, StageEvent, TryOnEvent};

/// Step label for a record the try-on stage had to create itself.
pub const QUEUED_STEP: &str = "Queued";

/// Connect every external collaborator described by `config`.
pub async fn connect(config: &WorkerConfig) -> anyhow::Result<PipelineContext> {
    let pool = lookbook_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    lookbook_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    lookbook_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    let ledger = Arc::new(PgProgressLedger::new(pool));

    let blobs: Arc<dyn BlobStore> = match &config.blobs {
        BlobBackend::S3 { bucket } => {
            tracing::info!(bucket = %bucket, "Using S3 blob store");
            Arc::new(S3BlobStore::from_env(bucket.clone()).await)
        }
        BlobBackend::Local { root } => {
            tracing::info!(root = %root.display(), "Using local blob store");
            Arc::new(LocalBlobStore::new(root.clone()))
        }
    };

    let gateway = Arc::new(
        HttpModelGateway::new(config.gateway.clone()).context("Failed to build gateway client")?,
    );

    Ok(PipelineContext::new(
        gateway,
        blobs,
        ledger,
        config.pipeline.clone(),
    ))
}

/// Run the try-on stage and return its [`BatchOutcome`] as JSON.
///
/// [`BatchOutcome`]: lookbook_pipeline::BatchOutcome
pub async fn run_try_on(
    ctx: &PipelineContext,
    event: StageEvent<TryOnEvent>,
) -> anyhow::Result<Value> {
    let request = event.data.into_request();

    // Appends need an existing record; normally an earlier stage made it.
    if ctx.ledger.create(&request.job_id, 0, QUEUED_STEP).await? {
        tracing::info!(job_id = %request.job_id, "Created missing job record");
    }

    let outcome = TryOnStage::new(ctx)
        .classify_and_run_try_on(&request)
        .await
        .with_context(|| format!("Try-on stage failed for job {}", request.job_id))?;
    Ok(serde_json::to_value(outcome)?)
}

pub async fn run_attribution(
    ctx: &PipelineContext,
    templates: &TemplateLibrary,
    event: StageEvent<AttributionEvent>,
) -> anyhow::Result<Value> {
    let request = event.data.into_request(event.execution_id);
    let outcome = AttributionStage::new(ctx, templates)
        .run(&request)
        .await
        .with_context(|| format!("Attribution stage failed for job {}", request.job_id))?;
    Ok(serde_json::to_value(outcome)?)
}

pub async fn run_product_attribution(
    ctx: &PipelineContext,
    templates: &TemplateLibrary,
    event: StageEvent<ProductAttributionEvent>,
) -> anyhow::Result<Value> {
    let request = event.data.into_request(event.execution_id);
    let outcome = ProductAttributionStage::new(ctx, templates)
        .run(&request)
        .await
        .with_context(|| format!("Product attribution failed for job {}", request.job_id))?;
    Ok(serde_json::to_value(outcome)?)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use lookbook_core::gateway::{
        ConverseRequest, ConverseResponse, GatewayError, ModelGateway, TextToImageRequest,
        TryOnRequest, TryOnResponse,
    };
    use lookbook_core::memory::{InMemoryBlobStore, InMemoryLedger};
    use lookbook_core::types::JobId;
    use lookbook_pipeline::PipelineConfig;

    use super::*;
    use crate::event::parse_event;

    struct DownGateway;

    #[async_trait]
    impl ModelGateway for DownGateway {
        async fn generate_images(
            &self,
            _request: &TextToImageRequest,
        ) -> Result<Vec<String>, GatewayError> {
            Err(GatewayError::Transport("down".into()))
        }

        async fn converse(
            &self,
            _request: &ConverseRequest<'_>,
        ) -> Result<ConverseResponse, GatewayError> {
            Err(GatewayError::Transport("down".into()))
        }

        async fn virtual_try_on(
            &self,
            _request: &TryOnRequest<'_>,
        ) -> Result<TryOnResponse, GatewayError> {
            Err(GatewayError::Transport("down".into()))
        }
    }

    #[tokio::test]
    async fn try_on_creates_missing_record_and_reports_failures() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        blobs.insert("input/shirt.png", b"cloth".to_vec(), "image/png");
        blobs.insert("uploads/cam.png", b"person".to_vec(), "image/png");
        let ledger = Arc::new(InMemoryLedger::new());
        let ctx = PipelineContext::new(
            Arc::new(DownGateway),
            blobs,
            ledger.clone(),
            PipelineConfig::default(),
        );

        let event = parse_event::<TryOnEvent>(
            r#"{"id":"w-1","path":"input/shirt.png","influenceGender":"male",
                "influenceImagePose":"standing","influenceImageEmotion":"calm",
                "influenceImageBodyStructure":"slim","influenceImageNumImages":1,
                "humanModel":"uploads/cam.png"}"#,
        )
        .unwrap();

        let result = run_try_on(&ctx, event).await.unwrap();
        assert_eq!(result["succeeded"].as_array().unwrap().len(), 0);
        assert_eq!(result["failed"][0]["index"], 1);

        let record = ledger
            .get(&JobId::new("w-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.progress, 100);
        assert_eq!(record.text("garmentType"), Some("UPPER_BODY"));
    }
}
