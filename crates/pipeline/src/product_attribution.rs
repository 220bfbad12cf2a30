//! Label-driven product attribution, the first stage of the catalog
//! workflow.
//!
//! Turns a label-detection result into category and colour fields (33%),
//! then asks the text model to describe the detected product using the
//! clothing template and stores its answer (66%). The try-on stage picks
//! the job up from there.

use std::collections::BTreeMap;

use lookbook_core::error::CoreError;
use lookbook_core::job::{
    FIELD_ALIAS_TAGS, FIELD_ATTRIBUTION_PROMPT, FIELD_BOUNDING_BOX, FIELD_CATEGORY_TAGS,
    FIELD_COLOR_PALETTE, FIELD_INPUT_PATH, FIELD_PARENT_CATEGORIES, FIELD_ROOT_CATEGORY,
    STEP_LABELS_RECORDED, STEP_PRODUCT_ATTRIBUTION,
};
use lookbook_core::patch::PatchDocument;
use lookbook_core::types::JobId;
use serde::{Deserialize, Serialize};

use crate::attribution::{
    fill_template, job_patch, open_job, read_images, record_completion, request_completion,
    TemplateLibrary,
};
use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::labels::{join_tags, BoundingBox, LabelDetection, LabelSummary};

/// Template used for every label-driven attribution.
pub const PRODUCT_USE_CASE: &str = "clothing";

/// Placeholder filled with the detected product label.
const LABEL_PLACEHOLDER: &str = "label";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAttributionRequest {
    pub job_id: JobId,
    /// Blob key of the product image the labels were detected on.
    pub path: String,
    pub labels: LabelDetection,
    /// Template values besides the label itself.
    #[serde(default)]
    pub influences: BTreeMap<String, String>,
    #[serde(default)]
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAttributionOutcome {
    pub id: JobId,
    pub path: String,
    pub detected_label: String,
    pub parent_categories: String,
    pub bounding_box: BoundingBox,
    pub color_palette: Vec<String>,
    pub category_tags: String,
    pub alias_tags: String,
    /// Raw model completion.
    pub completion: String,
    /// Names of the fields the completion added to the job record.
    pub fields: Vec<String>,
}

pub struct ProductAttributionStage<'a> {
    ctx: &'a PipelineContext,
    templates: &'a TemplateLibrary,
}

impl<'a> ProductAttributionStage<'a> {
    pub fn new(ctx: &'a PipelineContext, templates: &'a TemplateLibrary) -> Self {
        Self { ctx, templates }
    }

    pub async fn run(
        &self,
        request: &ProductAttributionRequest,
    ) -> Result<ProductAttributionOutcome, PipelineError> {
        let job_id = &request.job_id;
        let template = self.templates.get(PRODUCT_USE_CASE).ok_or_else(|| {
            PipelineError::Template(format!("no template for use case '{PRODUCT_USE_CASE}'"))
        })?;
        let summary = LabelSummary::from_labels(&request.labels.labels)?;

        let mut values = request.influences.clone();
        values.insert(LABEL_PLACEHOLDER.into(), summary.root_category.clone());
        let prompt = fill_template(template, &values);

        let labelled = self.labels_patch(request, &summary, &prompt)?;
        open_job(self.ctx, job_id, &labelled).await?;
        tracing::info!(
            job_id = %job_id,
            label = %summary.root_category,
            categories = %summary.category_path(),
            "Product labels recorded",
        );

        let images = read_images(self.ctx, std::slice::from_ref(&request.path)).await?;
        let completion = request_completion(self.ctx, job_id, &images, prompt).await?;
        let patch =
            record_completion(self.ctx, job_id, &completion, STEP_PRODUCT_ATTRIBUTION).await?;

        Ok(ProductAttributionOutcome {
            id: job_id.clone(),
            path: request.path.clone(),
            detected_label: summary.root_category.clone(),
            parent_categories: summary.category_path(),
            bounding_box: summary.bounding_box,
            color_palette: summary.color_palette.clone(),
            category_tags: join_tags(&summary.category_tags),
            alias_tags: join_tags(&summary.alias_tags),
            completion,
            fields: patch.fields().keys().cloned().collect(),
        })
    }

    fn labels_patch(
        &self,
        request: &ProductAttributionRequest,
        summary: &LabelSummary,
        prompt: &str,
    ) -> Result<PatchDocument, PipelineError> {
        let bounding_box = serde_json::to_string(&summary.bounding_box)
            .map_err(|e| CoreError::Internal(format!("bounding box: {e}")))?;
        let execution_id = request.execution_id.as_deref();
        let patch = job_patch(self.ctx, STEP_LABELS_RECORDED, execution_id)?
            .with_field(FIELD_INPUT_PATH, request.path.as_str())?
            .with_field(FIELD_ROOT_CATEGORY, summary.root_category.as_str())?
            .with_field(FIELD_PARENT_CATEGORIES, summary.category_path())?
            .with_field(FIELD_BOUNDING_BOX, bounding_box)?
            .with_field(FIELD_COLOR_PALETTE, join_tags(&summary.color_palette))?
            .with_field(FIELD_CATEGORY_TAGS, join_tags(&summary.category_tags))?
            .with_field(FIELD_ALIAS_TAGS, join_tags(&summary.alias_tags))?
            .with_field(FIELD_ATTRIBUTION_PROMPT, prompt)?;
        Ok(patch)
    }
}
