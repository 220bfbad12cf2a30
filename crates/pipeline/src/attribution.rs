//! Product attribution stage.
//!
//! Loads a use-case prompt template, sends it together with the product
//! images to the text model, and stores the flat JSON object the model
//! answers with as individual job fields.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use lookbook_core::error::CoreError;
use lookbook_core::gateway::{ContentBlock, ConverseRequest, TextModel};
use lookbook_core::job::{
    ProgressStep, FIELD_EXECUTION_ID, FIELD_IMAGE_BUCKET, STEP_ATTRIBUTION_DONE,
    STEP_TEMPLATE_LOADED,
};
use lookbook_core::patch::{build_attribute_patch, PatchDocument};
use lookbook_core::types::{ImageFormat, JobId};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::calls::with_timeout;
use crate::completion::parse_flat_object;
use crate::context::PipelineContext;
use crate::error::PipelineError;

const TEMPLATE_SUFFIX: &str = "-template.txt";
const MAX_TOKENS: u32 = 4000;
const TEMPERATURE: f32 = 1.0;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z][A-Za-z0-9_-]*)\}").expect("valid regex"));

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Prompt templates keyed by lower-case use case.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: HashMap<String, String>,
}

impl TemplateLibrary {
    /// Load every `<use-case>-template.txt` file in `dir`.
    pub async fn load_dir(dir: &Path) -> Result<Self, PipelineError> {
        let read_err = |e: std::io::Error| {
            PipelineError::Template(format!("cannot read {}: {e}", dir.display()))
        };
        let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
        let mut templates = HashMap::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(use_case) = name.strip_suffix(TEMPLATE_SUFFIX) else {
                continue;
            };
            let body = tokio::fs::read_to_string(entry.path())
                .await
                .map_err(|e| PipelineError::Template(format!("cannot read {name}: {e}")))?;
            templates.insert(use_case.to_lowercase(), body);
        }
        tracing::info!(dir = %dir.display(), count = templates.len(), "Loaded prompt templates");
        Ok(Self { templates })
    }

    pub fn from_templates<I, K, V>(templates: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            templates: templates
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v.into()))
                .collect(),
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, use_case: &str) -> Option<&str> {
        self.templates.get(&use_case.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Replace `{name}` placeholders with values from `values`. Placeholders
/// without a value are left as they are.
pub fn fill_template(template: &str, values: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_owned(),
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionRequest {
    pub job_id: JobId,
    pub use_case: String,
    /// Blob keys of the product images, sent to the model in order.
    pub paths: Vec<String>,
    /// Values substituted into the template placeholders.
    #[serde(default)]
    pub influences: BTreeMap<String, String>,
    /// Orchestrator execution driving the job.
    #[serde(default)]
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionOutcome {
    pub id: JobId,
    pub use_case: String,
    pub paths: Vec<String>,
    /// Raw model completion.
    pub completion: String,
    /// Names of the fields written to the job record.
    pub fields: Vec<String>,
}

pub struct AttributionStage<'a> {
    ctx: &'a PipelineContext,
    templates: &'a TemplateLibrary,
}

impl<'a> AttributionStage<'a> {
    pub fn new(ctx: &'a PipelineContext, templates: &'a TemplateLibrary) -> Self {
        Self { ctx, templates }
    }

    pub async fn run(
        &self,
        request: &AttributionRequest,
    ) -> Result<AttributionOutcome, PipelineError> {
        let job_id = &request.job_id;
        let template = self.templates.get(&request.use_case).ok_or_else(|| {
            PipelineError::Template(format!("no template for use case '{}'", request.use_case))
        })?;
        if request.paths.is_empty() {
            return Err(
                CoreError::Validation("attribution needs at least one image".into()).into(),
            );
        }
        let prompt = fill_template(template, &request.influences);

        let loaded = job_patch(
            self.ctx,
            STEP_TEMPLATE_LOADED,
            request.execution_id.as_deref(),
        )?;
        open_job(self.ctx, job_id, &loaded).await?;

        let images = read_images(self.ctx, &request.paths).await?;
        let completion = request_completion(self.ctx, job_id, &images, prompt).await?;
        let patch = record_completion(self.ctx, job_id, &completion, STEP_ATTRIBUTION_DONE).await?;

        Ok(AttributionOutcome {
            id: job_id.clone(),
            use_case: request.use_case.clone(),
            paths: request.paths.clone(),
            completion,
            fields: patch.fields().keys().cloned().collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Shared stage steps
// ---------------------------------------------------------------------------

/// A patch for `step` carrying the blob namespace and, when known, the
/// orchestrator execution id.
pub(crate) fn job_patch(
    ctx: &PipelineContext,
    step: ProgressStep,
    execution_id: Option<&str>,
) -> Result<PatchDocument, PipelineError> {
    let mut patch =
        PatchDocument::for_step(step).with_field(FIELD_IMAGE_BUCKET, ctx.blobs.namespace())?;
    if let Some(execution_id) = execution_id.filter(|id| !id.is_empty()) {
        patch.insert(FIELD_EXECUTION_ID, execution_id)?;
    }
    Ok(patch)
}

/// Create the job record if needed, then apply `patch` to it.
pub(crate) async fn open_job(
    ctx: &PipelineContext,
    job_id: &JobId,
    patch: &PatchDocument,
) -> Result<(), PipelineError> {
    let created = ctx
        .ledger
        .create(job_id, patch.progress(), patch.current_step())
        .await?;
    ctx.ledger.apply_patch(job_id, patch).await?;
    tracing::debug!(job_id = %job_id, created, step = patch.current_step(), "Job opened");
    Ok(())
}

pub(crate) async fn read_images(
    ctx: &PipelineContext,
    paths: &[String],
) -> Result<Vec<(ImageFormat, Vec<u8>)>, PipelineError> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let format = ImageFormat::from_key(path).ok_or_else(|| {
            CoreError::Validation(format!("unsupported image format for '{path}'"))
        })?;
        images.push((format, ctx.blobs.get(path).await?));
    }
    Ok(images)
}

/// Send the images followed by the prompt to the attribution model.
pub(crate) async fn request_completion(
    ctx: &PipelineContext,
    job_id: &JobId,
    images: &[(ImageFormat, Vec<u8>)],
    prompt: String,
) -> Result<String, PipelineError> {
    let mut content: Vec<ContentBlock<'_>> = images
        .iter()
        .map(|(format, bytes)| ContentBlock::Image {
            format: *format,
            bytes: bytes.as_slice(),
        })
        .collect();
    content.push(ContentBlock::Text(prompt));

    let request = ConverseRequest {
        model: TextModel::Attribution,
        system: None,
        content,
        max_tokens: Some(MAX_TOKENS),
        temperature: Some(TEMPERATURE),
    };
    let response = with_timeout(ctx.config.gateway_timeout, ctx.gateway.converse(&request)).await?;

    if let Some(usage) = response.usage {
        tracing::info!(
            job_id = %job_id,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Attribution token usage",
        );
    }
    Ok(response.text)
}

/// Store the flat JSON object in `completion` as job fields at `step`.
pub(crate) async fn record_completion(
    ctx: &PipelineContext,
    job_id: &JobId,
    completion: &str,
    step: ProgressStep,
) -> Result<PatchDocument, PipelineError> {
    let fields = parse_flat_object(completion)?;
    let patch = build_attribute_patch(&fields, step.progress, step.label)?;
    ctx.ledger.apply_patch(job_id, &patch).await?;
    tracing::info!(
        job_id = %job_id,
        fields = patch.fields().len(),
        step = step.label,
        "Attribution recorded",
    );
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn known_placeholders_are_substituted() {
        let filled = fill_template(
            "Write copy in a {brand-voice} voice for a {influenceImagePose} pose.",
            &values(&[
                ("brand-voice", "playful"),
                ("influenceImagePose", "walking"),
            ]),
        );
        assert_eq!(filled, "Write copy in a playful voice for a walking pose.");
    }

    #[test]
    fn unknown_placeholders_stay_intact() {
        let filled = fill_template("Price: {influence-price}, json: {\"a\": 1}", &values(&[]));
        assert_eq!(filled, "Price: {influence-price}, json: {\"a\": 1}");
    }

    #[test]
    fn library_lookup_ignores_case() {
        let library = TemplateLibrary::from_templates([("Clothing", "Describe {label}")]);
        assert_eq!(library.get("CLOTHING"), Some("Describe {label}"));
        assert_eq!(library.get("furniture"), None);
        assert_eq!(library.len(), 1);
    }

    #[tokio::test]
    async fn load_dir_picks_up_template_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Clothing-template.txt"), "clothes").unwrap();
        std::fs::write(dir.path().join("furniture-template.txt"), "chairs").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let library = TemplateLibrary::load_dir(dir.path()).await.unwrap();
        assert_eq!(library.len(), 2);
        assert_eq!(library.get("clothing"), Some("clothes"));
        assert_eq!(library.get("furniture"), Some("chairs"));
    }

    #[tokio::test]
    async fn load_dir_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            TemplateLibrary::load_dir(&missing).await,
            Err(PipelineError::Template(_))
        ));
    }
}
