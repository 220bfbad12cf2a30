//! Stage events sent by the workflow orchestrator.
//!
//! Events arrive either bare or wrapped in an envelope of the form
//! `{"data": {...}, "executionId": "..."}`; the execution id is kept for the
//! job record. Form fields are loosely typed: the image count may come as a
//! number or a numeric string, and an empty `humanModel` means "none".

use std::collections::BTreeMap;

use lookbook_core::types::JobId;
use lookbook_pipeline::attribution::AttributionRequest;
use lookbook_pipeline::labels::LabelDetection;
use lookbook_pipeline::model_images::GenerationParams;
use lookbook_pipeline::product_attribution::ProductAttributionRequest;
use lookbook_pipeline::TryOnStageRequest;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped {
        data: T,
        #[serde(rename = "executionId")]
        execution_id: Option<String>,
    },
    Bare(T),
}

/// A parsed stage event and the execution that sent it, if any.
#[derive(Debug, Clone)]
pub struct StageEvent<T> {
    pub data: T,
    pub execution_id: Option<String>,
}

/// Parse a stage event, unwrapping the orchestrator envelope if present.
pub fn parse_event<T: DeserializeOwned>(text: &str) -> Result<StageEvent<T>, serde_json::Error> {
    match serde_json::from_str::<Envelope<T>>(text)? {
        Envelope::Wrapped { data, execution_id } => {
            if let Some(execution_id) = &execution_id {
                tracing::debug!(execution_id = %execution_id, "Received wrapped stage event");
            }
            Ok(StageEvent { data, execution_id })
        }
        Envelope::Bare(data) => Ok(StageEvent {
            data,
            execution_id: None,
        }),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnEvent {
    pub id: JobId,
    /// Blob key of the cloth image.
    pub path: String,
    pub influence_gender: String,
    pub influence_image_pose: String,
    pub influence_image_emotion: String,
    pub influence_image_body_structure: String,
    #[serde(deserialize_with = "number_or_string")]
    pub influence_image_num_images: u32,
    #[serde(default)]
    pub human_model: Option<String>,
}

impl TryOnEvent {
    pub fn into_request(self) -> TryOnStageRequest {
        TryOnStageRequest {
            job_id: self.id,
            cloth_key: self.path,
            params: GenerationParams {
                gender: self.influence_gender,
                pose: self.influence_image_pose,
                emotion: self.influence_image_emotion,
                body_structure: self.influence_image_body_structure,
                count: self.influence_image_num_images,
            },
            human_model_key: self.human_model.filter(|key| !key.trim().is_empty()),
        }
    }
}

/// Attribution event. Every field besides `id`, `useCase` and `paths` is a
/// template influence.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionEvent {
    pub id: JobId,
    pub use_case: String,
    pub paths: Vec<String>,
    #[serde(flatten)]
    pub influences: BTreeMap<String, Value>,
}

impl AttributionEvent {
    pub fn into_request(self, execution_id: Option<String>) -> AttributionRequest {
        AttributionRequest {
            job_id: self.id,
            use_case: self.use_case,
            paths: self.paths,
            influences: influence_values(self.influences),
            execution_id,
        }
    }
}

/// Event of the label-driven attribution stage: the product image, the
/// label-detection result for it, and the form's influence fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductAttributionEvent {
    pub id: JobId,
    pub path: String,
    pub rekognition: LabelDetection,
    #[serde(flatten)]
    pub influences: BTreeMap<String, Value>,
}

/// Template placeholders that read a differently named form field.
const PLACEHOLDER_SOURCES: &[(&str, &str)] = &[
    ("brand-voice", "influenceBrandVoice"),
    ("usp", "influenceBrandStrength"),
    ("influence-price", "influencePrice"),
];

impl ProductAttributionEvent {
    pub fn into_request(self, execution_id: Option<String>) -> ProductAttributionRequest {
        let mut influences = influence_values(self.influences);
        for (placeholder, source) in PLACEHOLDER_SOURCES {
            if let Some(value) = influences.get(*source).cloned() {
                influences.insert((*placeholder).to_owned(), value);
            }
        }
        ProductAttributionRequest {
            job_id: self.id,
            path: self.path,
            labels: self.rekognition,
            influences,
            execution_id,
        }
    }
}

fn influence_values(raw: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    raw.into_iter()
        .filter_map(|(name, value)| influence_text(value).map(|text| (name, text)))
        .collect()
}

/// Template text for an influence value. Flags read as `Yes`/`No`.
fn influence_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(true) => Some("Yes".into()),
        Value::Bool(false) => Some("No".into()),
        other => Some(other.to_string()),
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
