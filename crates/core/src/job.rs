//! Job record shape and the progress protocol shared with ledger watchers.
//!
//! A job record carries two protocol columns (`progress`, `currentStep`)
//! and a flat document of named fields. The field names below are the ones
//! the pipeline itself writes; attribution stages add arbitrary others.

use serde::Serialize;

use crate::types::{GarmentClass, JobId, Timestamp};

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

/// Reserved protocol key for the 0-100 progress value.
pub const FIELD_PROGRESS: &str = "progress";
/// Reserved protocol key for the human-readable phase label.
pub const FIELD_CURRENT_STEP: &str = "currentStep";

/// Keys that content fields may never use.
pub const RESERVED_FIELDS: &[&str] = &[FIELD_PROGRESS, FIELD_CURRENT_STEP];

pub const FIELD_GARMENT_TYPE: &str = "garmentType";
pub const FIELD_REFERENCE_IMAGES: &str = "referenceImages";
pub const FIELD_OUTPUT_IMAGES: &str = "outputImages";
pub const FIELD_IMAGE_PROMPT: &str = "imageGeneratorPrompt";

/// Namespace (bucket) every blob key on the record resolves against.
pub const FIELD_IMAGE_BUCKET: &str = "imageBucket";
/// Orchestrator execution that drives the job, when known.
pub const FIELD_EXECUTION_ID: &str = "executionId";
pub const FIELD_INPUT_PATH: &str = "inputPath";
pub const FIELD_ATTRIBUTION_PROMPT: &str = "attributionPrompt";

// Label-derived product fields.
pub const FIELD_PARENT_CATEGORIES: &str = "parentCategories";
pub const FIELD_ROOT_CATEGORY: &str = "rootCategory";
pub const FIELD_BOUNDING_BOX: &str = "boundingBox";
pub const FIELD_COLOR_PALETTE: &str = "colorPalette";
pub const FIELD_CATEGORY_TAGS: &str = "categoryTags";
pub const FIELD_ALIAS_TAGS: &str = "aliasTags";

// ---------------------------------------------------------------------------
// Progress steps
// ---------------------------------------------------------------------------

/// A progress value paired with the label a watcher displays for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStep {
    pub progress: u8,
    pub label: &'static str,
}

pub const STEP_LABELS_RECORDED: ProgressStep = ProgressStep {
    progress: 33,
    label: "Label and categories generated",
};

pub const STEP_PRODUCT_ATTRIBUTION: ProgressStep = ProgressStep {
    progress: 66,
    label: "Product Attribution Generated",
};

pub const STEP_TEMPLATE_LOADED: ProgressStep = ProgressStep {
    progress: 40,
    label: "Prompt Template Loaded",
};

pub const STEP_ATTRIBUTION_DONE: ProgressStep = ProgressStep {
    progress: 100,
    label: "Attribution Generated",
};

pub const STEP_GENERATING_IMAGES: ProgressStep = ProgressStep {
    progress: 80,
    label: "Generating images",
};

pub const STEP_IMAGES_GENERATED: ProgressStep = ProgressStep {
    progress: 100,
    label: "Images Generated",
};

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// Snapshot of one job as read back from the ledger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub progress: u8,
    pub current_step: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub updated_at: Option<Timestamp>,
}

impl JobRecord {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            progress: 0,
            current_step: String::new(),
            fields: serde_json::Map::new(),
            updated_at: None,
        }
    }

    /// A text field, if present and a string.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_str())
    }

    /// A list field as owned strings. Missing fields read as empty.
    pub fn list(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn garment_type(&self) -> Option<GarmentClass> {
        self.text(FIELD_GARMENT_TYPE)?.parse().ok()
    }

    pub fn reference_images(&self) -> Vec<String> {
        self.list(FIELD_REFERENCE_IMAGES)
    }

    /// Completed try-on composites, in completion order.
    pub fn output_images(&self) -> Vec<String> {
        self.list(FIELD_OUTPUT_IMAGES)
    }
}
