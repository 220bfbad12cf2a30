//! Typed ledger update documents and the attribute patch builder.
//!
//! A [`PatchDocument`] is applied by the ledger as one atomic update: the
//! protocol columns and every content field land together or not at all.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::CoreError;
use crate::job::{ProgressStep, RESERVED_FIELDS};

/// Highest legal progress value.
pub const MAX_PROGRESS: u8 = 100;

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// A content field value. Ledger fields are either text or a list of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            ),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

// ---------------------------------------------------------------------------
// PatchDocument
// ---------------------------------------------------------------------------

/// One atomic ledger update: protocol fields plus named content fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchDocument {
    progress: u8,
    current_step: String,
    fields: BTreeMap<String, FieldValue>,
}

impl PatchDocument {
    /// A patch that only advances progress and step.
    pub fn new(progress: u8, current_step: impl Into<String>) -> Result<Self, CoreError> {
        if progress > MAX_PROGRESS {
            return Err(CoreError::Validation(format!(
                "Progress must be 0-{MAX_PROGRESS}, got {progress}"
            )));
        }
        Ok(Self {
            progress,
            current_step: current_step.into(),
            fields: BTreeMap::new(),
        })
    }

    /// A patch for one of the predefined protocol steps.
    pub fn for_step(step: ProgressStep) -> Self {
        Self {
            progress: step.progress.min(MAX_PROGRESS),
            current_step: step.label.to_owned(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a content field. Reserved protocol keys are rejected.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<(), CoreError> {
        let name = name.into();
        validate_field_name(&name)?;
        self.fields.insert(name, value.into());
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<Self, CoreError> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn current_step(&self) -> &str {
        &self.current_step
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// `true` when the patch only touches the protocol columns.
    pub fn has_no_content(&self) -> bool {
        self.fields.is_empty()
    }

    /// Content fields as a JSON object, ready for a document merge.
    pub fn fields_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Reject empty names and names that collide with a protocol key. The
/// comparison ignores case and underscores so `current_step` collides too.
fn validate_field_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation("Field name must not be empty".into()));
    }
    let normalised = normalise(name);
    if RESERVED_FIELDS.iter().any(|r| normalise(r) == normalised) {
        return Err(CoreError::Validation(format!(
            "Field name '{name}' collides with a reserved protocol key"
        )));
    }
    Ok(())
}

fn normalise(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

// ---------------------------------------------------------------------------
// Attribute patch builder
// ---------------------------------------------------------------------------

/// Turn a flat key/value result (typically parsed from a model completion)
/// into a single ledger update.
///
/// Values are coerced to text: strings are kept verbatim, numbers and
/// booleans use their JSON rendering, arrays and objects are stored as
/// compact JSON, and nulls are dropped. An empty (or all-null) mapping still
/// yields a valid patch that advances progress and step.
pub fn build_attribute_patch(
    fields: &serde_json::Map<String, serde_json::Value>,
    progress: u8,
    current_step: &str,
) -> Result<PatchDocument, CoreError> {
    let mut patch = PatchDocument::new(progress, current_step)?;
    for (name, value) in fields {
        if let Some(text) = coerce_to_text(value) {
            patch.insert(name.clone(), text)?;
        }
    }
    Ok(patch)
}

fn coerce_to_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn builds_one_patch_with_coerced_values() {
        let fields = object(json!({
            "title": "Linen shirt",
            "price": 49.5,
            "inStock": true,
            "tags": ["summer", "linen"],
        }));
        let patch = build_attribute_patch(&fields, 66, "Product Attribution Generated").unwrap();

        assert_eq!(patch.progress(), 66);
        assert_eq!(patch.current_step(), "Product Attribution Generated");
        assert_eq!(
            patch.fields()["title"],
            FieldValue::Text("Linen shirt".into())
        );
        assert_eq!(patch.fields()["price"], FieldValue::Text("49.5".into()));
        assert_eq!(patch.fields()["inStock"], FieldValue::Text("true".into()));
        assert_eq!(
            patch.fields()["tags"],
            FieldValue::Text(r#"["summer","linen"]"#.into())
        );
    }

    #[test]
    fn empty_mapping_still_advances_progress() {
        let fields = serde_json::Map::new();
        let patch = build_attribute_patch(&fields, 100, "Attribution Generated").unwrap();
        assert!(patch.has_no_content());
        assert_eq!(patch.progress(), 100);
        assert_eq!(patch.fields_json(), json!({}));
    }

    #[test]
    fn null_values_are_dropped() {
        let fields = object(json!({ "subtitle": null }));
        let patch = build_attribute_patch(&fields, 50, "step").unwrap();
        assert!(patch.has_no_content());
    }

    #[test]
    fn reserved_keys_rejected() {
        for key in ["progress", "currentStep", "current_step", "Progress"] {
            let fields = object(json!({ key: "x" }));
            assert_matches!(
                build_attribute_patch(&fields, 10, "step"),
                Err(CoreError::Validation(_)),
                "key {key} should collide"
            );
        }
    }

    #[test]
    fn progress_above_hundred_rejected() {
        assert_matches!(
            PatchDocument::new(101, "step"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn list_fields_render_as_json_arrays() {
        let references = vec!["a.png".to_owned(), "b.png".to_owned()];
        let patch = PatchDocument::new(80, "Generating images")
            .unwrap()
            .with_field("referenceImages", references)
            .unwrap();
        assert_eq!(
            patch.fields_json(),
            json!({ "referenceImages": ["a.png", "b.png"] })
        );
    }
}
