//! Label-detection results and the product summary derived from them.
//!
//! Input follows the `DetectLabels` response shape (PascalCase keys). The
//! product is the first label that carries a located instance; the other
//! labels only contribute tags.

use std::collections::BTreeSet;

use lookbook_core::error::CoreError;
use serde::{Deserialize, Serialize};

/// Separator of the category path, root first.
pub const CATEGORY_SEPARATOR: &str = " > ";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LabelDetection {
    #[serde(default)]
    pub labels: Vec<DetectedLabel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectedLabel {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<LabelInstance>,
    #[serde(default)]
    pub parents: Vec<LabelName>,
    #[serde(default)]
    pub aliases: Vec<LabelName>,
    #[serde(default)]
    pub categories: Vec<LabelName>,
}

impl DetectedLabel {
    fn located(&self) -> Option<&LabelInstance> {
        self.instances.first()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LabelName {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LabelInstance {
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub dominant_colors: Vec<DominantColor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DominantColor {
    pub hex_code: String,
}

/// Box as fractions of the image size.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all(deserialize = "PascalCase", serialize = "lowercase"))]
pub struct BoundingBox {
    pub width: f64,
    pub height: f64,
    pub left: f64,
    pub top: f64,
}

/// What the job record learns about the product from label detection.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSummary {
    /// Name of the detected product label.
    pub root_category: String,
    /// Ancestors (outermost first), then the label's categories, then the
    /// label itself.
    pub parent_categories: Vec<String>,
    pub bounding_box: BoundingBox,
    pub color_palette: Vec<String>,
    pub category_tags: BTreeSet<String>,
    pub alias_tags: BTreeSet<String>,
}

impl LabelSummary {
    pub fn from_labels(labels: &[DetectedLabel]) -> Result<Self, CoreError> {
        let (product, instance) = labels
            .iter()
            .find_map(|label| label.located().map(|instance| (label, instance)))
            .ok_or_else(|| {
                CoreError::Validation("label detection found no located product".into())
            })?;

        let mut category_tags = BTreeSet::new();
        let mut alias_tags = BTreeSet::new();
        for label in labels.iter().filter(|l| l.located().is_none()) {
            alias_tags.insert(label.name.clone());
            alias_tags.extend(label.aliases.iter().map(|a| a.name.clone()));
            category_tags.extend(label.categories.iter().map(|c| c.name.clone()));
            category_tags.extend(label.parents.iter().map(|p| p.name.clone()));
        }

        // Parents are listed nearest first.
        let mut parent_categories: Vec<String> =
            product.parents.iter().rev().map(|p| p.name.clone()).collect();
        parent_categories.extend(product.categories.iter().map(|c| c.name.clone()));
        parent_categories.push(product.name.clone());

        Ok(Self {
            root_category: product.name.clone(),
            parent_categories,
            bounding_box: instance.bounding_box,
            color_palette: instance
                .dominant_colors
                .iter()
                .map(|c| c.hex_code.clone())
                .collect(),
            category_tags,
            alias_tags,
        })
    }

    pub fn category_path(&self) -> String {
        self.parent_categories.join(CATEGORY_SEPARATOR)
    }
}

/// Comma-joined text form used for list-like product fields.
pub fn join_tags<'a>(tags: impl IntoIterator<Item = &'a String>) -> String {
    tags.into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
