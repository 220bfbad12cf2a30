//! Blob store seam and the deterministic key schemes built on top of it.

use async_trait::async_trait;

use crate::types::JobId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Prefix under which model images (generated or captured) are persisted.
pub const MODEL_IMAGE_PREFIX: &str = "human-model-images";

/// Logical segment marking caller uploads.
const INPUT_SEGMENT: &str = "input";

/// Logical segment that replaces [`INPUT_SEGMENT`] for derived outputs.
const OUTPUT_SEGMENT: &str = "output";

/// Extension of persisted model images.
const MODEL_IMAGE_EXTENSION: &str = "png";

/// Extension of persisted try-on composites and masks.
const OUTPUT_EXTENSION: &str = "jpg";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// BlobStore
// ---------------------------------------------------------------------------

/// Read/write of binary payloads by path-like key within one namespace.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket or root the keys are resolved against, recorded on job
    /// records so that readers know where the keys live.
    fn namespace(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Key schemes
// ---------------------------------------------------------------------------

/// Key of the `sequence`-th (1-based) model image of a job.
pub fn model_image_key(job_id: &JobId, sequence: usize) -> String {
    format!("{MODEL_IMAGE_PREFIX}/{job_id}/{sequence}.{MODEL_IMAGE_EXTENSION}")
}

/// Directory that holds every output derived from `cloth_key`.
///
/// `input` segments become `output` and the file extension is stripped, so
/// `input/shirt.png` maps to `output/shirt`.
pub fn output_base(cloth_key: &str) -> String {
    let mut segments: Vec<&str> = cloth_key
        .split('/')
        .map(|segment| {
            if segment == INPUT_SEGMENT {
                OUTPUT_SEGMENT
            } else {
                segment
            }
        })
        .collect();

    if let Some(last) = segments.last_mut() {
        if let Some((stem, _ext)) = last.rsplit_once('.') {
            if !stem.is_empty() {
                *last = stem;
            }
        }
    }
    segments.join("/")
}

/// Key of the try-on composite for the task at `index` (1-based).
pub fn output_image_key(cloth_key: &str, index: usize) -> String {
    format!("{}/{index}.{OUTPUT_EXTENSION}", output_base(cloth_key))
}

/// Key of the segmentation mask for the task at `index` (1-based).
pub fn mask_image_key(cloth_key: &str, index: usize) -> String {
    format!("{}/{index}_mask.{OUTPUT_EXTENSION}", output_base(cloth_key))
}

/// Content type of persisted composites and masks.
pub fn output_content_type() -> &'static str {
    "image/jpeg"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_image_keys_are_one_based_per_job() {
        let job = JobId::new("abc").unwrap();
        assert_eq!(model_image_key(&job, 1), "human-model-images/abc/1.png");
        assert_eq!(model_image_key(&job, 3), "human-model-images/abc/3.png");
    }

    #[test]
    fn output_keys_replace_input_segment_and_strip_extension() {
        assert_eq!(output_image_key("input/shirt.png", 1), "output/shirt/1.jpg");
        assert_eq!(output_image_key("input/shirt.jpg", 2), "output/shirt/2.jpg");
        assert_eq!(
            mask_image_key("input/shirt.png", 1),
            "output/shirt/1_mask.jpg"
        );
    }

    #[test]
    fn output_keys_are_deterministic() {
        let a = output_image_key("tenant/input/job-9/dress.webp", 4);
        let b = output_image_key("tenant/input/job-9/dress.webp", 4);
        assert_eq!(a, b);
        assert_eq!(a, "tenant/output/job-9/dress/4.jpg");
    }

    #[test]
    fn only_whole_input_segments_are_rewritten() {
        assert_eq!(output_base("inputs/input.png"), "inputs/input");
        assert_eq!(output_base("input/.hidden"), "output/.hidden");
    }
}
