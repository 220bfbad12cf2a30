//! Resolution of the person images a garment is tried on.
//!
//! Either the caller supplied one captured image, or `count` images are
//! generated from a prompt built out of the job's descriptors. Both paths
//! persist every image under `human-model-images/{job}/{n}.png` so later
//! stages and watchers can reference them by key.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lookbook_core::gateway::TextToImageRequest;
use lookbook_core::job::{
    FIELD_GARMENT_TYPE, FIELD_IMAGE_PROMPT, FIELD_REFERENCE_IMAGES, STEP_GENERATING_IMAGES,
};
use lookbook_core::patch::PatchDocument;
use lookbook_core::storage::model_image_key;
use lookbook_core::types::{GarmentClass, JobId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::calls::{random_seed, with_timeout};
use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::images::{ClothImage, ModelImage};

/// Prompt recorded when the model image came from the caller's camera.
pub const DIRECT_CAPTURE_PROMPT: &str = "Human model input from web cam";

pub const NEGATIVE_TEXT: &str = "bad quality, low res, cartoon, unreal, head cropped, blur";

const MODEL_IMAGE_CONTENT_TYPE: &str = "image/png";

/// Descriptors interpolated into the generation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    #[validate(length(min = 1, max = 64, message = "gender must be 1-64 characters"))]
    pub gender: String,
    #[validate(length(min = 1, max = 64, message = "pose must be 1-64 characters"))]
    pub pose: String,
    #[validate(length(min = 1, max = 64, message = "emotion must be 1-64 characters"))]
    pub emotion: String,
    #[validate(length(min = 1, max = 64, message = "body structure must be 1-64 characters"))]
    pub body_structure: String,
    /// Number of model images to generate.
    #[validate(range(min = 1, max = 5, message = "count must be between 1 and 5"))]
    pub count: u32,
}

pub fn build_model_prompt(params: &GenerationParams) -> String {
    format!(
        "realistic full body length photo of a {gender} fashion model, {body} body structure, \
         {emotion}, wearing a plain white t-shirt, standing in a {pose} front facing pose \
         against a plain background, studio lighting",
        gender = params.gender,
        body = params.body_structure,
        emotion = params.emotion,
        pose = params.pose,
    )
}

/// Pixel dimensions read from the image header. The raster is not decoded.
pub fn infer_dimensions(bytes: &[u8]) -> Result<(u32, u32), PipelineError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::InvalidImage(e.to_string()))?
        .into_dimensions()
        .map_err(|e| PipelineError::InvalidImage(e.to_string()))
}

/// The resolved model images and the prompt recorded for them.
#[derive(Debug, Clone)]
pub struct ModelImageSet {
    pub prompt: String,
    pub images: Vec<ModelImage>,
}

impl ModelImageSet {
    /// Persisted model image keys in generation order, followed by the
    /// cloth image key.
    pub fn reference_images(&self, cloth_key: &str) -> Vec<String> {
        self.images
            .iter()
            .map(|image| image.key.clone())
            .chain(std::iter::once(cloth_key.to_owned()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

pub struct ModelImageProvider<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> ModelImageProvider<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Decide and persist the model images for `job_id`.
    ///
    /// With `human_model_key` set, that single image is used and the
    /// generator is never called, whatever `params.count` says.
    pub async fn resolve(
        &self,
        job_id: &JobId,
        cloth: &ClothImage,
        params: &GenerationParams,
        human_model_key: Option<&str>,
    ) -> Result<ModelImageSet, PipelineError> {
        let (prompt, payloads) = match human_model_key {
            Some(key) => {
                tracing::info!(job_id = %job_id, key, "Using captured human model image");
                let bytes = self.ctx.blobs.get(key).await?;
                (DIRECT_CAPTURE_PROMPT.to_owned(), vec![bytes])
            }
            None => self.generate(job_id, cloth, params).await?,
        };

        let mut images = Vec::with_capacity(payloads.len());
        for (offset, bytes) in payloads.into_iter().enumerate() {
            let key = model_image_key(job_id, offset + 1);
            self.ctx
                .blobs
                .put(&key, bytes.clone(), MODEL_IMAGE_CONTENT_TYPE)
                .await?;
            images.push(ModelImage { key, bytes });
        }

        tracing::info!(job_id = %job_id, count = images.len(), "Model images persisted");
        Ok(ModelImageSet { prompt, images })
    }

    async fn generate(
        &self,
        job_id: &JobId,
        cloth: &ClothImage,
        params: &GenerationParams,
    ) -> Result<(String, Vec<Vec<u8>>), PipelineError> {
        params.validate()?;

        let (width, height) = match infer_dimensions(&cloth.bytes) {
            Ok(dimensions) => dimensions,
            Err(e) => {
                let fallback = self.ctx.config.fallback_dimensions;
                tracing::warn!(
                    job_id = %job_id,
                    key = %cloth.key,
                    error = %e,
                    width = fallback.0,
                    height = fallback.1,
                    "Could not read cloth image dimensions, using fallback",
                );
                fallback
            }
        };

        let prompt = build_model_prompt(params);
        let request = TextToImageRequest {
            prompt: prompt.clone(),
            negative_text: Some(NEGATIVE_TEXT.to_owned()),
            width,
            height,
            count: params.count,
            seed: random_seed(),
        };
        tracing::info!(
            job_id = %job_id,
            count = params.count,
            width,
            height,
            "Generating model images",
        );

        let encoded = with_timeout(
            self.ctx.config.gateway_timeout,
            self.ctx.gateway.generate_images(&request),
        )
        .await?;

        let payloads = encoded
            .iter()
            .map(|data| {
                STANDARD
                    .decode(data)
                    .map_err(|e| PipelineError::InvalidImage(format!("model image: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((prompt, payloads))
    }

    /// One merged ledger write: prompt, reference images and garment class.
    pub async fn record(
        &self,
        job_id: &JobId,
        set: &ModelImageSet,
        cloth_key: &str,
        garment: GarmentClass,
    ) -> Result<(), PipelineError> {
        let patch = PatchDocument::for_step(STEP_GENERATING_IMAGES)
            .with_field(FIELD_IMAGE_PROMPT, set.prompt.as_str())?
            .with_field(FIELD_REFERENCE_IMAGES, set.reference_images(cloth_key))?
            .with_field(FIELD_GARMENT_TYPE, garment.as_str())?;
        self.ctx.ledger.apply_patch(job_id, &patch).await?;
        Ok(())
    }
}
