//! Generative model gateway seam.
//!
//! Three synchronous call shapes: text-to-image generation, a multimodal
//! "converse" completion (used for garment classification and product
//! attribution), and virtual try-on composition. Generated images cross
//! this boundary base64-encoded, exactly as the inference endpoint returns
//! them; callers decode.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::{GarmentClass, ImageFormat};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network, DNS, TLS or connection failure.
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// The endpoint returned a non-2xx status.
    #[error("Gateway API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The model reported an error inside an otherwise successful response.
    #[error("Model error: {0}")]
    Model(String),

    /// The response body did not have the expected shape.
    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),

    #[error("Gateway call timed out after {0:?}")]
    Timeout(Duration),
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TextToImageRequest {
    pub prompt: String,
    pub negative_text: Option<String>,
    pub width: u32,
    pub height: u32,
    pub count: u32,
    pub seed: u32,
}

#[derive(Debug, Clone)]
pub struct TryOnRequest<'a> {
    /// Person / model image.
    pub source_image: &'a [u8],
    /// Garment image.
    pub reference_image: &'a [u8],
    pub garment_class: GarmentClass,
    pub seed: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TryOnResponse {
    /// Base64-encoded composites. One is requested per call.
    pub images: Vec<String>,
    /// Base64-encoded segmentation mask, when the model returns one.
    pub mask_image: Option<String>,
}

/// Which configured text model a converse call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextModel {
    Classifier,
    Attribution,
}

#[derive(Debug, Clone)]
pub enum ContentBlock<'a> {
    Text(String),
    Image {
        format: ImageFormat,
        bytes: &'a [u8],
    },
}

#[derive(Debug, Clone)]
pub struct ConverseRequest<'a> {
    pub model: TextModel,
    pub system: Option<String>,
    pub content: Vec<ContentBlock<'a>>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct ConverseResponse {
    /// First text block of the model's reply.
    pub text: String,
    pub usage: Option<TokenUsage>,
}

// ---------------------------------------------------------------------------
// ModelGateway
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Generate `request.count` images; returns base64 payloads.
    async fn generate_images(
        &self,
        request: &TextToImageRequest,
    ) -> Result<Vec<String>, GatewayError>;

    async fn converse(
        &self,
        request: &ConverseRequest<'_>,
    ) -> Result<ConverseResponse, GatewayError>;

    async fn virtual_try_on(
        &self,
        request: &TryOnRequest<'_>,
    ) -> Result<TryOnResponse, GatewayError>;
}
