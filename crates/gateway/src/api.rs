//! REST client for the inference runtime.
//!
//! Wraps the `POST /model/{id}/invoke` and `POST /model/{id}/converse`
//! endpoints using [`reqwest`]. Transport and status errors are mapped onto
//! [`GatewayError`]; no retry is attempted here.

use std::time::Duration;

use async_trait::async_trait;
use lookbook_core::gateway::{
    ConverseRequest, ConverseResponse, GatewayError, ModelGateway, TextModel, TextToImageRequest,
    TryOnRequest, TryOnResponse,
};

use crate::payload;

/// Default per-request timeout applied by the HTTP client itself.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Endpoint and model selection for one inference runtime.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base HTTP URL, e.g. `https://runtime.example.com`.
    pub base_url: String,
    /// Bearer token, when the runtime requires one.
    pub api_key: Option<String>,
    /// Model serving text-to-image and virtual try-on.
    pub image_model_id: String,
    /// Model used for garment classification.
    pub classifier_model_id: String,
    /// Model used for product attribution completions.
    pub text_model_id: String,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            image_model_id: "amazon.nova-canvas-v1:0".into(),
            classifier_model_id: "amazon.nova-pro-v1:0".into(),
            text_model_id: "amazon.nova-pro-v1:0".into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// HTTP client for a single inference runtime.
pub struct HttpModelGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl HttpModelGateway {
    /// Build a gateway with its own connection pool.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a gateway reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: GatewayConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, model_id: &str, action: &str) -> String {
        format!(
            "{}/model/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            model_id,
            action
        )
    }

    fn text_model_id(&self, model: TextModel) -> &str {
        match model {
            TextModel::Classifier => &self.config.classifier_model_id,
            TextModel::Attribution => &self.config.text_model_id,
        }
    }

    /// POST a JSON body and return the decoded JSON response.
    async fn post_json(
        &self,
        url: String,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`GatewayError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body.
    async fn parse_response(
        response: reqwest::Response,
    ) -> Result<serde_json::Value, GatewayError> {
        let response = Self::ensure_success(response).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Transport(format!("request timed out: {err}"))
    } else {
        GatewayError::Transport(err.to_string())
    }
}

#[async_trait]
impl ModelGateway for HttpModelGateway {
    async fn generate_images(
        &self,
        request: &TextToImageRequest,
    ) -> Result<Vec<String>, GatewayError> {
        let url = self.endpoint(&self.config.image_model_id, "invoke");
        tracing::debug!(
            count = request.count,
            width = request.width,
            height = request.height,
            "Requesting text-to-image generation",
        );
        let body = self
            .post_json(url, &payload::text_to_image_body(request))
            .await?;
        payload::parse_images_response(body)
    }

    async fn converse(
        &self,
        request: &ConverseRequest<'_>,
    ) -> Result<ConverseResponse, GatewayError> {
        let url = self.endpoint(self.text_model_id(request.model), "converse");
        let body = self.post_json(url, &payload::converse_body(request)).await?;
        payload::parse_converse_response(body)
    }

    async fn virtual_try_on(
        &self,
        request: &TryOnRequest<'_>,
    ) -> Result<TryOnResponse, GatewayError> {
        let url = self.endpoint(&self.config.image_model_id, "invoke");
        let body = self.post_json(url, &payload::try_on_body(request)).await?;
        payload::parse_try_on_response(body)
    }
}
