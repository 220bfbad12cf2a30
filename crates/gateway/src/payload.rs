//! Wire payloads for the invoke / converse endpoints.
//!
//! Request bodies are built as [`serde_json::Value`]s; responses are
//! deserialized into private shapes and mapped onto the gateway types from
//! `lookbook-core`. Binary images travel base64-encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

use lookbook_core::gateway::{
    ContentBlock, ConverseRequest, ConverseResponse, GatewayError, TextToImageRequest, TokenUsage,
    TryOnRequest, TryOnResponse,
};

/// Guidance scale for try-on composition.
pub const TRY_ON_CFG_SCALE: f32 = 6.5;

/// Masking strategy: let the model derive the mask from the garment class.
const TRY_ON_MASK_TYPE: &str = "GARMENT";

/// Shape of the garment-derived mask.
const TRY_ON_MASK_SHAPE: &str = "BOUNDING_BOX";

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

pub fn text_to_image_body(request: &TextToImageRequest) -> serde_json::Value {
    let mut params = json!({ "text": request.prompt });
    if let Some(negative) = &request.negative_text {
        params["negativeText"] = json!(negative);
    }
    json!({
        "taskType": "TEXT_IMAGE",
        "textToImageParams": params,
        "imageGenerationConfig": {
            "numberOfImages": request.count,
            "height": request.height,
            "width": request.width,
            "seed": request.seed,
        },
    })
}

pub fn try_on_body(request: &TryOnRequest<'_>) -> serde_json::Value {
    json!({
        "taskType": "VIRTUAL_TRY_ON",
        "virtualTryOnParams": {
            "sourceImage": STANDARD.encode(request.source_image),
            "referenceImage": STANDARD.encode(request.reference_image),
            "maskType": TRY_ON_MASK_TYPE,
            "garmentBasedMask": {
                "garmentClass": request.garment_class.as_str(),
                "maskShape": TRY_ON_MASK_SHAPE,
            },
        },
        "imageGenerationConfig": {
            "numberOfImages": 1,
            "cfgScale": TRY_ON_CFG_SCALE,
            "seed": request.seed,
        },
    })
}

pub fn converse_body(request: &ConverseRequest<'_>) -> serde_json::Value {
    let content: Vec<serde_json::Value> = request
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text(text) => json!({ "text": text }),
            ContentBlock::Image { format, bytes } => json!({
                "image": {
                    "format": format.as_str(),
                    "source": { "bytes": STANDARD.encode(bytes) },
                },
            }),
        })
        .collect();

    let mut body = json!({
        "messages": [{ "role": "user", "content": content }],
    });
    if let Some(system) = &request.system {
        body["system"] = json!([{ "text": system }]);
    }

    let mut inference = serde_json::Map::new();
    if let Some(max_tokens) = request.max_tokens {
        inference.insert("maxTokens".into(), json!(max_tokens));
    }
    if let Some(temperature) = request.temperature {
        inference.insert("temperature".into(), json!(temperature));
    }
    if !inference.is_empty() {
        body["inferenceConfig"] = serde_json::Value::Object(inference);
    }
    body
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageTaskBody {
    #[serde(default)]
    images: Vec<String>,
    mask_image: Option<String>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ConverseBody {
    output: ConverseOutput,
    usage: Option<UsageBody>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: ConverseMessage,
}

#[derive(Debug, Deserialize)]
struct ConverseMessage {
    #[serde(default)]
    content: Vec<ConverseContent>,
}

#[derive(Debug, Deserialize)]
struct ConverseContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageBody {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

fn parse_image_task(body: serde_json::Value) -> Result<ImageTaskBody, GatewayError> {
    let parsed: ImageTaskBody = serde_json::from_value(body)
        .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
    match &parsed.error {
        None | Some(serde_json::Value::Null) => Ok(parsed),
        Some(serde_json::Value::String(msg)) => Err(GatewayError::Model(msg.clone())),
        Some(other) => Err(GatewayError::Model(other.to_string())),
    }
}

/// Extract the generated images from a text-to-image response.
pub fn parse_images_response(body: serde_json::Value) -> Result<Vec<String>, GatewayError> {
    let parsed = parse_image_task(body)?;
    if parsed.images.is_empty() {
        return Err(GatewayError::MalformedResponse(
            "response contained no images".into(),
        ));
    }
    Ok(parsed.images)
}

pub fn parse_try_on_response(body: serde_json::Value) -> Result<TryOnResponse, GatewayError> {
    let parsed = parse_image_task(body)?;
    Ok(TryOnResponse {
        images: parsed.images,
        mask_image: parsed.mask_image,
    })
}

pub fn parse_converse_response(body: serde_json::Value) -> Result<ConverseResponse, GatewayError> {
    let parsed: ConverseBody = serde_json::from_value(body)
        .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
    let text = parsed
        .output
        .message
        .content
        .into_iter()
        .find_map(|c| c.text)
        .ok_or_else(|| GatewayError::MalformedResponse("reply has no text block".into()))?;
    Ok(ConverseResponse {
        text,
        usage: parsed.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        }),
    })
}
