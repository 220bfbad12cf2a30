//! Garment classification with a fixed fallback class.
//!
//! Classification quality only affects how the composite looks, so any
//! failure here (transport, timeout, unparsable or out-of-vocabulary reply,
//! unsupported image format) resolves to [`GarmentClass::DEFAULT`] instead
//! of failing the stage. The internal [`Classification`] keeps the two
//! outcomes apart so the fallback shows up in logs.

use lookbook_core::gateway::{ContentBlock, ConverseRequest, TextModel};
use lookbook_core::types::{GarmentClass, ImageFormat};
use serde::Deserialize;

use crate::calls::with_timeout;
use crate::completion::extract_json_object;
use crate::context::PipelineContext;

const SYSTEM_PROMPT: &str = "You are an expert in clothing classification. \
    You look at a single product photo and decide which garment class it belongs to. \
    You answer with JSON only.";

const MAX_TOKENS: u32 = 200;
const TEMPERATURE: f32 = 0.0;

/// Outcome of one classification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Classified(GarmentClass),
    Defaulted { reason: String },
}

impl Classification {
    /// The class to use downstream; the default for a fallback.
    pub fn garment_class(&self) -> GarmentClass {
        match self {
            Self::Classified(class) => *class,
            Self::Defaulted { .. } => GarmentClass::DEFAULT,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Defaulted { .. })
    }
}

#[derive(Debug, Deserialize)]
struct ClassifierReply {
    garment_type: GarmentClass,
}

/// Wraps the gateway's converse call with the classification instructions.
pub struct GarmentClassifier<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> GarmentClassifier<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Classify `image`, declared as `format` (a file extension such as
    /// `jpg` or `png`). Never fails.
    pub async fn classify(&self, image: &[u8], format: &str) -> Classification {
        let outcome = match self.try_classify(image, format).await {
            Ok(class) => Classification::Classified(class),
            Err(reason) => Classification::Defaulted { reason },
        };
        match &outcome {
            Classification::Classified(class) => {
                tracing::info!(garment_type = %class, "Garment classified");
            }
            Classification::Defaulted { reason } => {
                tracing::warn!(
                    garment_type = %GarmentClass::DEFAULT,
                    reason = %reason,
                    "Garment classification failed, using default class",
                );
            }
        }
        outcome
    }

    async fn try_classify(&self, image: &[u8], format: &str) -> Result<GarmentClass, String> {
        let format = ImageFormat::from_extension(format)
            .ok_or_else(|| format!("unsupported image format '{format}'"))?;
        let request = ConverseRequest {
            model: TextModel::Classifier,
            system: Some(SYSTEM_PROMPT.to_owned()),
            content: vec![
                ContentBlock::Image {
                    format,
                    bytes: image,
                },
                ContentBlock::Text(instructions()),
            ],
            max_tokens: Some(MAX_TOKENS),
            temperature: Some(TEMPERATURE),
        };

        let response = with_timeout(
            self.ctx.config.gateway_timeout,
            self.ctx.gateway.converse(&request),
        )
        .await
        .map_err(|e| e.to_string())?;

        parse_reply(&response.text)
    }
}

/// Classify and return only the class, for callers that do not care
/// whether the fallback was used.
pub async fn classify_garment(ctx: &PipelineContext, image: &[u8], format: &str) -> GarmentClass {
    GarmentClassifier::new(ctx)
        .classify(image, format)
        .await
        .garment_class()
}

fn parse_reply(text: &str) -> Result<GarmentClass, String> {
    let json = extract_json_object(text).ok_or_else(|| "reply contains no JSON object".to_owned())?;
    serde_json::from_str::<ClassifierReply>(json)
        .map(|reply| reply.garment_type)
        .map_err(|e| format!("reply does not match schema: {e}"))
}

fn class_list(classes: &[GarmentClass]) -> String {
    classes
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// JSON schema the reply must satisfy; sent with the instructions.
fn reply_schema() -> serde_json::Value {
    let allowed: Vec<&str> = GarmentClass::all().map(GarmentClass::as_str).collect();
    serde_json::json!({
        "type": "object",
        "properties": {
            "garment_type": { "type": "string", "enum": allowed }
        },
        "required": ["garment_type"],
        "additionalProperties": false
    })
}

fn instructions() -> String {
    format!(
        "Classify the garment shown in the image.\n\
         Choose the best match from these primary classes, in order of preference: {primary}.\n\
         Only if none of the primary classes applies, choose one of: {secondary}.\n\
         Respond with a single JSON object matching this schema and nothing else:\n{schema}",
        primary = class_list(GarmentClass::PRIMARY),
        secondary = class_list(GarmentClass::SECONDARY),
        schema = reply_schema(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_reply() {
        assert_eq!(
            parse_reply(r#"{"garment_type": "LONG_PANTS"}"#),
            Ok(GarmentClass::LongPants)
        );
    }

    #[test]
    fn parse_fenced_reply() {
        assert_eq!(
            parse_reply("```json\n{\"garment_type\": \"OTHER_FOOTWEAR\"}\n```"),
            Ok(GarmentClass::OtherFootwear)
        );
    }

    #[test]
    fn out_of_vocabulary_is_rejected() {
        assert!(parse_reply(r#"{"garment_type": "HAT"}"#).is_err());
        assert!(parse_reply(r#"{"class": "SHOES"}"#).is_err());
        assert!(parse_reply("").is_err());
    }

    #[test]
    fn instructions_list_primary_before_secondary() {
        let text = instructions();
        let primary = text.find("LONG_SLEEVE_SHIRT").unwrap();
        let secondary = text.find("OTHER_UPPER_BODY").unwrap();
        assert!(primary < secondary);
        assert!(text.contains("\"garment_type\""));
    }

    #[test]
    fn defaulted_collapses_to_default_class() {
        let outcome = Classification::Defaulted {
            reason: "timeout".into(),
        };
        assert!(outcome.is_default());
        assert_eq!(outcome.garment_class(), GarmentClass::UpperBody);
        assert_eq!(
            Classification::Classified(GarmentClass::Shoes).garment_class(),
            GarmentClass::Shoes
        );
    }
}
