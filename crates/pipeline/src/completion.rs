//! Parsing of free-form model completions into JSON.
//!
//! Text models frequently wrap structured output in markdown code fences or
//! surround it with prose. These helpers recover the JSON object either way.

use serde_json::{Map, Value};

use crate::error::PipelineError;

/// Locate the JSON object inside a completion.
///
/// A fenced block (```` ```json ... ``` ```` or a bare ```` ``` ````) wins
/// when present; otherwise the text between the first `{` and the last `}`
/// is returned. `None` when no braces are found.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let body = strip_code_fence(text).unwrap_or(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip an optional language tag on the opening fence line.
    let content_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let content = &after_open[content_start..];
    let close = content.find("```")?;
    Some(content[..close].trim())
}

/// Parse a completion as a flat JSON object.
pub fn parse_flat_object(text: &str) -> Result<Map<String, Value>, PipelineError> {
    let json = extract_json_object(text).ok_or_else(|| {
        PipelineError::InvalidCompletion("completion contains no JSON object".into())
    })?;
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(PipelineError::InvalidCompletion(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(PipelineError::InvalidCompletion(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
