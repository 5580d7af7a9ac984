//! Parsing of completion responses into attributions.
//!
//! Models wrap JSON in code fences or prose often enough that the outermost `{...}`
//! span of the message content is what gets parsed. An attribution may arrive either as
//! `{"objects": {noun: [adj]}}` or as the bare `{noun: [adj]}` mapping.

use crate::error::LlmError;
use crate::types::ObjectAttribution;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn malformed(message: impl Into<String>) -> LlmError {
    LlmError::MalformedResponse {
        message: message.into(),
    }
}

/// Message content of the first choice in a `{choices: [{message: {content}}]}` body.
pub fn completion_content(body: &str) -> Result<String, LlmError> {
    let parsed: CompletionBody =
        serde_json::from_str(body).map_err(|e| malformed(format!("Invalid JSON: {}", e)))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| malformed("No choices in response"))?;
    choice
        .message
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| malformed("No message content in first choice"))
}

/// The outermost `{...}` span of `content`, or all of it if there is none.
fn json_span(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    }
}

fn parse_object(content: &str) -> Result<serde_json::Map<String, Value>, LlmError> {
    match serde_json::from_str::<Value>(json_span(content)) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(malformed(format!(
            "Expected a JSON object, got {}",
            type_name(&other)
        ))),
        Err(e) => Err(malformed(format!("Content is not valid JSON: {}", e))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Interpret a JSON value as one attribution.
pub fn attribution_from_value(value: Value) -> Result<ObjectAttribution, LlmError> {
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            return Err(malformed(format!(
                "Attribution must be an object, got {}",
                type_name(&other)
            )));
        }
    };
    if matches!(map.get("objects"), Some(Value::Object(_)))
        && let Some(Value::Object(inner)) = map.remove("objects")
    {
        map = inner;
    }

    let mut attribution = ObjectAttribution::new();
    for (noun, adjectives) in map {
        match adjectives {
            Value::Array(items) => {
                attribution.ensure_object(noun.clone());
                for item in items {
                    match item {
                        Value::String(adjective) => attribution.attribute(noun.clone(), adjective),
                        other => {
                            return Err(malformed(format!(
                                "Adjective for {:?} must be a string, got {}",
                                noun,
                                type_name(&other)
                            )));
                        }
                    }
                }
            }
            Value::Null => attribution.ensure_object(noun),
            other => {
                return Err(malformed(format!(
                    "Adjectives for {:?} must be a list, got {}",
                    noun,
                    type_name(&other)
                )));
            }
        }
    }
    Ok(attribution)
}

/// Parse single-text completion content.
pub fn parse_attribution(content: &str) -> Result<ObjectAttribution, LlmError> {
    attribution_from_value(Value::Object(parse_object(content)?))
}

/// Trimmed key with exactly one surrounding `<...>` pair removed.
pub fn unwrap_key(key: &str) -> &str {
    let trimmed = key.trim();
    trimmed
        .strip_prefix('<')
        .and_then(|k| k.strip_suffix('>'))
        .unwrap_or(trimmed)
}

/// Unwrapped key with inner padding trimmed as well.
pub fn normalize_key(key: &str) -> String {
    unwrap_key(key).trim().to_string()
}

/// Parse multi-text completion content keyed by input text.
///
/// Entries whose value is not a valid attribution are logged and skipped; the rest
/// keep their keys as answered, trimmed.
pub fn parse_batch(content: &str) -> Result<Vec<(String, ObjectAttribution)>, LlmError> {
    let map = parse_object(content)?;
    let mut parsed = Vec::with_capacity(map.len());
    for (key, value) in map {
        match attribution_from_value(value) {
            Ok(attribution) => parsed.push((key.trim().to_string(), attribution)),
            Err(e) => warn!(text = %key, error = %e, "Skipping unparseable entry in batch response"),
        }
    }
    Ok(parsed)
}
