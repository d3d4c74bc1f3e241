//! Response parser
//!
//! Recovers a JSON object from raw model output that may be wrapped in prose
//! or Markdown code fences. Pure and allocation-light; safe to call from any
//! number of concurrent validations.

use crate::error::MalformedResponseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    // Opening fences may carry a language tag; closing fences swallow leading whitespace.
    Regex::new(r"```[A-Za-z]*\s*|\s*```").expect("code fence pattern is valid")
});

static OBJECT_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("object span pattern is valid"));

/// Raw output of a model call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelResponse {
    /// Already-structured output (JSON mode or a previous parse)
    Structured(Value),
    /// Free text
    Text(String),
}

impl ModelResponse {
    /// Text form, for diagnostics
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

impl From<String> for ModelResponse {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ModelResponse {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for ModelResponse {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// Extract a JSON object from a model response
///
/// Structured input that is already an object is returned unchanged.
///
/// # Errors
/// [`MalformedResponseError`] when no object can be recovered; the error
/// carries the offending text.
pub fn parse_response(response: &ModelResponse) -> Result<Map<String, Value>, MalformedResponseError> {
    match response {
        ModelResponse::Structured(Value::Object(map)) => Ok(map.clone()),
        ModelResponse::Structured(Value::String(text)) | ModelResponse::Text(text) => {
            parse_text(text)
        }
        ModelResponse::Structured(other) => Err(MalformedResponseError::new(
            "structured response is not an object",
            other.to_string(),
        )),
    }
}

/// Extract a JSON object from free text
///
/// # Errors
/// [`MalformedResponseError`] when no object can be recovered.
pub fn parse_text(text: &str) -> Result<Map<String, Value>, MalformedResponseError> {
    let cleaned = CODE_FENCE.replace_all(text, "");
    let cleaned = cleaned.trim();

    let candidate = if cleaned.starts_with('{') {
        cleaned
    } else {
        OBJECT_SPAN
            .find(cleaned)
            .map(|m| m.as_str())
            .ok_or_else(|| MalformedResponseError::new("no JSON object found", text))?
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(MalformedResponseError::new("JSON value is not an object", text)),
        Err(e) => Err(MalformedResponseError::new(format!("JSON parse error: {e}"), text)),
    }
}
