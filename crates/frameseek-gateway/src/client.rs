//! OpenAI-compatible chat completions client
//!
//! Images are sent inline as base64 data URLs, so the keyframe store only
//! needs to be readable by this process.

use crate::config::GatewayConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use frameseek_core::{GatewayError, LlmGateway, ModelResponse};
use serde_json::{json, Value};
use std::path::Path;

/// Errors raised while building a gateway
#[derive(Debug, thiserror::Error)]
pub enum GatewayBuildError {
    /// API key variable unset or empty
    #[error("environment variable {0} is not set")]
    MissingApiKey(String),

    /// HTTP client could not be constructed
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Gateway for any endpoint speaking the chat completions protocol
#[derive(Clone)]
pub struct OpenAiCompatibleGateway {
    http: reqwest::Client,
    config: GatewayConfig,
    api_key: String,
}

impl OpenAiCompatibleGateway {
    /// Create gateway with an explicit key
    ///
    /// # Errors
    /// [`GatewayBuildError::Client`] if the HTTP client cannot be built.
    pub fn new(config: GatewayConfig, api_key: impl Into<String>) -> Result<Self, GatewayBuildError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            config,
            api_key: api_key.into(),
        })
    }

    /// Create gateway reading the key from `config.api_key_env`
    ///
    /// # Errors
    /// [`GatewayBuildError::MissingApiKey`] if the variable is unset or empty.
    pub fn from_env(config: GatewayConfig) -> Result<Self, GatewayBuildError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| GatewayBuildError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    /// Gateway configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn complete(&self, content: Value) -> Result<String, GatewayError> {
        let payload = chat_payload(&self.config, content);
        let response = self
            .http
            .post(self.config.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(&e))?;
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "provider rejected request");
            return Err(GatewayError::Provider {
                status: status.as_u16(),
                message: truncate(&body, 512),
            });
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Transport(format!("undecodable provider body: {e}")))?;
        completion_text(&parsed)
    }

    fn transport_error(&self, error: &reqwest::Error) -> GatewayError {
        if error.is_timeout() {
            GatewayError::Timeout {
                duration_ms: u64::try_from(self.config.request_timeout().as_millis())
                    .unwrap_or(u64::MAX),
            }
        } else {
            GatewayError::Transport(error.to_string())
        }
    }
}

impl std::fmt::Debug for OpenAiCompatibleGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmGateway for OpenAiCompatibleGateway {
    async fn generate_text(&self, prompt: &str) -> Result<String, GatewayError> {
        self.complete(Value::String(prompt.to_string())).await
    }

    async fn analyze_image(
        &self,
        image_path: &str,
        prompt: &str,
    ) -> Result<ModelResponse, GatewayError> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| GatewayError::InvalidImage {
                path: image_path.to_string(),
                reason: e.to_string(),
            })?;
        let content = json!([
            {"type": "text", "text": prompt},
            {"type": "image_url", "image_url": {"url": image_data_url(Path::new(image_path), &bytes)}},
        ]);

        let text = self.complete(content).await?;
        Ok(into_response(text, self.config.json_mode))
    }
}

/// Request body for one user message
#[must_use]
pub fn chat_payload(config: &GatewayConfig, content: Value) -> Value {
    let mut payload = json!({
        "model": config.model,
        "messages": [{"role": "user", "content": content}],
        "max_tokens": config.max_tokens,
        "temperature": 0,
    });
    if config.json_mode {
        payload["response_format"] = json!({"type": "json_object"});
    }
    payload
}

/// Text of the first choice
///
/// Content given as an array of parts is joined.
///
/// # Errors
/// [`GatewayError::EmptyResponse`] when no text is present.
pub fn completion_text(body: &Value) -> Result<String, GatewayError> {
    let content = body
        .pointer("/choices/0/message/content")
        .ok_or(GatewayError::EmptyResponse)?;
    let text = match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };
    if text.trim().is_empty() {
        return Err(GatewayError::EmptyResponse);
    }
    Ok(text)
}

/// Inline data URL for an image file
#[must_use]
pub fn image_data_url(path: &Path, bytes: &[u8]) -> String {
    let mime = mime_for_path(path).unwrap_or("image/jpeg");
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Structured when JSON mode produced an object, text otherwise
fn into_response(text: String, json_mode: bool) -> ModelResponse {
    if json_mode {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text) {
            return ModelResponse::Structured(value);
        }
    }
    ModelResponse::Text(text)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
