//! LLM gateway seam
//!
//! The pipeline needs two capabilities from a model provider: plain text
//! generation and image analysis. Implementations live outside this crate
//! (see `frameseek-gateway`) and are injected as `Arc<dyn LlmGateway>`.

use crate::error::GatewayError;
use crate::parser::ModelResponse;
use async_trait::async_trait;

/// Text and vision capabilities of a model provider
///
/// Both calls may fail transiently; callers own retry policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Generate text for a prompt
    async fn generate_text(&self, prompt: &str) -> Result<String, GatewayError>;

    /// Analyze the image at `image_path` under `prompt`
    async fn analyze_image(&self, image_path: &str, prompt: &str)
        -> Result<ModelResponse, GatewayError>;
}
