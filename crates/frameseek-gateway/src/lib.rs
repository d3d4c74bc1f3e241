//! Frameseek Gateway
//!
//! [`LlmGateway`](frameseek_core::LlmGateway) implementation for endpoints
//! speaking the OpenAI chat completions protocol (OpenAI, vLLM, Ollama,
//! LM Studio and similar).
//!
//! ```rust,ignore
//! use frameseek_gateway::{GatewayConfig, OpenAiCompatibleGateway};
//!
//! let gateway = OpenAiCompatibleGateway::from_env(
//!     GatewayConfig::new().with_model("gpt-4o-mini"),
//! )?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod client;
pub mod config;

pub use client::{
    chat_payload, completion_text, image_data_url, GatewayBuildError, OpenAiCompatibleGateway,
};
pub use config::GatewayConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
