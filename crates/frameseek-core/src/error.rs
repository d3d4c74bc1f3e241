//! Error types for the retrieval pipeline
//!
//! Per-image failures (gateway, malformed output, bad verdict shape) are
//! absorbed into sentinel verdicts by the validator. Only pipeline-level
//! failures reach callers through [`PipelineError`].

use crate::types::Modality;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Prompt crafting failed; the query cannot proceed
    #[error("prompt crafting failed: {0}")]
    PromptCrafting(#[from] PromptCraftingError),

    /// Classification carries no scenes at all
    #[error("classification has no scenes")]
    NoScenes,

    /// A scene has no crafted prompt for a modality
    #[error("no {modality} prompt crafted for scene {scene}")]
    MisalignedPrompts {
        /// Scene index without a prompt
        scene: u32,
        /// Modality missing the prompt
        modality: Modality,
    },

    /// Search collaborator failed
    #[error("search failed: {0}")]
    Search(#[from] SearchError),
}

impl PipelineError {
    /// Check if the query could succeed when re-run unchanged
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Search(_) => true,
            Self::PromptCrafting(e) => e.is_retryable(),
            Self::NoScenes | Self::MisalignedPrompts { .. } => false,
        }
    }
}

/// LLM gateway errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Network-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider rejected the request
    #[error("provider error (status {status}): {message}")]
    Provider {
        /// HTTP-like status code
        status: u16,
        /// Provider message
        message: String,
    },

    /// Call exceeded its deadline
    #[error("gateway call timed out after {duration_ms}ms")]
    Timeout {
        /// Elapsed deadline in milliseconds
        duration_ms: u64,
    },

    /// Image could not be read or encoded
    #[error("invalid image {path}: {reason}")]
    InvalidImage {
        /// Image path
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Provider returned no usable content
    #[error("empty response from provider")]
    EmptyResponse,
}

impl GatewayError {
    /// Check if the failure is likely to clear on its own
    ///
    /// Informational only: the validator retries every gateway failure.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } | Self::EmptyResponse => true,
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidImage { .. } => false,
        }
    }
}

/// No JSON object could be recovered from a model response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed response: {reason}")]
pub struct MalformedResponseError {
    /// What went wrong
    pub reason: String,
    /// The offending text
    pub text: String,
}

impl MalformedResponseError {
    /// Create new malformed response error
    #[inline]
    #[must_use]
    pub fn new(reason: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            text: text.into(),
        }
    }
}

/// Verdict shape violations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerdictError {
    /// Parsed value is not an object
    #[error("verdict is not an object")]
    NotAnObject,

    /// Required field absent
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// Field present with the wrong type
    #[error("field `{field}` should be {expected}")]
    WrongType {
        /// Offending field
        field: &'static str,
        /// Expected type description
        expected: &'static str,
    },

    /// Category outside the four verdicts
    #[error("unknown category: {0:?}")]
    UnknownCategory(String),

    /// Confidence outside `[0, 1]`
    #[error("`{field}` = {value} is outside [0, 1]")]
    ConfidenceOutOfRange {
        /// Offending field
        field: &'static str,
        /// Received value
        value: f64,
    },
}

/// One failed validation attempt
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Gateway call failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Response was not JSON
    #[error(transparent)]
    Malformed(#[from] MalformedResponseError),

    /// Response JSON had the wrong shape
    #[error("invalid verdict: {0}")]
    Verdict(#[from] VerdictError),

    /// Concurrency pool shut down
    #[error("validation pool closed")]
    PoolClosed,
}

impl ValidationError {
    /// Check if another attempt should be made
    ///
    /// Gateway, parse and shape failures are all retried alike.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PoolClosed)
    }
}

/// Search collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Index backend failed
    #[error("search backend error: {0}")]
    Backend(String),

    /// Image path is not a known frame
    #[error("unknown frame: {0}")]
    UnknownFrame(String),

    /// Filesystem error
    #[error("io error on {path}: {source}")]
    Io {
        /// Path being read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Reasons a classification response was unusable
///
/// Never reaches pipeline callers: the classifier logs it and substitutes
/// [`Classification::fallback`](crate::types::Classification::fallback).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    /// Gateway call failed
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Response was not JSON
    #[error(transparent)]
    Malformed(#[from] MalformedResponseError),

    /// Response listed no scenes
    #[error("classification lists no scenes")]
    NoScenes,

    /// A scene entry could not be read
    #[error("scene #{position}: {reason}")]
    InvalidScene {
        /// Position in the scenes array
        position: usize,
        /// What went wrong
        reason: String,
    },
}

/// Prompt crafting errors
#[derive(Debug, thiserror::Error)]
pub enum PromptCraftingError {
    /// Gateway call failed
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Response was not JSON
    #[error(transparent)]
    Malformed(#[from] MalformedResponseError),

    /// Required key absent from the response
    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    /// Entry without an explicit scene index
    #[error("{modality} prompt #{position} has no scene index")]
    MissingSceneIndex {
        /// Modality of the entry
        modality: Modality,
        /// Position in the array
        position: usize,
    },

    /// Key present with the wrong type
    #[error("invalid `{key}`: {reason}")]
    InvalidEntry {
        /// Offending key
        key: &'static str,
        /// What went wrong
        reason: String,
    },

    /// Model reported an error instead of prompts
    #[error("model reported error: {0}")]
    Reported(String),
}

impl PromptCraftingError {
    /// Check if re-asking the model could help
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(e) if e.is_transient())
    }
}
