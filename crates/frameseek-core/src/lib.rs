//! Frameseek Core
//!
//! LLM-driven keyframe retrieval: turns a natural-language query into
//! validated, optionally time-chained matches over a video keyframe index.
//!
//! # Pipeline
//!
//! ```text
//! raw query → Classifier → PromptCrafter → per scene:
//!     SearchIndex (clip + caption) → merge → ImageValidator
//!     └─ temporal? → TemporalChainWalker → next_scene back-links
//! ```
//!
//! Model providers, the vector index and the keyframe store are injected
//! through the [`LlmGateway`], [`SearchIndex`] and [`TemporalNeighborLookup`]
//! traits.
//!
//! # Example
//!
//! ```rust,ignore
//! use frameseek_core::prelude::*;
//!
//! # async fn example(
//! #     gateway: Arc<dyn LlmGateway>,
//! #     index: Arc<dyn SearchIndex>,
//! # ) -> Result<(), PipelineError> {
//! let orchestrator = QueryPipelineOrchestrator::new(
//!     gateway,
//!     index,
//!     Arc::new(FrameDirectoryNeighbors::default()),
//!     PipelineConfig::default(),
//! );
//!
//! let report = orchestrator
//!     .execute("a woman enters a bank, then signs a form", 500, None)
//!     .await?;
//! println!("{} exact matches", report.summary.exact_matches.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod chain;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod crafter;
pub mod error;
pub mod frames;
pub mod gateway;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod refinement;
pub mod search;
pub mod types;
pub mod validator;
pub mod verdict;

pub use cache::{CacheStats, VerdictCache, VerdictKey};
pub use chain::{candidate_order, ChainWalk, TemporalChainWalker};
pub use classifier::{parse_classification, Classifier, LlmQueryClassifier};
pub use config::{ChainPolicy, PipelineConfig, RetryPolicy, ValidatorConfig};
pub use coordinator::SceneSearchCoordinator;
pub use crafter::{parse_crafted_prompts, LlmPromptCrafter, PromptCrafter};
pub use error::{
    ClassificationError, GatewayError, MalformedResponseError, PipelineError, PromptCraftingError,
    SearchError, ValidationError, VerdictError,
};
pub use frames::FrameDirectoryNeighbors;
pub use gateway::LlmGateway;
pub use orchestrator::{QueryPipelineOrchestrator, QueryReport};
pub use parser::{parse_response, parse_text, ModelResponse};
pub use refinement::{LlmQueryRefiner, QueryRefiner};
pub use search::{merge_candidates, SearchIndex, TemporalNeighborLookup};
pub use types::{
    extract_answer, CandidateImage, Classification, CraftedPrompts, MatchAssessment,
    MatchCategory, MatchSummary, Modality, PromptVariant, QueryId, QuestionAnswer, Scene,
    ScenePrompt, ValidatedResult,
};
pub use validator::ImageValidator;
pub use verdict::normalize_verdict;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building and running a pipeline
    pub use crate::config::{ChainPolicy, PipelineConfig, RetryPolicy, ValidatorConfig};
    pub use crate::error::{GatewayError, PipelineError, SearchError};
    pub use crate::frames::FrameDirectoryNeighbors;
    pub use crate::gateway::LlmGateway;
    pub use crate::orchestrator::{QueryPipelineOrchestrator, QueryReport};
    pub use crate::parser::ModelResponse;
    pub use crate::search::{SearchIndex, TemporalNeighborLookup};
    pub use crate::types::{
        CandidateImage, Classification, CraftedPrompts, MatchCategory, Scene, ValidatedResult,
    };
    pub use std::sync::Arc;
}
