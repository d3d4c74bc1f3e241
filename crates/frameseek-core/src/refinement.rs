//! Query refinement
//!
//! When an attempt ends without an Exact or Near match, a refiner may
//! propose a revised classification for the next attempt.

use crate::classifier::parse_classification;
use crate::gateway::LlmGateway;
use crate::prompts::refinement_prompt;
use crate::types::{Classification, ValidatedResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Proposes a revised classification after an unsatisfying attempt
#[async_trait]
pub trait QueryRefiner: Send + Sync {
    /// Revise `previous` given the results of attempt `attempt`
    ///
    /// `None` ends refinement.
    async fn refine(
        &self,
        raw_query: &str,
        previous: &Classification,
        results: &[ValidatedResult],
        attempt: u32,
    ) -> Option<Classification>;
}

/// Refiner backed by a text-generation model
#[derive(Clone)]
pub struct LlmQueryRefiner {
    gateway: Arc<dyn LlmGateway>,
}

impl LlmQueryRefiner {
    /// Create refiner
    #[must_use]
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl QueryRefiner for LlmQueryRefiner {
    async fn refine(
        &self,
        raw_query: &str,
        previous: &Classification,
        results: &[ValidatedResult],
        attempt: u32,
    ) -> Option<Classification> {
        // Strongest evidence first so the prompt's truncation keeps it
        let mut evidence: Vec<ValidatedResult> = results.to_vec();
        evidence.sort_by(|a, b| {
            a.category()
                .relevance_rank()
                .cmp(&b.category().relevance_rank())
                .then_with(|| b.confidence().total_cmp(&a.confidence()))
        });

        let prompt = refinement_prompt(raw_query, previous, &evidence, attempt);
        let text = match self.gateway.generate_text(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(attempt, error = %e, "refinement request failed");
                return None;
            }
        };

        match parse_classification(&text) {
            Ok(revised) if revised == *previous => {
                tracing::info!(attempt, "refiner proposed no change");
                None
            }
            Ok(revised) => {
                tracing::info!(attempt, scenes = revised.scenes.len(), "query refined");
                Some(revised)
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "refinement response unusable");
                None
            }
        }
    }
}
