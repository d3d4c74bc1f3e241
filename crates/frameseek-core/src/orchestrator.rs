//! Query pipeline orchestrator
//!
//! Drives one query end to end:
//! 1. Classify the raw query (or take a human-verified classification)
//! 2. Craft per-scene prompts and check they line up with the scenes
//! 3. Search and validate each scene in order
//! 4. For temporal queries, chain each scene's matches forward and stop
//!    once a chain reaches the last scene
//! 5. Optionally refine the classification and retry while nothing matched

use crate::chain::TemporalChainWalker;
use crate::classifier::{Classifier, LlmQueryClassifier};
use crate::config::PipelineConfig;
use crate::coordinator::SceneSearchCoordinator;
use crate::crafter::{LlmPromptCrafter, PromptCrafter};
use crate::error::PipelineError;
use crate::gateway::LlmGateway;
use crate::refinement::{LlmQueryRefiner, QueryRefiner};
use crate::search::{SearchIndex, TemporalNeighborLookup};
use crate::types::{
    extract_answer, Classification, CraftedPrompts, MatchSummary, Modality, QueryId,
    ValidatedResult,
};
use crate::validator::ImageValidator;
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;

/// Everything produced for one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    /// Query identifier
    pub id: QueryId,
    /// Raw query text
    pub query: String,
    /// Classification used by the final attempt
    pub classification: Classification,
    /// Prompts crafted by the final attempt
    pub crafted: CraftedPrompts,
    /// Accumulated verdicts of the final attempt
    pub results: Vec<ValidatedResult>,
    /// Verdicts grouped by category
    pub summary: MatchSummary,
    /// Whether a temporal chain reached the last scene
    pub chain_complete: bool,
    /// Attempts made, refinements included
    pub attempts: u32,
}

impl QueryReport {
    /// Best answer to the query's embedded question, if any
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        let scene_questions = self.classification.scenes.iter().filter_map(|s| s.question());
        self.crafted
            .question
            .as_deref()
            .into_iter()
            .chain(scene_questions)
            .find_map(|question| extract_answer(&self.results, question))
    }
}

/// Results of a single attempt
struct Attempt {
    crafted: CraftedPrompts,
    results: Vec<ValidatedResult>,
    chain_complete: bool,
}

/// Top-level pipeline driver
pub struct QueryPipelineOrchestrator {
    classifier: Arc<dyn Classifier>,
    crafter: Arc<dyn PromptCrafter>,
    refiner: Option<Arc<dyn QueryRefiner>>,
    coordinator: SceneSearchCoordinator,
    walker: TemporalChainWalker,
    config: PipelineConfig,
}

impl QueryPipelineOrchestrator {
    /// Create orchestrator with model-backed classifier, crafter and refiner
    ///
    /// The coordinator and the chain walker share one validator, and with it
    /// one concurrency bound.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        index: Arc<dyn SearchIndex>,
        neighbors: Arc<dyn TemporalNeighborLookup>,
        config: PipelineConfig,
    ) -> Self {
        let validator = ImageValidator::new(Arc::clone(&gateway), config.validator);
        Self {
            classifier: Arc::new(LlmQueryClassifier::new(Arc::clone(&gateway))),
            crafter: Arc::new(LlmPromptCrafter::new(Arc::clone(&gateway))),
            refiner: Some(Arc::new(LlmQueryRefiner::new(gateway))),
            coordinator: SceneSearchCoordinator::new(index, validator.clone()),
            walker: TemporalChainWalker::new(validator, neighbors, config.neighbor_window)
                .with_policy(config.chain_policy),
            config,
        }
    }

    /// With a different classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// With a different prompt crafter
    #[must_use]
    pub fn with_crafter(mut self, crafter: Arc<dyn PromptCrafter>) -> Self {
        self.crafter = crafter;
        self
    }

    /// With a different refiner; `None` disables refinement
    #[must_use]
    pub fn with_refiner(mut self, refiner: Option<Arc<dyn QueryRefiner>>) -> Self {
        self.refiner = refiner;
        self
    }

    /// Pipeline configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a query and return its accumulated verdicts
    ///
    /// An empty list means nothing matched; it is not an error. A `top_k`
    /// of 0 uses [`PipelineConfig::top_k`].
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn process_query(
        &self,
        raw_query: &str,
        top_k: usize,
        verified: Option<Classification>,
    ) -> Result<Vec<ValidatedResult>, PipelineError> {
        Ok(self.execute(raw_query, top_k, verified).await?.results)
    }

    /// Run a query and return the full report
    ///
    /// A `verified` classification skips the classifier and is never
    /// refined. A `top_k` of 0 uses [`PipelineConfig::top_k`].
    ///
    /// # Errors
    /// - [`PipelineError::NoScenes`] for a classification without scenes
    /// - [`PipelineError::PromptCrafting`] when prompts cannot be crafted
    /// - [`PipelineError::MisalignedPrompts`] when a scene lacks a prompt
    /// - [`PipelineError::Search`] when a search collaborator fails
    pub async fn execute(
        &self,
        raw_query: &str,
        top_k: usize,
        verified: Option<Classification>,
    ) -> Result<QueryReport, PipelineError> {
        let top_k = if top_k == 0 { self.config.top_k } else { top_k };
        let id = QueryId::new();
        let span = tracing::info_span!("query", %id, top_k);
        self.run(id, raw_query, top_k, verified).instrument(span).await
    }

    async fn run(
        &self,
        id: QueryId,
        raw_query: &str,
        top_k: usize,
        verified: Option<Classification>,
    ) -> Result<QueryReport, PipelineError> {
        let refinable = verified.is_none();
        let mut classification = match verified {
            Some(c) => {
                if !c.is_well_formed() {
                    tracing::warn!(
                        declared = c.number_of_scenes,
                        actual = c.scenes.len(),
                        "verified classification scene count corrected"
                    );
                }
                Classification::new(c.temporal, c.question, c.scenes)
            }
            None => self.classifier.classify(raw_query).await,
        };

        let max_attempts = self.config.max_query_attempts.max(1);
        let mut attempt_no = 1;
        loop {
            let attempt = self.attempt(&classification, top_k).await?;
            let summary = MatchSummary::from_results(&attempt.results);
            tracing::info!(
                attempt = attempt_no,
                results = attempt.results.len(),
                exact = summary.exact_matches.len(),
                near = summary.near_matches.len(),
                chain_complete = attempt.chain_complete,
                "attempt finished"
            );

            let refiner = self.refiner.as_ref().filter(|_| refinable);
            let revised = match refiner {
                Some(refiner) if !summary.has_satisfactory_match() && attempt_no < max_attempts => {
                    refiner
                        .refine(raw_query, &classification, &attempt.results, attempt_no)
                        .await
                }
                _ => None,
            };

            match revised.filter(|next| *next != classification) {
                Some(next) => {
                    classification = next;
                    attempt_no += 1;
                }
                None => {
                    return Ok(QueryReport {
                        id,
                        query: raw_query.to_string(),
                        classification,
                        crafted: attempt.crafted,
                        results: attempt.results,
                        summary,
                        chain_complete: attempt.chain_complete,
                        attempts: attempt_no,
                    })
                }
            }
        }
    }

    /// Craft, search, validate and chain once
    async fn attempt(
        &self,
        classification: &Classification,
        top_k: usize,
    ) -> Result<Attempt, PipelineError> {
        if classification.scenes.is_empty() {
            return Err(PipelineError::NoScenes);
        }
        let crafted = self.crafter.craft(classification).await?;
        check_alignment(classification, &crafted)?;

        let mut scenes = classification.scenes.clone();
        scenes.sort_by_key(|s| s.index);

        let mut results = Vec::new();
        let mut chain_complete = false;
        for (position, scene) in scenes.iter().enumerate() {
            let mut scene_results = self.coordinator.process_scene(scene, &crafted, top_k).await?;

            if classification.temporal && position + 1 < scenes.len() {
                let walk = self
                    .walker
                    .walk(&scene_results, &scenes, position, &crafted)
                    .await?;
                chain_complete = walk.complete;
                walk.attach(&mut scene_results);
            }
            results.extend(scene_results);

            if chain_complete {
                tracing::info!(scene = scene.index, "chain complete, remaining scenes skipped");
                break;
            }
        }

        Ok(Attempt {
            crafted,
            results,
            chain_complete,
        })
    }
}

impl std::fmt::Debug for QueryPipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPipelineOrchestrator")
            .field("walker", &self.walker)
            .field("refiner", &self.refiner.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Every scene needs a clip and a caption prompt under its own index
fn check_alignment(
    classification: &Classification,
    crafted: &CraftedPrompts,
) -> Result<(), PipelineError> {
    for scene in &classification.scenes {
        for modality in [Modality::Clip, Modality::Caption] {
            if crafted.prompt_for(modality, scene.index).is_none() {
                return Err(PipelineError::MisalignedPrompts {
                    scene: scene.index,
                    modality,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Scene, ScenePrompt};

    #[test]
    fn alignment_is_checked_by_scene_index() {
        let classification =
            Classification::new(true, false, vec![Scene::new(1, "a"), Scene::new(2, "b")]);
        let positional = CraftedPrompts {
            clip_prompts: vec![ScenePrompt::new(0, "a"), ScenePrompt::new(1, "b")],
            caption_prompts: vec![ScenePrompt::new(1, "a"), ScenePrompt::new(2, "b")],
            question: None,
        };
        assert!(matches!(
            check_alignment(&classification, &positional),
            Err(PipelineError::MisalignedPrompts {
                scene: 2,
                modality: Modality::Clip
            })
        ));

        let aligned = CraftedPrompts {
            clip_prompts: vec![ScenePrompt::new(2, "b"), ScenePrompt::new(1, "a")],
            ..positional
        };
        assert!(check_alignment(&classification, &aligned).is_ok());
    }

    #[test]
    fn report_answer_uses_crafted_then_scene_questions() {
        use crate::types::{MatchAssessment, MatchCategory, QuestionAnswer};

        let result = ValidatedResult {
            image_path: "a.jpg".into(),
            scene: Some(1),
            match_assessment: MatchAssessment::new(MatchCategory::ExactMatch, 0.9),
            question_answer: QuestionAnswer {
                question: Some("what plate?".into()),
                answer: Some("29A-123".into()),
                confidence: 0.7,
            },
            justification: String::new(),
            next_scene: None,
        };
        let report = QueryReport {
            id: QueryId::new(),
            query: "red car, what plate?".into(),
            classification: Classification::new(
                false,
                true,
                vec![Scene::new(1, "red car").with_question("what plate?")],
            ),
            crafted: CraftedPrompts::default(),
            results: vec![result.clone()],
            summary: MatchSummary::from_results(&[result]),
            chain_complete: false,
            attempts: 1,
        };
        assert_eq!(report.answer(), Some("29A-123"));
    }
}
