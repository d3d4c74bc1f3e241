//! Scene search coordinator
//!
//! Runs both search modalities for one scene, merges their candidates and
//! validates the merged set against the scene's prompt variants.

use crate::error::PipelineError;
use crate::search::{merge_candidates, SearchIndex};
use crate::types::{CraftedPrompts, Modality, Scene, ValidatedResult};
use crate::validator::ImageValidator;
use std::sync::Arc;

/// Per-scene search and validation
#[derive(Clone)]
pub struct SceneSearchCoordinator {
    index: Arc<dyn SearchIndex>,
    validator: ImageValidator,
}

impl SceneSearchCoordinator {
    /// Create coordinator
    #[must_use]
    pub fn new(index: Arc<dyn SearchIndex>, validator: ImageValidator) -> Self {
        Self { index, validator }
    }

    /// Validator used for this coordinator's candidates
    #[inline]
    #[must_use]
    pub fn validator(&self) -> &ImageValidator {
        &self.validator
    }

    /// Search, merge and validate candidates for `scene`
    ///
    /// Prompts are looked up by the scene's index. Results are tagged with
    /// that index and come back in completion order.
    ///
    /// # Errors
    /// - [`PipelineError::MisalignedPrompts`] if either modality lacks a
    ///   prompt for the scene
    /// - [`PipelineError::Search`] if a search collaborator fails
    pub async fn process_scene(
        &self,
        scene: &Scene,
        crafted: &CraftedPrompts,
        top_k: usize,
    ) -> Result<Vec<ValidatedResult>, PipelineError> {
        let clip_prompt = required_prompt(crafted, Modality::Clip, scene.index)?;
        let caption_prompt = required_prompt(crafted, Modality::Caption, scene.index)?;

        let (clip, caption) = tokio::join!(
            self.index.search(clip_prompt, top_k),
            self.index.caption_search(caption_prompt, top_k),
        );
        let (clip, caption) = (clip?, caption?);
        tracing::debug!(
            scene = scene.index,
            clip = clip.len(),
            caption = caption.len(),
            "search returned candidates"
        );

        let candidates = merge_candidates([clip, caption]);
        if candidates.is_empty() {
            tracing::info!(scene = scene.index, "no candidates for scene");
            return Ok(Vec::new());
        }

        let variants = crafted.variants_for(scene);
        let results = self.validator.validate_variants(&candidates, &variants).await;
        tracing::info!(
            scene = scene.index,
            candidates = candidates.len(),
            verdicts = results.len(),
            promising = results.iter().filter(|r| r.category().is_promising()).count(),
            "scene validated"
        );
        Ok(results)
    }
}

fn required_prompt(
    crafted: &CraftedPrompts,
    modality: Modality,
    scene: u32,
) -> Result<&str, PipelineError> {
    crafted
        .prompt_for(modality, scene)
        .ok_or(PipelineError::MisalignedPrompts { scene, modality })
}
