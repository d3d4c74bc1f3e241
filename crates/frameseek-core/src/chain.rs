//! Temporal chain walker
//!
//! Extends a confirmed match in scene k forward through the following
//! scenes. For each promising scene-k candidate (strongest category first,
//! then highest confidence) the walker fetches a few subsequent frames,
//! validates them against the next scene's clip prompt and takes the first
//! Exact match as the continuation. The walk repeats from that frame until
//! the last scene is confirmed or a step finds no continuation.
//!
//! The walk is greedy: once a candidate advances, deeper failures do not
//! send it back to try siblings. [`ChainPolicy::BestOf`] widens the search
//! at scene k only.
//!
//! Links are collected in a flat arena and folded into nested
//! `next_scene` back-links by [`ChainWalk::attach`].

use crate::config::ChainPolicy;
use crate::error::PipelineError;
use crate::search::TemporalNeighborLookup;
use crate::types::{CraftedPrompts, MatchCategory, Modality, Scene, ValidatedResult};
use crate::validator::ImageValidator;
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of one chain walk
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChainWalk {
    /// Position, in the walked results, of the candidate heading the chain
    pub head: Option<usize>,
    /// Confirmed continuations in scene order, starting at scene k+1
    pub links: Vec<ValidatedResult>,
    /// Whether the chain reaches the last scene
    pub complete: bool,
}

impl ChainWalk {
    /// Whether any candidate advanced at least one scene
    #[inline]
    #[must_use]
    pub fn advanced(&self) -> bool {
        self.head.is_some()
    }

    fn confidence_sum(&self) -> f64 {
        self.links.iter().map(ValidatedResult::confidence).sum()
    }

    /// Complete chains beat partial ones, then longer beats shorter, then
    /// higher total confidence wins
    fn beats(&self, other: &Self) -> bool {
        match (self.complete, self.links.len()).cmp(&(other.complete, other.links.len())) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.confidence_sum() > other.confidence_sum(),
        }
    }

    /// Fold the links into `results[head].next_scene`
    ///
    /// `results` must be the slice that was walked. Partial chains are
    /// recorded too. Returns whether anything was attached.
    pub fn attach(self, results: &mut [ValidatedResult]) -> bool {
        let Some(target) = self.head.and_then(|head| results.get_mut(head)) else {
            return false;
        };
        target.next_scene = self.links.into_iter().rev().fold(None, |next, mut link| {
            link.next_scene = next;
            Some(Box::new(link))
        });
        true
    }
}

/// Greedy forward chaining across scenes
#[derive(Clone)]
pub struct TemporalChainWalker {
    validator: ImageValidator,
    neighbors: Arc<dyn TemporalNeighborLookup>,
    window: usize,
    policy: ChainPolicy,
}

impl TemporalChainWalker {
    /// Create walker inspecting `window` subsequent frames per step
    #[must_use]
    pub fn new(
        validator: ImageValidator,
        neighbors: Arc<dyn TemporalNeighborLookup>,
        window: usize,
    ) -> Self {
        Self {
            validator,
            neighbors,
            window,
            policy: ChainPolicy::default(),
        }
    }

    /// With exploration policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: ChainPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Exploration policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> ChainPolicy {
        self.policy
    }

    /// Walk forward from the results of `scenes[position]`
    ///
    /// Candidates are tried in [`candidate_order`]. Under
    /// [`ChainPolicy::FirstMatch`] the first candidate that advances decides
    /// the outcome; under [`ChainPolicy::BestOf`] up to `candidates`
    /// advancing candidates are walked and the best chain is kept.
    ///
    /// # Errors
    /// [`PipelineError::MisalignedPrompts`] if a later scene has no clip
    /// prompt. Neighbor lookup failures are logged and end that branch.
    pub async fn walk(
        &self,
        current: &[ValidatedResult],
        scenes: &[Scene],
        position: usize,
        crafted: &CraftedPrompts,
    ) -> Result<ChainWalk, PipelineError> {
        let Some(next) = scenes.get(position + 1) else {
            return Ok(ChainWalk::default());
        };

        let budget = self.policy.budget();
        let mut explored = 0;
        let mut best: Option<ChainWalk> = None;

        for index in candidate_order(current) {
            let Some(first) = self.advance(&current[index], next, crafted).await? else {
                continue;
            };
            let walk = self.extend(index, first, scenes, position + 1, crafted).await?;
            tracing::debug!(
                head = %current[index].image_path,
                links = walk.links.len(),
                complete = walk.complete,
                "chain candidate walked"
            );

            explored += 1;
            best = match best {
                Some(kept) if !walk.beats(&kept) => Some(kept),
                _ => Some(walk),
            };
            if explored >= budget {
                break;
            }
        }

        let walk = best.unwrap_or_default();
        if walk.complete {
            tracing::info!(
                from_scene = scenes[position].index,
                links = walk.links.len(),
                "temporal chain complete"
            );
        } else if !walk.advanced() {
            tracing::debug!(scene = scenes[position].index, "no candidate advanced");
        }
        Ok(walk)
    }

    /// Follow one confirmed continuation as far as it goes
    async fn extend(
        &self,
        head: usize,
        first: ValidatedResult,
        scenes: &[Scene],
        mut position: usize,
        crafted: &CraftedPrompts,
    ) -> Result<ChainWalk, PipelineError> {
        let mut links = vec![first];
        while let Some(next) = scenes.get(position + 1) {
            let Some(last) = links.last() else {
                break;
            };
            let step = self.advance(last, next, crafted).await?;
            match step {
                Some(link) => {
                    links.push(link);
                    position += 1;
                }
                None => break,
            }
        }

        Ok(ChainWalk {
            head: Some(head),
            links,
            complete: position + 1 == scenes.len(),
        })
    }

    /// Look for an Exact continuation of `from` in `next`
    ///
    /// The earliest qualifying neighbor, in lookup order, wins.
    async fn advance(
        &self,
        from: &ValidatedResult,
        next: &Scene,
        crafted: &CraftedPrompts,
    ) -> Result<Option<ValidatedResult>, PipelineError> {
        if !from.category().is_promising() {
            return Ok(None);
        }
        let prompt = crafted
            .prompt_for(Modality::Clip, next.index)
            .ok_or(PipelineError::MisalignedPrompts {
                scene: next.index,
                modality: Modality::Clip,
            })?;

        let frames = match self.neighbors.neighbors(&from.image_path, self.window).await {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(image_path = %from.image_path, error = %e, "neighbor lookup failed");
                return Ok(None);
            }
        };
        if frames.is_empty() {
            return Ok(None);
        }

        let question = crafted.question_for(next);
        let verdicts = self
            .validator
            .validate_candidates(&frames, prompt, question.as_deref())
            .await;

        Ok(frames
            .iter()
            .find_map(|frame| {
                verdicts.iter().find(|v| {
                    v.image_path == frame.image_path && v.category() == MatchCategory::ExactMatch
                })
            })
            .map(|v| v.clone().with_scene(next.index)))
    }
}

impl std::fmt::Debug for TemporalChainWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporalChainWalker")
            .field("window", &self.window)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Positions of promising results in the order the walker tries them
///
/// Exact before Near, then descending confidence. Weak and No matches are
/// never tried. The sort is stable, so equal keys keep input order. A frame
/// validated against several variants is tried once, at its strongest
/// verdict.
#[must_use]
pub fn candidate_order(results: &[ValidatedResult]) -> Vec<usize> {
    let mut order: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.category().is_promising())
        .map(|(i, _)| i)
        .collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&results[a], &results[b]);
        a.category()
            .chain_rank()
            .cmp(&b.category().chain_rank())
            .then_with(|| b.confidence().total_cmp(&a.confidence()))
    });
    let mut seen = HashSet::new();
    order.retain(|&i| seen.insert(results[i].image_path.as_str()));
    order
}
