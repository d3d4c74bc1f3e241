//! Search collaborator seams
//!
//! The vector index and the keyframe store are external; the pipeline only
//! sees these traits.

use crate::error::SearchError;
use crate::types::CandidateImage;
use async_trait::async_trait;
use indexmap::IndexMap;

/// Two-modality frame search
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Embedding-similarity search; candidates carry a distance
    async fn search(&self, prompt: &str, top_k: usize) -> Result<Vec<CandidateImage>, SearchError>;

    /// Caption search; candidates carry no distance
    async fn caption_search(
        &self,
        prompt: &str,
        top_k: usize,
    ) -> Result<Vec<CandidateImage>, SearchError>;
}

/// Frames near a given frame in the same source video
#[async_trait]
pub trait TemporalNeighborLookup: Send + Sync {
    /// Up to `count` frames following `image_path`, in chronological order
    async fn neighbors(&self, image_path: &str, count: usize)
        -> Result<Vec<CandidateImage>, SearchError>;
}

/// Merge candidate lists, deduplicating by image path
///
/// First-seen order is kept. When a path appears twice, the entry carrying a
/// distance wins. Empty paths are kept; the validator turns them into
/// sentinels.
#[must_use]
pub fn merge_candidates<I>(lists: I) -> Vec<CandidateImage>
where
    I: IntoIterator<Item = Vec<CandidateImage>>,
{
    let mut merged: IndexMap<String, CandidateImage> = IndexMap::new();
    for candidate in lists.into_iter().flatten() {
        match merged.get_mut(&candidate.image_path) {
            Some(existing) => {
                if existing.distance.is_none() && candidate.distance.is_some() {
                    existing.distance = candidate.distance;
                }
            }
            None => {
                merged.insert(candidate.image_path.clone(), candidate);
            }
        }
    }
    merged.into_values().collect()
}
