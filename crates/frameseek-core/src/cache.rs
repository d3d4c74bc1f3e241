//! Verdict cache using moka
//!
//! Keeps successful verdicts keyed by (image, prompt, question) so a frame
//! revisited during chaining or refinement does not cost another model call.
//! Sentinels are never cached.

use crate::types::ValidatedResult;
use moka::future::Cache;
use std::time::Duration;

/// Cache key: one validation request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerdictKey {
    /// Image path
    pub image_path: String,
    /// Target prompt
    pub prompt: String,
    /// Embedded question
    pub question: Option<String>,
}

impl VerdictKey {
    /// Create key
    #[inline]
    #[must_use]
    pub fn new(image_path: &str, prompt: &str, question: Option<&str>) -> Self {
        Self {
            image_path: image_path.to_string(),
            prompt: prompt.to_string(),
            question: question.map(str::to_string),
        }
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// Concurrent verdict cache
#[derive(Debug, Clone)]
pub struct VerdictCache {
    inner: Cache<VerdictKey, ValidatedResult>,
}

impl VerdictCache {
    /// Create new cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Look up a verdict
    #[inline]
    pub async fn get(&self, key: &VerdictKey) -> Option<ValidatedResult> {
        self.inner.get(key).await
    }

    /// Store a verdict; sentinels are ignored
    pub async fn insert(&self, key: VerdictKey, result: ValidatedResult) {
        if result.is_sentinel() {
            return;
        }
        self.inner.insert(key, result).await;
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchAssessment, MatchCategory, QuestionAnswer};

    fn exact(path: &str) -> ValidatedResult {
        ValidatedResult {
            image_path: path.to_string(),
            scene: None,
            match_assessment: MatchAssessment::new(MatchCategory::ExactMatch, 0.9),
            question_answer: QuestionAnswer::default(),
            justification: "match".to_string(),
            next_scene: None,
        }
    }

    #[tokio::test]
    async fn insert_and_get() {
        let cache = VerdictCache::new(10);
        let key = VerdictKey::new("a.jpg", "red car", None);
        cache.insert(key.clone(), exact("a.jpg")).await;
        assert_eq!(cache.get(&key).await, Some(exact("a.jpg")));
    }

    #[tokio::test]
    async fn question_is_part_of_key() {
        let cache = VerdictCache::new(10);
        cache
            .insert(VerdictKey::new("a.jpg", "red car", None), exact("a.jpg"))
            .await;
        assert!(cache
            .get(&VerdictKey::new("a.jpg", "red car", Some("plate?")))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn sentinels_are_not_cached() {
        let cache = VerdictCache::new(10);
        let key = VerdictKey::new("a.jpg", "red car", None);
        cache
            .insert(key.clone(), ValidatedResult::sentinel("a.jpg", None, "timeout"))
            .await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_all_clears() {
        let cache = VerdictCache::with_ttl(10, Duration::from_secs(60));
        let key = VerdictKey::new("a.jpg", "red car", None);
        cache.insert(key.clone(), exact("a.jpg")).await;
        cache.invalidate_all();
        assert!(cache.get(&key).await.is_none());
    }
}
