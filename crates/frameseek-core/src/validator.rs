//! Image validator
//!
//! Asks a vision model whether each candidate frame matches a prompt. Calls
//! share one process-wide semaphore; a permit is held only for the duration
//! of a gateway call, so backoff sleeps never occupy a slot.
//!
//! Validation never fails: once retries are exhausted the candidate gets a
//! NoMatch sentinel and the batch carries on.

use crate::cache::{VerdictCache, VerdictKey};
use crate::config::ValidatorConfig;
use crate::error::{GatewayError, ValidationError};
use crate::gateway::LlmGateway;
use crate::parser::parse_response;
use crate::prompts::validation_prompt;
use crate::types::{CandidateImage, CraftedPrompts, PromptVariant, ValidatedResult};
use crate::verdict::normalize_verdict;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Concurrency-bounded, retrying image validator
#[derive(Clone)]
pub struct ImageValidator {
    gateway: Arc<dyn LlmGateway>,
    permits: Arc<Semaphore>,
    config: ValidatorConfig,
    cache: Option<VerdictCache>,
}

impl ImageValidator {
    /// Create validator with its own permit pool
    #[must_use]
    pub fn new(gateway: Arc<dyn LlmGateway>, config: ValidatorConfig) -> Self {
        let permits = Arc::new(Semaphore::new(
            config
                .max_concurrent_validations
                .clamp(1, Semaphore::MAX_PERMITS),
        ));
        Self::with_pool(gateway, config, permits)
    }

    /// Create validator drawing from an existing permit pool
    ///
    /// Validators built on the same pool share one concurrency bound.
    #[must_use]
    pub fn with_pool(
        gateway: Arc<dyn LlmGateway>,
        config: ValidatorConfig,
        permits: Arc<Semaphore>,
    ) -> Self {
        let cache = (config.cache_capacity > 0).then(|| VerdictCache::new(config.cache_capacity));
        Self {
            gateway,
            permits,
            config,
            cache,
        }
    }

    /// Shared permit pool
    #[inline]
    #[must_use]
    pub fn pool(&self) -> Arc<Semaphore> {
        Arc::clone(&self.permits)
    }

    /// Validator configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Verdict cache, when enabled
    #[inline]
    #[must_use]
    pub fn cache(&self) -> Option<&VerdictCache> {
        self.cache.as_ref()
    }

    /// Validate one candidate against one prompt
    ///
    /// Returns the model's verdict, or a NoMatch sentinel when the path is
    /// empty or every attempt failed.
    pub async fn validate_one(
        &self,
        image: &CandidateImage,
        prompt: &str,
        question: Option<&str>,
    ) -> ValidatedResult {
        let image_path = image.image_path.as_str();
        if image_path.trim().is_empty() {
            tracing::warn!(prompt, "skipping candidate with empty image path");
            return ValidatedResult::sentinel(image_path, question, "empty image path");
        }

        let key = VerdictKey::new(image_path, prompt, question);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                tracing::debug!(image_path, "verdict cache hit");
                return hit;
            }
        }

        let request = validation_prompt(image_path, prompt, question);
        let max_attempts = self.config.retry.attempts();
        let mut last_error = None;
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            match self.attempt(image_path, &request).await {
                Ok(mut result) => {
                    if result.question_answer.question.is_none() {
                        result.question_answer.question = question.map(str::to_string);
                    }
                    if let Some(cache) = &self.cache {
                        cache.insert(key, result.clone()).await;
                    }
                    return result;
                }
                Err(error) => {
                    tracing::warn!(
                        image_path,
                        attempt,
                        max_attempts,
                        cause = %error,
                        "validation attempt failed"
                    );
                    let retry = error.is_retryable() && attempt < max_attempts;
                    last_error = Some(error);
                    if !retry {
                        break;
                    }
                    let delay = self.config.retry.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let cause = last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string());
        tracing::warn!(
            image_path,
            attempts,
            cause = %cause,
            "validation exhausted, substituting sentinel"
        );
        ValidatedResult::sentinel(image_path, question, &cause)
    }

    /// One gateway call plus parse and shape check
    async fn attempt(&self, image_path: &str, request: &str) -> Result<ValidatedResult, ValidationError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ValidationError::PoolClosed)?;

        let call = self.gateway.analyze_image(image_path, request);
        let response = match self.config.call_timeout() {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                GatewayError::Timeout {
                    duration_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }
            })??,
            None => call.await?,
        };
        drop(permit);

        let object = parse_response(&response)?;
        Ok(normalize_verdict(&object, image_path)?)
    }

    /// Validate every candidate against one prompt, concurrently
    ///
    /// Output order follows completion, not input.
    pub async fn validate_candidates(
        &self,
        images: &[CandidateImage],
        prompt: &str,
        question: Option<&str>,
    ) -> Vec<ValidatedResult> {
        images
            .iter()
            .map(|image| self.validate_one(image, prompt, question))
            .collect::<FuturesUnordered<_>>()
            .collect()
            .await
    }

    /// Validate every candidate against every variant, concurrently
    ///
    /// Each result is tagged with its variant's scene. Produces
    /// `images.len() * variants.len()` results in completion order.
    pub async fn validate_variants(
        &self,
        images: &[CandidateImage],
        variants: &[PromptVariant],
    ) -> Vec<ValidatedResult> {
        let pending: FuturesUnordered<_> = variants
            .iter()
            .flat_map(move |variant| {
                images.iter().map(move |image| async move {
                    self.validate_one(image, &variant.prompt, variant.question.as_deref())
                        .await
                        .with_scene(variant.scene)
                })
            })
            .collect();

        tracing::debug!(
            candidates = images.len(),
            variants = variants.len(),
            "validating batch"
        );
        pending.collect().await
    }

    /// Validate every candidate against every crafted prompt
    pub async fn validate_many(
        &self,
        images: &[CandidateImage],
        crafted: &CraftedPrompts,
    ) -> Vec<ValidatedResult> {
        self.validate_variants(images, &crafted.variants()).await
    }
}

impl std::fmt::Debug for ImageValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageValidator")
            .field("config", &self.config)
            .field("available_permits", &self.permits.available_permits())
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}
