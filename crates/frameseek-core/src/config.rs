//! Pipeline configuration
//!
//! Plain values passed into constructors at process start. Every struct
//! deserializes with defaults so partial TOML tables are accepted.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for validator gateway calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, first call included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Create retry policy
    #[inline]
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: u64::try_from(initial_backoff.as_millis()).unwrap_or(u64::MAX),
            max_backoff_ms: u64::try_from(max_backoff.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Policy without delays, for tests and local tooling
    #[inline]
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Attempts, never less than one
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after failed attempt `attempt` (1-based)
    ///
    /// Doubles from `initial_backoff_ms`, capped at `max_backoff_ms`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
        }
    }
}

/// Image validator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Maximum gateway calls in flight at once
    pub max_concurrent_validations: usize,
    /// Retry policy per validation
    pub retry: RetryPolicy,
    /// Per-call deadline in milliseconds (0 disables)
    pub call_timeout_ms: u64,
    /// Verdict cache capacity (0 disables)
    pub cache_capacity: u64,
}

impl ValidatorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With concurrency limit
    #[inline]
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_validations = max;
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With per-call timeout (zero disables)
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With verdict cache
    #[inline]
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Per-call deadline, if enabled
    #[inline]
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_validations: 256,
            retry: RetryPolicy::default(),
            call_timeout_ms: 30_000,
            cache_capacity: 0,
        }
    }
}

/// How many scene-k candidates the chain walker may explore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ChainPolicy {
    /// Stop at the first candidate whose continuation advances
    #[default]
    FirstMatch,
    /// Walk up to `candidates` advancing candidates and keep the best chain
    BestOf {
        /// Number of advancing candidates to explore
        candidates: usize,
    },
}

impl ChainPolicy {
    /// Advancing candidates to explore before settling
    #[inline]
    #[must_use]
    pub fn budget(self) -> usize {
        match self {
            Self::FirstMatch => 1,
            Self::BestOf { candidates } => candidates.max(1),
        }
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Validator settings
    pub validator: ValidatorConfig,
    /// Candidates fetched per modality and scene
    pub top_k: usize,
    /// Subsequent frames inspected per chain candidate
    pub neighbor_window: usize,
    /// Chain exploration policy
    pub chain_policy: ChainPolicy,
    /// Query attempts including refinements (1 disables refinement)
    pub max_query_attempts: u32,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With validator settings
    #[inline]
    #[must_use]
    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    /// With top-k
    #[inline]
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// With neighbor window
    #[inline]
    #[must_use]
    pub fn with_neighbor_window(mut self, window: usize) -> Self {
        self.neighbor_window = window;
        self
    }

    /// With chain policy
    #[inline]
    #[must_use]
    pub fn with_chain_policy(mut self, policy: ChainPolicy) -> Self {
        self.chain_policy = policy;
        self
    }

    /// With query attempts
    #[inline]
    #[must_use]
    pub fn with_max_query_attempts(mut self, attempts: u32) -> Self {
        self.max_query_attempts = attempts;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validator: ValidatorConfig::default(),
            top_k: 500,
            neighbor_window: 3,
            chain_policy: ChainPolicy::FirstMatch,
            max_query_attempts: 1,
        }
    }
}
