//! Recovery strategies for semantic-engine failures
//!
//! - [`RetryStrategy`]: bounded attempts with exponential backoff, honouring
//!   server delay hints
//! - [`FallbackStrategy`]: keep the deterministic output at reduced confidence
//! - [`SkipStrategy`]: keep the input, confidence 0, flag for review
//! - [`CompositeStrategy`]: first member that succeeds wins

use crate::error::TransformError;
use crate::semantic::{SemanticContext, SemanticEngine, SemanticOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Recovery tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Attempts after the initial failure
    pub max_retries: u32,
    /// First backoff delay
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay
    pub max_backoff_ms: u64,
    /// Confidence assigned by the fallback strategy
    pub fallback_confidence: u8,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            fallback_confidence: 40,
        }
    }
}

impl RecoveryConfig {
    /// Delay before retry `attempt` (0-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32, hint_ms: Option<u64>) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.min(20));
        let ms = hint_ms.map_or(exp, |hint| hint.max(exp)).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Default strategy chain for this config
    #[must_use]
    pub fn default_strategy(self) -> CompositeStrategy {
        CompositeStrategy::new(vec![
            Arc::new(RetryStrategy::new(self)),
            Arc::new(FallbackStrategy::new(self.fallback_confidence)),
            Arc::new(SkipStrategy),
        ])
    }
}

/// Inputs available to a recovery attempt
pub struct RecoveryContext<'a> {
    /// Engine that failed
    pub engine: &'a dyn SemanticEngine,
    /// Code handed to the engine (deterministic stage output)
    pub code: &'a str,
    /// Semantic context of the call
    pub ctx: &'a SemanticContext<'a>,
}

/// Successful recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    /// Strategy that produced the outcome
    pub strategy: &'static str,
    /// Outcome
    pub outcome: SemanticOutcome,
}

/// Recovery strategy
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Strategy name
    fn name(&self) -> &'static str;

    /// Whether this strategy should be tried for `error`
    fn applies_to(&self, error: &TransformError) -> bool;

    /// Produce a replacement outcome
    ///
    /// # Errors
    /// The last error seen when the strategy gives up
    async fn recover(
        &self,
        error: &TransformError,
        ctx: &RecoveryContext<'_>,
    ) -> Result<Recovered, TransformError>;
}

/// Re-invoke the engine with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryStrategy {
    config: RecoveryConfig,
}

impl RetryStrategy {
    /// Create
    #[must_use]
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RecoveryStrategy for RetryStrategy {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn applies_to(&self, error: &TransformError) -> bool {
        error.is_retryable() && self.config.max_retries > 0
    }

    async fn recover(
        &self,
        error: &TransformError,
        ctx: &RecoveryContext<'_>,
    ) -> Result<Recovered, TransformError> {
        let mut last = error.clone();
        for attempt in 0..self.config.max_retries {
            if !last.is_retryable() {
                break;
            }
            let delay = self.config.backoff(attempt, last.retry_after_ms());
            tracing::debug!(
                path = ctx.ctx.path,
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying semantic pass"
            );
            tokio::time::sleep(delay).await;
            match ctx.engine.transform_component(ctx.code, ctx.ctx).await {
                Ok(outcome) => {
                    return Ok(Recovered {
                        strategy: self.name(),
                        outcome,
                    })
                }
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}

/// Accept the deterministic output at a fixed, reduced confidence
#[derive(Debug, Clone, Copy)]
pub struct FallbackStrategy {
    confidence: u8,
}

impl FallbackStrategy {
    /// Create
    #[must_use]
    pub fn new(confidence: u8) -> Self {
        Self {
            confidence: confidence.min(100),
        }
    }
}

#[async_trait]
impl RecoveryStrategy for FallbackStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn applies_to(&self, error: &TransformError) -> bool {
        error.is_recoverable()
    }

    async fn recover(
        &self,
        _error: &TransformError,
        ctx: &RecoveryContext<'_>,
    ) -> Result<Recovered, TransformError> {
        Ok(Recovered {
            strategy: self.name(),
            outcome: SemanticOutcome {
                code: ctx.code.to_string(),
                confidence: self.confidence,
                reasoning: "semantic pass unavailable; deterministic rewrite kept".to_string(),
                warnings: Vec::new(),
                requires_review: true,
            },
        })
    }
}

/// Give up on the file but keep the batch going
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipStrategy;

#[async_trait]
impl RecoveryStrategy for SkipStrategy {
    fn name(&self) -> &'static str {
        "skip"
    }

    fn applies_to(&self, _error: &TransformError) -> bool {
        true
    }

    async fn recover(
        &self,
        _error: &TransformError,
        ctx: &RecoveryContext<'_>,
    ) -> Result<Recovered, TransformError> {
        Ok(Recovered {
            strategy: self.name(),
            outcome: SemanticOutcome {
                code: ctx.code.to_string(),
                confidence: 0,
                reasoning: "skipped; manual migration required".to_string(),
                warnings: Vec::new(),
                requires_review: true,
            },
        })
    }
}

/// Ordered list of strategies
#[derive(Clone)]
pub struct CompositeStrategy {
    members: Vec<Arc<dyn RecoveryStrategy>>,
}

impl std::fmt::Debug for CompositeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.members.iter().map(|m| m.name()))
            .finish()
    }
}

impl Default for CompositeStrategy {
    fn default() -> Self {
        RecoveryConfig::default().default_strategy()
    }
}

impl CompositeStrategy {
    /// Create from members, tried in order
    #[must_use]
    pub fn new(members: Vec<Arc<dyn RecoveryStrategy>>) -> Self {
        Self { members }
    }

    /// Member names in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.members.iter().map(|m| m.name()).collect()
    }
}

#[async_trait]
impl RecoveryStrategy for CompositeStrategy {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn applies_to(&self, error: &TransformError) -> bool {
        self.members.iter().any(|m| m.applies_to(error))
    }

    async fn recover(
        &self,
        error: &TransformError,
        ctx: &RecoveryContext<'_>,
    ) -> Result<Recovered, TransformError> {
        let mut last = error.clone();
        for member in &self.members {
            if !member.applies_to(error) {
                continue;
            }
            match member.recover(error, ctx).await {
                Ok(recovered) => return Ok(recovered),
                Err(e) => {
                    tracing::debug!(path = ctx.ctx.path, strategy = member.name(), error = %e, "recovery strategy failed");
                    last = e;
                }
            }
        }
        Err(last)
    }
}
