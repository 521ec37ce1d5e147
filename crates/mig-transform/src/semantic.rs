//! Semantic (model-assisted) stage contract
//!
//! The inference call itself lives outside this crate. Implementations of
//! [`SemanticEngine`] receive already rule-rewritten code and return new
//! code with a confidence score and rationale. Failures go through a
//! [`RecoveryStrategy`] before the file is given up on.

use crate::error::TransformError;
use crate::recovery::{RecoveryContext, RecoveryStrategy};
use crate::stage::{StageContext, StageOutput, StageSignals, TransformStage};
use async_trait::async_trait;
use mig_core::{FileType, MigrationSpecification};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the semantic engine knows about the file
#[derive(Debug, Clone, Copy)]
pub struct SemanticContext<'a> {
    /// Original path
    pub path: &'a str,
    /// Path after migration
    pub new_path: &'a str,
    /// File type
    pub file_type: FileType,
    /// Specification
    pub spec: &'a MigrationSpecification,
}

impl<'a> SemanticContext<'a> {
    /// Build from a stage context
    #[must_use]
    pub fn from_stage(ctx: &StageContext<'a>) -> Self {
        Self {
            path: &ctx.file.path,
            new_path: ctx.new_path,
            file_type: ctx.file_type,
            spec: ctx.spec,
        }
    }
}

/// Response of a semantic engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticOutcome {
    /// Rewritten code
    pub code: String,
    /// Confidence 0-100
    pub confidence: u8,
    /// Rationale
    pub reasoning: String,
    /// Warnings
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Engine asks for review
    #[serde(default)]
    pub requires_review: bool,
}

/// External semantic rewrite capability
#[async_trait]
pub trait SemanticEngine: Send + Sync {
    /// Rewrite a component
    ///
    /// # Errors
    /// `TransformError::Semantic`, with `retryable` / `rate_limited` set
    /// according to the upstream failure
    async fn transform_component(
        &self,
        code: &str,
        ctx: &SemanticContext<'_>,
    ) -> Result<SemanticOutcome, TransformError>;
}

/// Engine that returns its input with a fixed confidence
#[derive(Debug, Clone, Copy)]
pub struct PassthroughSemanticEngine {
    confidence: u8,
}

impl Default for PassthroughSemanticEngine {
    fn default() -> Self {
        Self { confidence: 85 }
    }
}

impl PassthroughSemanticEngine {
    /// Engine reporting `confidence` for every file
    #[inline]
    #[must_use]
    pub fn with_confidence(confidence: u8) -> Self {
        Self {
            confidence: confidence.min(100),
        }
    }
}

#[async_trait]
impl SemanticEngine for PassthroughSemanticEngine {
    async fn transform_component(
        &self,
        code: &str,
        _ctx: &SemanticContext<'_>,
    ) -> Result<SemanticOutcome, TransformError> {
        Ok(SemanticOutcome {
            code: code.to_string(),
            confidence: self.confidence,
            reasoning: "deterministic rewrite only".to_string(),
            warnings: Vec::new(),
            requires_review: false,
        })
    }
}

/// Stage calling a [`SemanticEngine`] with recovery on failure
#[derive(Clone)]
pub struct SemanticStage {
    engine: Arc<dyn SemanticEngine>,
    recovery: Arc<dyn RecoveryStrategy>,
}

impl std::fmt::Debug for SemanticStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticStage")
            .field("recovery", &self.recovery.name())
            .finish_non_exhaustive()
    }
}

impl SemanticStage {
    /// Create stage
    #[must_use]
    pub fn new(engine: Arc<dyn SemanticEngine>, recovery: Arc<dyn RecoveryStrategy>) -> Self {
        Self { engine, recovery }
    }
}

fn outcome_signals(outcome: &SemanticOutcome) -> StageSignals {
    StageSignals {
        confidence: Some(outcome.confidence.min(100)),
        warnings: outcome.warnings.clone(),
        requires_review: outcome.requires_review,
        notes: if outcome.reasoning.is_empty() {
            Vec::new()
        } else {
            vec![outcome.reasoning.clone()]
        },
        ..StageSignals::default()
    }
}

#[async_trait]
impl TransformStage for SemanticStage {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn apply(
        &self,
        code: &str,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, TransformError> {
        let sctx = SemanticContext::from_stage(ctx);
        match self.engine.transform_component(code, &sctx).await {
            Ok(outcome) => {
                let signals = outcome_signals(&outcome);
                Ok(StageOutput {
                    code: outcome.code,
                    signals,
                })
            }
            Err(error) => {
                tracing::warn!(path = %ctx.file.path, %error, "semantic pass failed, recovering");
                let recovery_ctx = RecoveryContext {
                    engine: self.engine.as_ref(),
                    code,
                    ctx: &sctx,
                };
                let recovered = self.recovery.recover(&error, &recovery_ctx).await?;
                let mut signals = outcome_signals(&recovered.outcome);
                signals.warnings.insert(
                    0,
                    format!("semantic pass failed ({error}); recovered by {}", recovered.strategy),
                );
                Ok(StageOutput {
                    code: recovered.outcome.code,
                    signals,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::SkipStrategy;
    use mig_core::{
        ExportStyle, Language, LayoutConvention, NamingConvention, RepositoryFile, RoutingModel,
        SourceConfig, TargetConfig,
    };

    struct Failing;

    #[async_trait]
    impl SemanticEngine for Failing {
        async fn transform_component(
            &self,
            _code: &str,
            _ctx: &SemanticContext<'_>,
        ) -> Result<SemanticOutcome, TransformError> {
            Err(TransformError::semantic_fatal("model offline"))
        }
    }

    fn spec() -> MigrationSpecification {
        MigrationSpecification::new(
            SourceConfig {
                language: Language::JavaScript,
                framework: "react".into(),
                version: "18".into(),
                routing: RoutingModel::ClientSide,
                patterns: vec![],
            },
            TargetConfig {
                language: Language::JavaScript,
                framework: "next".into(),
                version: "14".into(),
                routing: RoutingModel::PagesDirectory,
                layout: LayoutConvention::PagesRouter,
                naming: NamingConvention::KebabCase,
                exports: ExportStyle::Default,
                client_directive: false,
            },
        )
    }

    #[tokio::test]
    async fn passthrough_reports_configured_confidence() {
        let spec = spec();
        let file = RepositoryFile::new("a.js", "x");
        let ctx = StageContext {
            file: &file,
            spec: &spec,
            file_type: FileType::Other,
            new_path: "a.js",
        };
        let stage = SemanticStage::new(
            Arc::new(PassthroughSemanticEngine::with_confidence(90)),
            Arc::new(SkipStrategy),
        );
        let out = stage.apply("x", &ctx).await.unwrap();
        assert_eq!(out.code, "x");
        assert_eq!(out.signals.confidence, Some(90));
    }

    #[tokio::test]
    async fn failure_goes_through_recovery() {
        let spec = spec();
        let file = RepositoryFile::new("a.js", "x");
        let ctx = StageContext {
            file: &file,
            spec: &spec,
            file_type: FileType::Other,
            new_path: "a.js",
        };
        let stage = SemanticStage::new(Arc::new(Failing), Arc::new(SkipStrategy));
        let out = stage.apply("rewritten", &ctx).await.unwrap();
        assert_eq!(out.code, "rewritten");
        assert_eq!(out.signals.confidence, Some(0));
        assert!(out.signals.requires_review);
        assert!(out.signals.warnings[0].contains("recovered by skip"));
    }
}
