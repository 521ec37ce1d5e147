//! MIG Transform - hybrid transformation engine
//!
//! Per-file pipeline, strictly in order:
//! 1. [`rules`] - deterministic tree-sitter rewrites driven by mapping tables
//! 2. [`semantic`] - pluggable model-assisted rewrite, with [`recovery`] on failure
//! 3. [`validator`] - rule-set checks on the final code
//!
//! [`engine`] composes the stages, confidence and diffs, and runs batches
//! under a concurrency ceiling with cooperative [`control`].
//!
//! # Example
//!
//! ```rust,ignore
//! use mig_transform::prelude::*;
//!
//! let engine = HybridTransformationEngine::default();
//! let results = engine
//!     .transform_batch(&files, &spec, None, |p| println!("{}%", p.percentage))
//!     .await;
//! let stats = get_transformation_statistics(results.values());
//! ```

#![warn(unreachable_pub)]

pub mod control;
pub mod diff;
pub mod engine;
pub mod error;
pub mod recovery;
pub mod rules;
pub mod semantic;
pub mod stage;
pub mod validator;

pub use control::{JobControl, RunState};
pub use diff::{unified_diff, DiffStats};
pub use engine::{
    get_transformation_statistics, BatchProgress, EngineConfig, HybridTransformationEngine,
    TransformationStatistics,
};
pub use error::{TransformError, ValidationError};
pub use recovery::{
    CompositeStrategy, FallbackStrategy, Recovered, RecoveryConfig, RecoveryContext,
    RecoveryStrategy, RetryStrategy, SkipStrategy,
};
pub use rules::{RuleEngine, RuleOutput, RuleStage, TreeSitterRuleEngine};
pub use semantic::{
    PassthroughSemanticEngine, SemanticContext, SemanticEngine, SemanticOutcome, SemanticStage,
};
pub use stage::{StageContext, StageOutput, StageSignals, TransformStage};
pub use validator::{PatternRuleValidator, RuleValidator, ValidationReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running transformations
    pub use crate::{
        get_transformation_statistics, BatchProgress, EngineConfig, HybridTransformationEngine,
        JobControl, SemanticEngine, SemanticOutcome, TransformError,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
