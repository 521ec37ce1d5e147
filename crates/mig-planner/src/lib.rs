//! MIG Planner - dependency graph, complexity and migration plans
//!
//! - [`graph`] builds the task dependency graph, finds cycles, layers
//!   tasks into parallel batches and marks the critical path
//! - [`complexity`] scores a migration and estimates task durations
//! - [`plan`] assembles phased plans, validates and optimizes them and
//!   derives execution timelines
//!
//! # Example
//!
//! ```rust,ignore
//! use mig_planner::prelude::*;
//!
//! let plan = create_plan(&spec.source, &spec.target, &patterns, &stats, None);
//! let plan = optimize_plan(plan);
//! assert!(validate_plan(&plan).valid);
//! let timeline = generate_execution_timeline(&plan);
//! ```

#![warn(unreachable_pub)]

pub mod complexity;
pub mod error;
pub mod graph;
pub mod plan;
pub mod types;

pub use complexity::{
    estimate_complexity, estimate_task_time, Aggressiveness, ComplexityEstimate,
    ComplexityFactors, ComplexityLevel, TimeEstimate,
};
pub use error::PlanError;
pub use graph::{
    build_graph, calculate_parallelism_score, critical_path, detect_circular_dependencies,
    estimate_total_time, get_execution_order, DependencyGraphNode,
};
pub use plan::{
    create_plan, generate_execution_timeline, optimize_plan, validate_plan, ExecutionTimeline,
    MigrationPlan, PlanCustomization, PlanSummary, PlanValidation,
};
pub use types::{
    CodebaseStats, DetectedPattern, MigrationPhase, MigrationTask, PatternCategory, RiskLevel,
    TaskType,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for planning
    pub use crate::{
        build_graph, create_plan, generate_execution_timeline, optimize_plan, validate_plan,
        CodebaseStats, DetectedPattern, MigrationPlan, MigrationTask, TaskType,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
