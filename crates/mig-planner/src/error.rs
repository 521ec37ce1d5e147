//! Plan validation errors

/// Structural problems found by [`crate::validate_plan`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Phase has an empty task list
    #[error("Phase '{0}' has no tasks")]
    EmptyPhase(String),

    /// Task id used more than once
    #[error("Duplicate task id '{0}'")]
    DuplicateTask(String),

    /// Dependency names no task in the plan
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// Dependent task
        task: String,
        /// Unresolved id
        dependency: String,
    },

    /// Tasks depend on each other in a loop
    #[error("Circular dependency: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// Phase without a name
    #[error("Phase at position {0} has no name")]
    UnnamedPhase(usize),
}
