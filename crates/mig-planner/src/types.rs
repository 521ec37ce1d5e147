//! Planning vocabulary: tasks, phases, patterns and codebase statistics

use serde::{Deserialize, Serialize};

/// How a task gets done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Performed by the transformation engine
    Automated,
    /// Performed by a developer
    Manual,
    /// Automated output checked by a developer
    Review,
}

impl TaskType {
    /// Ordering rank used when optimizing a phase
    #[inline]
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            TaskType::Automated => 0,
            TaskType::Review => 1,
            TaskType::Manual => 2,
        }
    }
}

/// Risk / complexity level
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Mechanical change
    #[default]
    Low,
    /// Needs some care
    Medium,
    /// Behaviour is likely to change
    High,
}

impl RiskLevel {
    /// Time multiplier for manual estimates
    #[inline]
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        match self {
            RiskLevel::Low => 1.0,
            RiskLevel::Medium => 1.5,
            RiskLevel::High => 2.5,
        }
    }

    /// Weight of a detected pattern with this severity
    #[inline]
    #[must_use]
    pub fn weight(&self) -> f64 {
        match self {
            RiskLevel::Low => 1.0,
            RiskLevel::Medium => 3.0,
            RiskLevel::High => 5.0,
        }
    }
}

/// A unit of migration work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationTask {
    /// Unique id within a plan
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Task type
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Manual estimate in minutes
    pub estimated_minutes: u32,
    /// Estimate when the automated path is taken
    pub automated_minutes: u32,
    /// Risk level
    pub risk_level: RiskLevel,
    /// Files touched by the task
    #[serde(default)]
    pub affected_files: Vec<String>,
    /// Ids of tasks that must finish first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Breaking changes introduced by the task
    #[serde(default)]
    pub breaking_changes: Vec<String>,
}

impl MigrationTask {
    /// Create a task with zero estimates
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            task_type,
            estimated_minutes: 0,
            automated_minutes: 0,
            risk_level: RiskLevel::Low,
            affected_files: Vec::new(),
            dependencies: Vec::new(),
            breaking_changes: Vec::new(),
        }
    }

    /// Set manual and automated estimates
    #[inline]
    #[must_use]
    pub fn with_minutes(mut self, estimated: u32, automated: u32) -> Self {
        self.estimated_minutes = estimated;
        self.automated_minutes = automated;
        self
    }

    /// Set risk level
    #[inline]
    #[must_use]
    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    /// Set dependencies
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Set affected files
    #[must_use]
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Duration used by time estimates
    #[inline]
    #[must_use]
    pub fn duration(&self, use_automation: bool) -> u32 {
        if use_automation {
            self.automated_minutes
        } else {
            self.estimated_minutes
        }
    }
}

/// Ordered group of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPhase {
    /// Phase id
    pub id: String,
    /// Phase name
    pub name: String,
    /// Description
    pub description: String,
    /// Tasks in execution preference order
    pub tasks: Vec<MigrationTask>,
    /// Sum of manual estimates
    pub total_minutes: u32,
    /// Sum of automated estimates
    pub automated_minutes: u32,
    /// Highest task risk
    pub risk_level: RiskLevel,
    /// No task depends on another task of the same phase
    pub can_run_in_parallel: bool,
}

impl MigrationPhase {
    /// Create a phase and compute its aggregates
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        tasks: Vec<MigrationTask>,
    ) -> Self {
        let mut phase = Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            tasks,
            total_minutes: 0,
            automated_minutes: 0,
            risk_level: RiskLevel::Low,
            can_run_in_parallel: true,
        };
        phase.refresh();
        phase
    }

    /// Recompute aggregates after the task list changed
    pub fn refresh(&mut self) {
        self.total_minutes = self
            .tasks
            .iter()
            .map(|t| t.estimated_minutes)
            .fold(0, u32::saturating_add);
        self.automated_minutes = self
            .tasks
            .iter()
            .map(|t| t.automated_minutes)
            .fold(0, u32::saturating_add);
        self.risk_level = self
            .tasks
            .iter()
            .map(|t| t.risk_level)
            .max()
            .unwrap_or_default();
        self.can_run_in_parallel = !self.tasks.iter().any(|t| {
            t.dependencies
                .iter()
                .any(|d| self.tasks.iter().any(|other| &other.id == d))
        });
    }
}

/// Category a detected pattern belongs to, in phase order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    /// Routing and navigation
    Routing,
    /// Component APIs
    Components,
    /// Lifecycle methods and effects
    Lifecycle,
    /// State management libraries
    StateManagement,
    /// Data fetching
    DataFetching,
    /// Styling solutions
    Styling,
    /// Anything else
    Other,
}

impl PatternCategory {
    /// Phase name for this category
    #[must_use]
    pub fn phase_name(&self) -> &'static str {
        match self {
            PatternCategory::Routing => "Routing Migration",
            PatternCategory::Components => "Component Migration",
            PatternCategory::Lifecycle => "Lifecycle Migration",
            PatternCategory::StateManagement => "State Management Migration",
            PatternCategory::DataFetching => "Data Fetching Migration",
            PatternCategory::Styling => "Styling Migration",
            PatternCategory::Other => "Remaining Patterns",
        }
    }

    /// Slug used in ids
    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            PatternCategory::Routing => "routing",
            PatternCategory::Components => "components",
            PatternCategory::Lifecycle => "lifecycle",
            PatternCategory::StateManagement => "state-management",
            PatternCategory::DataFetching => "data-fetching",
            PatternCategory::Styling => "styling",
            PatternCategory::Other => "other",
        }
    }
}

/// Framework-specific pattern found in the source repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    /// Pattern name (`class-components`, `react-router`)
    pub name: String,
    /// Category
    pub category: PatternCategory,
    /// Severity
    pub severity: RiskLevel,
    /// Number of occurrences
    #[serde(default)]
    pub occurrences: usize,
    /// Files containing the pattern
    #[serde(default)]
    pub files: Vec<String>,
    /// Whether the transformation engine can handle it
    #[serde(default)]
    pub automatable: bool,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

impl DetectedPattern {
    /// Create a pattern with no files
    #[must_use]
    pub fn new(name: impl Into<String>, category: PatternCategory, severity: RiskLevel) -> Self {
        Self {
            name: name.into(),
            category,
            severity,
            occurrences: 0,
            files: Vec::new(),
            automatable: true,
            description: None,
        }
    }

    /// Set files (occurrences follow the file count when unset)
    #[must_use]
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        if self.occurrences == 0 {
            self.occurrences = self.files.len();
        }
        self
    }

    /// Mark as requiring manual work
    #[inline]
    #[must_use]
    pub fn manual(mut self) -> Self {
        self.automatable = false;
        self
    }
}

/// Aggregate statistics of the source repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodebaseStats {
    /// Number of source files
    pub total_files: usize,
    /// Number of source lines
    pub total_lines: usize,
    /// Test coverage percentage (0-100)
    pub test_coverage: f64,
    /// Number of package dependencies
    pub dependencies: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_aggregates() {
        let phase = MigrationPhase::new(
            "p",
            "Phase",
            "",
            vec![
                MigrationTask::new("a", "A", TaskType::Automated).with_minutes(30, 10),
                MigrationTask::new("b", "B", TaskType::Manual)
                    .with_minutes(20, 20)
                    .with_risk(RiskLevel::High)
                    .with_dependencies(["a"]),
            ],
        );
        assert_eq!(phase.total_minutes, 50);
        assert_eq!(phase.automated_minutes, 30);
        assert_eq!(phase.risk_level, RiskLevel::High);
        assert!(!phase.can_run_in_parallel);
    }

    #[test]
    fn phase_totals_saturate() {
        let phase = MigrationPhase::new(
            "p",
            "Phase",
            "",
            vec![
                MigrationTask::new("a", "A", TaskType::Manual).with_minutes(u32::MAX, 1),
                MigrationTask::new("b", "B", TaskType::Manual).with_minutes(10, 1),
            ],
        );
        assert_eq!(phase.total_minutes, u32::MAX);
        assert_eq!(phase.automated_minutes, 2);
    }

    #[test]
    fn task_type_serializes_as_type() {
        let task = MigrationTask::new("t", "T", TaskType::Review);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "review");
        assert_eq!(json["risk_level"], "low");
    }

    #[test]
    fn pattern_occurrences_default_to_files() {
        let p = DetectedPattern::new("x", PatternCategory::Routing, RiskLevel::Low)
            .with_files(["a.js", "b.js"]);
        assert_eq!(p.occurrences, 2);
        assert!(p.automatable);
        assert!(!p.manual().automatable);
    }
}
