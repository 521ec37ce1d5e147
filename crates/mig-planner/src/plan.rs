//! Phased migration plans
//!
//! A plan is a preparation phase, one phase per detected pattern category
//! (in [`PatternCategory`] order) and a verification phase. Every task of a
//! phase depends on every task of the phase before it, so phases execute in
//! sequence while the tasks inside a phase can overlap.

use crate::complexity::{
    estimate_complexity, estimate_task_time, Aggressiveness, ComplexityEstimate, ComplexityLevel,
};
use crate::error::PlanError;
use crate::graph::{
    build_graph, detect_circular_dependencies, estimate_total_time, get_execution_order,
    DependencyGraphNode,
};
use crate::types::{
    CodebaseStats, DetectedPattern, MigrationPhase, MigrationTask, PatternCategory, RiskLevel,
    TaskType,
};
use mig_core::{Language, SourceConfig, TargetConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Caller preferences applied when building a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanCustomization {
    /// How hard automation is pushed
    pub aggressiveness: Aggressiveness,
    /// Add a test-suite task to verification
    pub include_tests: bool,
    /// Pattern names left out of the plan
    pub excluded_patterns: Vec<String>,
}

impl Default for PlanCustomization {
    fn default() -> Self {
        Self {
            aggressiveness: Aggressiveness::Balanced,
            include_tests: true,
            excluded_patterns: Vec::new(),
        }
    }
}

/// Aggregates over all tasks of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Number of tasks
    pub total_tasks: usize,
    /// Automated tasks
    pub automated_tasks: usize,
    /// Manual tasks
    pub manual_tasks: usize,
    /// Review tasks
    pub review_tasks: usize,
    /// Sum of manual estimates
    pub total_minutes: u32,
    /// Sum of automated estimates
    pub automated_minutes: u32,
    /// Share of manual time saved by automation
    pub automation_percentage: u8,
    /// Overall complexity
    pub complexity: ComplexityLevel,
    /// Skills the team needs
    pub required_skills: Vec<String>,
}

/// Full migration plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Source configuration
    pub source: SourceConfig,
    /// Target configuration
    pub target: TargetConfig,
    /// Ordered phases
    pub phases: Vec<MigrationPhase>,
    /// Aggregates
    pub summary: PlanSummary,
    /// Complexity estimate the plan was built from
    pub complexity: ComplexityEstimate,
    /// Dependency graph over all tasks
    pub dependency_graph: Vec<DependencyGraphNode>,
    /// Customization used
    pub customization: PlanCustomization,
}

impl MigrationPlan {
    /// All tasks in phase order
    #[must_use]
    pub fn tasks(&self) -> Vec<MigrationTask> {
        self.phases.iter().flat_map(|p| p.tasks.iter().cloned()).collect()
    }

    fn rebuild(&mut self) {
        for phase in &mut self.phases {
            phase.refresh();
        }
        let tasks = self.tasks();
        self.summary = summarize(&tasks, &self.source, &self.target, self.complexity.level);
        self.dependency_graph = build_graph(&tasks);
    }
}

/// Result of [`validate_plan`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanValidation {
    /// No errors found
    pub valid: bool,
    /// Error messages
    pub errors: Vec<String>,
}

/// Sequential vs. parallel duration of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTimeline {
    /// Sum of manual estimates
    pub sequential_minutes: u32,
    /// Batched manual estimate
    pub parallel_minutes: u32,
    /// Sum of automated estimates
    pub sequential_automated_minutes: u32,
    /// Batched automated estimate
    pub parallel_automated_minutes: u32,
    /// Execution batches
    pub batches: Vec<Vec<String>>,
}

fn estimated(task: MigrationTask, aggressiveness: Aggressiveness) -> MigrationTask {
    let time = estimate_task_time(&task, aggressiveness);
    task.with_minutes(time.manual, time.automated)
}

fn preparation_phase(
    source: &SourceConfig,
    target: &TargetConfig,
    aggressiveness: Aggressiveness,
) -> MigrationPhase {
    let dependency_task = if source.framework.eq_ignore_ascii_case(&target.framework) {
        format!("Upgrade {} to {}", target.framework, target.version)
    } else {
        format!(
            "Install {} {} and drop {}-only packages",
            target.framework, target.version, source.framework
        )
    };
    let mut tasks = vec![
        MigrationTask::new("prep-backup", "Snapshot repository", TaskType::Automated),
        MigrationTask::new("prep-dependencies", dependency_task, TaskType::Manual)
            .with_risk(RiskLevel::Medium),
    ];
    if source.language != target.language && target.language == Language::TypeScript {
        tasks.push(MigrationTask::new(
            "prep-typescript",
            "Add TypeScript configuration",
            TaskType::Automated,
        ));
    }
    let tasks = tasks
        .into_iter()
        .map(|t| estimated(t, aggressiveness))
        .collect();
    MigrationPhase::new(
        "preparation",
        "Preparation",
        "Backup and dependency changes",
        tasks,
    )
}

fn pattern_phase(
    category: PatternCategory,
    patterns: &[&DetectedPattern],
    aggressiveness: Aggressiveness,
) -> MigrationPhase {
    let mut tasks = Vec::new();
    for (i, pattern) in patterns.iter().enumerate() {
        let id = format!("{}-{}", category.slug(), i + 1);
        let breaking = if pattern.severity == RiskLevel::High {
            vec![pattern
                .description
                .clone()
                .unwrap_or_else(|| format!("{} behaviour changes", pattern.name))]
        } else {
            Vec::new()
        };

        if pattern.automatable {
            let mut task = MigrationTask::new(&id, format!("Transform {}", pattern.name), TaskType::Automated)
                .with_risk(pattern.severity)
                .with_files(pattern.files.iter().cloned());
            task.breaking_changes = breaking;
            tasks.push(estimated(task, aggressiveness));

            if pattern.severity == RiskLevel::High {
                let review = MigrationTask::new(
                    format!("{id}-review"),
                    format!("Review {} changes", pattern.name),
                    TaskType::Review,
                )
                .with_risk(pattern.severity)
                .with_files(pattern.files.iter().cloned())
                .with_dependencies([id.clone()]);
                tasks.push(estimated(review, aggressiveness));
            }
        } else {
            let mut task = MigrationTask::new(&id, format!("Migrate {} by hand", pattern.name), TaskType::Manual)
                .with_risk(pattern.severity)
                .with_files(pattern.files.iter().cloned());
            task.breaking_changes = breaking;
            tasks.push(estimated(task, aggressiveness));
        }
    }
    MigrationPhase::new(
        category.slug(),
        category.phase_name(),
        format!("{} detected pattern(s)", patterns.len()),
        tasks,
    )
}

fn verification_phase(
    customization: &PlanCustomization,
    files: Vec<String>,
) -> MigrationPhase {
    let agg = customization.aggressiveness;
    let mut tasks = vec![estimated(
        MigrationTask::new("verify-build", "Build and type-check", TaskType::Automated),
        agg,
    )];
    if customization.include_tests {
        tasks.push(estimated(
            MigrationTask::new("verify-tests", "Run test suite", TaskType::Automated)
                .with_risk(RiskLevel::Medium),
            agg,
        ));
    }
    tasks.push(estimated(
        MigrationTask::new("verify-review", "Review low-confidence files", TaskType::Review)
            .with_risk(RiskLevel::Medium)
            .with_files(files),
        agg,
    ));
    MigrationPhase::new("verification", "Verification", "Build, test and review", tasks)
}

fn link_phases(phases: &mut [MigrationPhase]) {
    for i in 1..phases.len() {
        let previous: Vec<String> = phases[i - 1].tasks.iter().map(|t| t.id.clone()).collect();
        for task in &mut phases[i].tasks {
            for id in &previous {
                if !task.dependencies.contains(id) {
                    task.dependencies.push(id.clone());
                }
            }
        }
    }
}

fn required_skills(source: &SourceConfig, target: &TargetConfig) -> Vec<String> {
    let mut skills = vec![source.framework.clone()];
    if !source.framework.eq_ignore_ascii_case(&target.framework) {
        skills.push(target.framework.clone());
    }
    if source.language != target.language {
        skills.push(target.language.name().to_string());
    }
    if source.routing != target.routing {
        skills.push(format!("{} routing", target.framework));
    }
    skills
}

fn summarize(
    tasks: &[MigrationTask],
    source: &SourceConfig,
    target: &TargetConfig,
    complexity: ComplexityLevel,
) -> PlanSummary {
    let count = |ty: TaskType| tasks.iter().filter(|t| t.task_type == ty).count();
    let total_minutes = tasks
        .iter()
        .map(|t| t.estimated_minutes)
        .fold(0, u32::saturating_add);
    let automated_minutes = tasks
        .iter()
        .map(|t| t.automated_minutes)
        .fold(0, u32::saturating_add);
    let automation_percentage = if total_minutes == 0 {
        0
    } else {
        let saved = u64::from(total_minutes.saturating_sub(automated_minutes));
        u8::try_from(saved * 100 / u64::from(total_minutes)).unwrap_or(100)
    };
    PlanSummary {
        total_tasks: tasks.len(),
        automated_tasks: count(TaskType::Automated),
        manual_tasks: count(TaskType::Manual),
        review_tasks: count(TaskType::Review),
        total_minutes,
        automated_minutes,
        automation_percentage,
        complexity,
        required_skills: required_skills(source, target),
    }
}

/// Build a phased plan from detected patterns and codebase statistics
#[must_use]
pub fn create_plan(
    source: &SourceConfig,
    target: &TargetConfig,
    patterns: &[DetectedPattern],
    stats: &CodebaseStats,
    customization: Option<PlanCustomization>,
) -> MigrationPlan {
    let customization = customization.unwrap_or_default();
    let agg = customization.aggressiveness;
    let complexity = estimate_complexity(source, target, patterns, stats);

    let mut grouped: BTreeMap<PatternCategory, Vec<&DetectedPattern>> = BTreeMap::new();
    for pattern in patterns {
        if customization.excluded_patterns.contains(&pattern.name) {
            continue;
        }
        grouped.entry(pattern.category).or_default().push(pattern);
    }

    let review_files: BTreeSet<String> = grouped
        .values()
        .flatten()
        .flat_map(|p| p.files.iter().cloned())
        .collect();

    let mut phases = vec![preparation_phase(source, target, agg)];
    phases.extend(
        grouped
            .iter()
            .map(|(category, list)| pattern_phase(*category, list, agg)),
    );
    phases.push(verification_phase(&customization, review_files.into_iter().collect()));
    link_phases(&mut phases);

    let mut plan = MigrationPlan {
        source: source.clone(),
        target: target.clone(),
        phases,
        summary: summarize(&[], source, target, complexity.level),
        complexity,
        dependency_graph: Vec::new(),
        customization,
    };
    plan.rebuild();

    tracing::info!(
        phases = plan.phases.len(),
        tasks = plan.summary.total_tasks,
        score = plan.complexity.score,
        "created migration plan"
    );
    plan
}

/// Reorder each phase so automated work comes first
///
/// Dependencies between tasks of the same phase are respected; among the
/// tasks that are ready, automated ones go before review, review before
/// manual, and otherwise the original order is kept.
#[must_use]
pub fn optimize_plan(mut plan: MigrationPlan) -> MigrationPlan {
    for phase in &mut plan.phases {
        phase.tasks = order_phase(std::mem::take(&mut phase.tasks));
    }
    plan.rebuild();
    plan
}

fn order_phase(tasks: Vec<MigrationTask>) -> Vec<MigrationTask> {
    let local: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();
    let local_deps: Vec<Vec<usize>> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| {
            t.dependencies
                .iter()
                .filter_map(|d| local.get(d.as_str()).copied())
                .filter(|&j| j != i)
                .collect()
        })
        .collect();

    let mut done = vec![false; tasks.len()];
    let mut order = Vec::with_capacity(tasks.len());
    loop {
        let next = (0..tasks.len())
            .filter(|&i| !done[i] && local_deps[i].iter().all(|&j| done[j]))
            .min_by_key(|&i| (tasks[i].task_type.rank(), i));
        match next {
            Some(i) => {
                done[i] = true;
                order.push(i);
            }
            None => break,
        }
    }
    // Tasks caught in a local cycle keep their relative order at the end
    order.extend((0..tasks.len()).filter(|&i| !done[i]));

    let mut slots: Vec<Option<MigrationTask>> = tasks.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

/// Check a plan for structural problems
#[must_use]
pub fn validate_plan(plan: &MigrationPlan) -> PlanValidation {
    let mut errors = Vec::new();

    for (i, phase) in plan.phases.iter().enumerate() {
        if phase.name.trim().is_empty() {
            errors.push(PlanError::UnnamedPhase(i));
        }
        if phase.tasks.is_empty() {
            errors.push(PlanError::EmptyPhase(phase.name.clone()));
        }
    }

    let tasks = plan.tasks();
    let mut ids = HashSet::new();
    for task in &tasks {
        if !ids.insert(task.id.as_str()) {
            errors.push(PlanError::DuplicateTask(task.id.clone()));
        }
    }
    for task in &tasks {
        for dep in &task.dependencies {
            if !ids.contains(dep.as_str()) {
                errors.push(PlanError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    errors.extend(
        detect_circular_dependencies(&tasks)
            .into_iter()
            .map(PlanError::Cycle),
    );

    PlanValidation {
        valid: errors.is_empty(),
        errors: errors.iter().map(ToString::to_string).collect(),
    }
}

/// Sequential and dependency-aware durations of a plan
#[must_use]
pub fn generate_execution_timeline(plan: &MigrationPlan) -> ExecutionTimeline {
    let tasks = plan.tasks();
    let graph = build_graph(&tasks);
    ExecutionTimeline {
        sequential_minutes: tasks
            .iter()
            .map(|t| t.estimated_minutes)
            .fold(0, u32::saturating_add),
        parallel_minutes: estimate_total_time(&graph, &tasks, false),
        sequential_automated_minutes: tasks
            .iter()
            .map(|t| t.automated_minutes)
            .fold(0, u32::saturating_add),
        parallel_automated_minutes: estimate_total_time(&graph, &tasks, true),
        batches: get_execution_order(&graph),
    }
}
