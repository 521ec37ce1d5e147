//! Complexity scoring and task time estimates

use crate::types::{CodebaseStats, DetectedPattern, MigrationTask, TaskType};
use mig_core::{SourceConfig, TargetConfig};
use serde::{Deserialize, Serialize};

/// Bucketed complexity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ComplexityLevel {
    /// Score below 20
    Trivial,
    /// Score below 40
    Simple,
    /// Score below 60
    Moderate,
    /// Score below 80
    Complex,
    /// Score 80 and above
    VeryComplex,
}

impl ComplexityLevel {
    /// Bucket a 0-100 score
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=19 => ComplexityLevel::Trivial,
            20..=39 => ComplexityLevel::Simple,
            40..=59 => ComplexityLevel::Moderate,
            60..=79 => ComplexityLevel::Complex,
            _ => ComplexityLevel::VeryComplex,
        }
    }
}

/// Contribution of each factor to the score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityFactors {
    /// Files and lines
    pub codebase_size: f64,
    /// Pattern severity and count
    pub patterns: f64,
    /// Framework distance
    pub framework_distance: f64,
    /// Credit for test coverage (subtracted)
    pub test_coverage: f64,
}

/// Result of [`estimate_complexity`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityEstimate {
    /// Score 0-100
    pub score: u8,
    /// Bucketed level
    pub level: ComplexityLevel,
    /// Factor breakdown
    pub factors: ComplexityFactors,
    /// Rule-based recommendations
    pub recommendations: Vec<String>,
}

/// How hard the automation is pushed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggressiveness {
    /// Leave most decisions to developers
    Conservative,
    /// Default
    #[default]
    Balanced,
    /// Automate as much as possible
    Aggressive,
}

impl Aggressiveness {
    fn automated_factor(self) -> f64 {
        match self {
            Aggressiveness::Conservative => 0.5,
            Aggressiveness::Balanced => 0.3,
            Aggressiveness::Aggressive => 0.15,
        }
    }

    fn review_factor(self) -> f64 {
        match self {
            Aggressiveness::Conservative => 0.5,
            Aggressiveness::Balanced => 0.35,
            Aggressiveness::Aggressive => 0.25,
        }
    }
}

/// Manual and automated minutes for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEstimate {
    /// Minutes without automation
    pub manual: u32,
    /// Minutes with automation
    pub automated: u32,
}

const MINUTES_PER_FILE: f64 = 15.0;
const LARGE_CODEBASE_FILES: usize = 500;
const MANY_DEPENDENCIES: usize = 50;
const LOW_COVERAGE: f64 = 50.0;

fn major_version(version: &str) -> Option<u32> {
    let digits: String = version
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

#[allow(clippy::cast_precision_loss)]
fn size_factor(stats: &CodebaseStats) -> f64 {
    let files = (stats.total_files as f64 / 40.0).min(25.0);
    let lines = (stats.total_lines as f64 / 10_000.0).min(15.0);
    files + lines
}

#[allow(clippy::cast_precision_loss)]
fn pattern_factor(patterns: &[DetectedPattern]) -> f64 {
    patterns
        .iter()
        .map(|p| p.severity.weight() + (p.occurrences as f64 / 10.0).min(3.0))
        .sum::<f64>()
        .min(25.0)
}

fn distance_factor(source: &SourceConfig, target: &TargetConfig) -> f64 {
    let same_framework = source.framework.eq_ignore_ascii_case(&target.framework);
    let mut distance = if !same_framework {
        20.0
    } else if major_version(&source.version) == major_version(&target.version) {
        0.0
    } else {
        10.0
    };
    if source.language != target.language {
        distance += 5.0;
    }
    distance
}

/// Score how hard a migration is
#[must_use]
pub fn estimate_complexity(
    source: &SourceConfig,
    target: &TargetConfig,
    patterns: &[DetectedPattern],
    stats: &CodebaseStats,
) -> ComplexityEstimate {
    let factors = ComplexityFactors {
        codebase_size: size_factor(stats),
        patterns: pattern_factor(patterns),
        framework_distance: distance_factor(source, target),
        test_coverage: stats.test_coverage.clamp(0.0, 100.0) / 100.0 * 10.0,
    };
    let raw = factors.codebase_size + factors.patterns + factors.framework_distance
        - factors.test_coverage;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = raw.round().clamp(0.0, 100.0) as u8;

    let mut recommendations = Vec::new();
    if stats.test_coverage < LOW_COVERAGE {
        recommendations.push(format!(
            "Test coverage is {:.0}%; add tests around critical paths before migrating",
            stats.test_coverage
        ));
    }
    if stats.total_files > LARGE_CODEBASE_FILES {
        recommendations.push(format!(
            "{} files: migrate incrementally, one route or feature at a time",
            stats.total_files
        ));
    }
    if stats.dependencies > MANY_DEPENDENCIES {
        recommendations.push(format!(
            "{} dependencies: audit them for {} compatibility",
            stats.dependencies, target.framework
        ));
    }
    if !source.framework.eq_ignore_ascii_case(&target.framework) {
        recommendations.push(format!(
            "Budget time for the team to learn {} conventions",
            target.framework
        ));
    }

    ComplexityEstimate {
        score,
        level: ComplexityLevel::from_score(score),
        factors,
        recommendations,
    }
}

/// Estimate manual and automated minutes for a task
///
/// Manual time scales with the affected file count and the task's risk.
/// Automated tasks always save time, more so with higher aggressiveness.
/// Manual tasks save nothing. Review tasks land between 20% and 50% of
/// the manual time.
#[must_use]
pub fn estimate_task_time(task: &MigrationTask, aggressiveness: Aggressiveness) -> TimeEstimate {
    #[allow(clippy::cast_precision_loss)]
    let files = task.affected_files.len().max(1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let manual = (MINUTES_PER_FILE * files * task.risk_level.multiplier()).round() as u32;
    let manual = manual.max(2);
    let m = f64::from(manual);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let automated = match task.task_type {
        TaskType::Manual => manual,
        TaskType::Automated => {
            ((m * aggressiveness.automated_factor()).round() as u32).clamp(1, manual - 1)
        }
        TaskType::Review => {
            let low = (m * 0.2).ceil() as u32;
            let high = (m * 0.5).floor() as u32;
            ((m * aggressiveness.review_factor()).floor() as u32).clamp(low, high)
        }
    };
    TimeEstimate { manual, automated }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PatternCategory, RiskLevel};
    use mig_core::{ExportStyle, Language, NamingConvention, RoutingModel};

    fn source(framework: &str, version: &str) -> SourceConfig {
        SourceConfig {
            language: Language::JavaScript,
            framework: framework.to_string(),
            version: version.to_string(),
            routing: RoutingModel::ClientSide,
            patterns: vec![],
        }
    }

    fn target(framework: &str, version: &str, language: Language) -> TargetConfig {
        TargetConfig {
            language,
            framework: framework.to_string(),
            version: version.to_string(),
            routing: RoutingModel::AppDirectory,
            layout: RoutingModel::AppDirectory.layout_convention(),
            naming: NamingConvention::KebabCase,
            exports: ExportStyle::Default,
            client_directive: true,
        }
    }

    fn stats(files: usize, coverage: f64) -> CodebaseStats {
        CodebaseStats {
            total_files: files,
            total_lines: files * 100,
            test_coverage: coverage,
            dependencies: 10,
        }
    }

    #[test]
    fn level_buckets_are_monotonic() {
        let mut last = ComplexityLevel::Trivial;
        for score in 0..=100u8 {
            let level = ComplexityLevel::from_score(score);
            assert!(level >= last);
            last = level;
        }
        assert_eq!(ComplexityLevel::from_score(80), ComplexityLevel::VeryComplex);
    }

    #[test]
    fn framework_distance_raises_score() {
        let s = stats(100, 60.0);
        let same = estimate_complexity(&source("react", "17.0.2"), &target("react", "17.0.0", Language::JavaScript), &[], &s);
        let major = estimate_complexity(&source("react", "17"), &target("react", "18", Language::JavaScript), &[], &s);
        let other = estimate_complexity(&source("react", "18"), &target("next", "14", Language::JavaScript), &[], &s);
        assert_eq!(same.factors.framework_distance, 0.0);
        assert!(same.score < major.score);
        assert!(major.score < other.score);
    }

    #[test]
    fn coverage_lowers_score() {
        let src = source("react", "18");
        let tgt = target("next", "14", Language::TypeScript);
        let low = estimate_complexity(&src, &tgt, &[], &stats(400, 0.0));
        let high = estimate_complexity(&src, &tgt, &[], &stats(400, 100.0));
        assert!(high.score < low.score);
    }

    #[test]
    fn recommendations_follow_rules() {
        let src = source("react", "18");
        let tgt = target("next", "14", Language::TypeScript);
        let mut s = stats(800, 20.0);
        s.dependencies = 80;
        let est = estimate_complexity(&src, &tgt, &[], &s);
        assert_eq!(est.recommendations.len(), 4);

        let quiet = estimate_complexity(&src, &target("react", "18", Language::JavaScript), &[], &stats(10, 90.0));
        assert!(quiet.recommendations.is_empty());
    }

    #[test]
    fn patterns_capped() {
        let patterns: Vec<DetectedPattern> = (0..20)
            .map(|i| DetectedPattern::new(format!("p{i}"), PatternCategory::Other, RiskLevel::High))
            .collect();
        assert_eq!(pattern_factor(&patterns), 25.0);
    }

    #[test]
    fn task_time_ordering() {
        let files: Vec<String> = (0..4).map(|i| format!("f{i}.js")).collect();
        let auto = MigrationTask::new("a", "A", TaskType::Automated).with_files(files.clone());
        let c = estimate_task_time(&auto, Aggressiveness::Conservative);
        let b = estimate_task_time(&auto, Aggressiveness::Balanced);
        let a = estimate_task_time(&auto, Aggressiveness::Aggressive);
        assert_eq!(c.manual, 60);
        assert!(c.automated < c.manual);
        assert!(c.automated > b.automated && b.automated > a.automated);

        let manual = MigrationTask::new("m", "M", TaskType::Manual).with_risk(RiskLevel::High);
        let m = estimate_task_time(&manual, Aggressiveness::Aggressive);
        assert_eq!(m.manual, m.automated);

        let review = MigrationTask::new("r", "R", TaskType::Review).with_files(files);
        for agg in [Aggressiveness::Conservative, Aggressiveness::Balanced, Aggressiveness::Aggressive] {
            let r = estimate_task_time(&review, agg);
            assert!(r.automated * 5 >= r.manual && r.automated * 2 <= r.manual);
        }
    }

    #[test]
    fn risk_multiplier_orders_manual_time() {
        let low = estimate_task_time(&MigrationTask::new("l", "L", TaskType::Manual), Aggressiveness::Balanced);
        let med = estimate_task_time(
            &MigrationTask::new("m", "M", TaskType::Manual).with_risk(RiskLevel::Medium),
            Aggressiveness::Balanced,
        );
        let high = estimate_task_time(
            &MigrationTask::new("h", "H", TaskType::Manual).with_risk(RiskLevel::High),
            Aggressiveness::Balanced,
        );
        assert!(low.manual < med.manual && med.manual < high.manual);
    }
}
