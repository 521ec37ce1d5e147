//! Hybrid transformation engine
//!
//! Runs every script file through an ordered list of stages (deterministic
//! rule pass, then the semantic pass), validates the final code against the
//! specification's rule sets and composes confidence:
//!
//! ```text
//! confidence = base - min(cap, rule_errors * rule_error_penalty + violations * violation_penalty)
//! ```
//!
//! `base` is the last stage-reported confidence (100 when no stage reports
//! one). A stage error is contained to its file: the result keeps the
//! original code at confidence 0 and the batch carries on.

use crate::control::JobControl;
use crate::diff::unified_diff;
use crate::error::TransformError;
use crate::recovery::{CompositeStrategy, RecoveryStrategy};
use crate::rules::RuleStage;
use crate::semantic::{PassthroughSemanticEngine, SemanticEngine, SemanticStage};
use crate::stage::{StageContext, StageSignals, TransformStage};
use crate::validator::{PatternRuleValidator, RuleValidator, ValidationReport};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use mig_core::{
    FileStructureChange, FileType, MigrationSpecification, RepositoryFile, StructureAction,
    TransformMetadata, TransformResult, DEFAULT_REVIEW_THRESHOLD,
};
use mig_layout::{plan_structure_changes, StructurePlanner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confidence below which review is forced
    pub review_threshold: u8,
    /// Concurrent transforms in a batch
    pub max_concurrency: usize,
    /// Confidence lost per rule-stage error
    pub rule_error_penalty: u8,
    /// Confidence lost per rule violation
    pub violation_penalty: u8,
    /// Upper bound on the total penalty
    pub penalty_cap: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            max_concurrency: 5,
            rule_error_penalty: 10,
            violation_penalty: 15,
            penalty_cap: 45,
        }
    }
}

impl EngineConfig {
    /// Apply penalties to a base confidence
    #[must_use]
    pub fn compose_confidence(&self, base: u8, rule_errors: usize, violations: usize) -> u8 {
        let penalty = (rule_errors as u64)
            .saturating_mul(u64::from(self.rule_error_penalty))
            .saturating_add((violations as u64).saturating_mul(u64::from(self.violation_penalty)))
            .min(u64::from(self.penalty_cap));
        // penalty <= penalty_cap <= u8::MAX
        base.min(100).saturating_sub(u8::try_from(penalty).unwrap_or(u8::MAX))
    }
}

/// Batch progress snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Files finished so far
    pub processed_files: usize,
    /// Files in the batch
    pub total_files: usize,
    /// `processed / total`, in percent
    pub percentage: u8,
    /// File that just finished
    pub current_file: Option<String>,
}

impl BatchProgress {
    fn new(processed_files: usize, total_files: usize, current_file: Option<String>) -> Self {
        let percentage = if total_files == 0 {
            100
        } else {
            u8::try_from(processed_files.min(total_files) * 100 / total_files).unwrap_or(100)
        };
        Self {
            processed_files,
            total_files,
            percentage,
            current_file,
        }
    }

    /// Whether the batch is done
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.percentage == 100
    }
}

/// Aggregate numbers over a set of results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformationStatistics {
    /// Results counted
    pub total_files: usize,
    /// Results above the review threshold
    pub successful_transformations: usize,
    /// Results flagged for review
    pub requires_review: usize,
    /// Mean confidence, 0 when empty
    pub average_confidence: f64,
    /// Warnings across all results
    pub total_warnings: usize,
}

/// Summarize results
///
/// A transformation counts as successful when its confidence is strictly
/// above the default review threshold.
#[allow(clippy::cast_precision_loss)]
pub fn get_transformation_statistics<'a, I>(results: I) -> TransformationStatistics
where
    I: IntoIterator<Item = &'a TransformResult>,
{
    let mut stats = TransformationStatistics::default();
    let mut confidence_sum = 0u64;
    for result in results {
        stats.total_files += 1;
        if result.confidence > DEFAULT_REVIEW_THRESHOLD {
            stats.successful_transformations += 1;
        }
        if result.requires_review {
            stats.requires_review += 1;
        }
        stats.total_warnings += result.warnings.len();
        confidence_sum += u64::from(result.confidence);
    }
    if stats.total_files > 0 {
        stats.average_confidence = confidence_sum as f64 / stats.total_files as f64;
    }
    stats
}

/// Rule stage + semantic stage + validator
#[derive(Clone)]
pub struct HybridTransformationEngine {
    stages: Vec<Arc<dyn TransformStage>>,
    validator: Arc<dyn RuleValidator>,
    config: EngineConfig,
}

impl std::fmt::Debug for HybridTransformationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridTransformationEngine")
            .field("stages", &self.stage_names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for HybridTransformationEngine {
    fn default() -> Self {
        Self::new(
            EngineConfig::default(),
            Arc::new(PassthroughSemanticEngine::default()),
            Arc::new(CompositeStrategy::default()),
        )
    }
}

impl HybridTransformationEngine {
    /// Standard pipeline: tree-sitter rule stage, then `semantic` with `recovery`
    #[must_use]
    pub fn new(
        config: EngineConfig,
        semantic: Arc<dyn SemanticEngine>,
        recovery: Arc<dyn RecoveryStrategy>,
    ) -> Self {
        Self {
            stages: vec![
                Arc::new(RuleStage::default()),
                Arc::new(SemanticStage::new(semantic, recovery)),
            ],
            validator: Arc::new(PatternRuleValidator::new()),
            config,
        }
    }

    /// Replace the stage list
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<Arc<dyn TransformStage>>) -> Self {
        self.stages = stages;
        self
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stage names in execution order
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Transform a single file
    ///
    /// Never fails: stage errors degrade the result instead.
    pub async fn transform(
        &self,
        file: &RepositoryFile,
        spec: &MigrationSpecification,
    ) -> TransformResult {
        let planner = StructurePlanner::new(spec);
        let change = match planner.plan_file(file) {
            Ok(change) => change,
            Err(error) => {
                tracing::warn!(path = %file.path, %error, "file kept in place");
                None
            }
        };
        let file_type = change
            .as_ref()
            .map_or_else(|| planner.classify(file), |c| c.file_type);
        self.transform_planned(file, spec, file_type, change).await
    }

    async fn transform_planned(
        &self,
        file: &RepositoryFile,
        spec: &MigrationSpecification,
        file_type: FileType,
        change: Option<FileStructureChange>,
    ) -> TransformResult {
        let new_path = change
            .as_ref()
            .map_or_else(|| file.path.clone(), |c| c.new_path.clone());

        if change.as_ref().is_some_and(FileStructureChange::is_deletion) {
            let mut metadata = TransformMetadata::new(file_type);
            metadata.notes.push("obsolete in the target layout".to_string());
            metadata.structure_change = change;
            return TransformResult {
                code: file.content.clone(),
                new_path,
                diff: String::new(),
                confidence: 100,
                requires_review: false,
                warnings: Vec::new(),
                metadata,
            };
        }

        if !file.is_script() {
            let mut metadata = TransformMetadata::new(file_type);
            metadata.structure_change = change;
            return TransformResult {
                code: file.content.clone(),
                new_path,
                diff: String::new(),
                confidence: 100,
                requires_review: false,
                warnings: Vec::new(),
                metadata,
            };
        }

        let ctx = StageContext {
            file,
            spec,
            file_type,
            new_path: &new_path,
        };
        let mut code = file.content.clone();
        let mut signals = StageSignals::default();
        for stage in &self.stages {
            match stage.apply(&code, &ctx).await {
                Ok(out) => {
                    code = out.code;
                    signals.merge(out.signals);
                }
                Err(error) => {
                    tracing::warn!(path = %file.path, stage = stage.name(), %error, "transform failed");
                    let message = match error {
                        TransformError::Stage { .. } => error.to_string(),
                        _ => format!("{} stage failed: {error}", stage.name()),
                    };
                    let mut result = TransformResult::failed(file, file_type, message);
                    result.new_path = new_path;
                    result.metadata.structure_change = change;
                    return result;
                }
            }
        }

        let report = match self
            .validator
            .validate_against_rules(&file.content, &code, spec)
            .await
        {
            Ok(report) => report,
            Err(error) => {
                tracing::warn!(path = %file.path, %error, "rule validation could not run");
                ValidationReport {
                    valid: false,
                    violations: vec![error.to_string()],
                    warnings: Vec::new(),
                }
            }
        };

        let base = signals.confidence.unwrap_or(100);
        let confidence =
            self.config
                .compose_confidence(base, signals.errors.len(), report.violations.len());
        let requires_review = signals.requires_review
            || !report.valid
            || confidence < self.config.review_threshold;

        let mut warnings = signals.errors;
        warnings.extend(signals.warnings);
        warnings.extend(
            report
                .violations
                .into_iter()
                .map(|v| format!("rule violation: {v}")),
        );
        warnings.extend(report.warnings);

        let diff = unified_diff(&file.content, &code, &file.path, &new_path);
        TransformResult {
            code,
            new_path,
            diff,
            confidence,
            requires_review,
            warnings,
            metadata: TransformMetadata {
                file_type,
                dependencies_added: signals.dependencies_added,
                dependencies_removed: signals.dependencies_removed,
                notes: signals.notes,
                structure_change: change,
            },
        }
    }

    /// Transform many files with bounded concurrency
    ///
    /// `on_progress` fires once per finished file, with non-decreasing
    /// `processed_files`, and once more at 100% unless the batch was
    /// cancelled. Files not started before cancellation are absent from
    /// the returned map, which follows input order.
    pub async fn transform_batch<F>(
        &self,
        files: &[RepositoryFile],
        spec: &MigrationSpecification,
        control: Option<&JobControl>,
        mut on_progress: F,
    ) -> IndexMap<String, TransformResult>
    where
        F: FnMut(BatchProgress) + Send,
    {
        let total = files.len();
        let planner = StructurePlanner::new(spec);
        let planned: HashMap<String, FileStructureChange> = plan_structure_changes(files, spec)
            .into_iter()
            .filter(|c| c.action != StructureAction::Create)
            .map(|c| (c.original_path.clone(), c))
            .collect();

        tracing::info!(files = total, planned = planned.len(), spec = %spec.label(), "transforming batch");

        let mut slots: Vec<Option<TransformResult>> = vec![None; total];
        let mut processed = 0usize;
        {
            let planner = &planner;
            let planned = &planned;
            let mut results = stream::iter(files.iter().enumerate())
                .map(|(idx, file)| async move {
                    if let Some(control) = control {
                        if !control.wait_until_runnable().await {
                            return (idx, None);
                        }
                    }
                    let change = planned.get(&file.path).cloned();
                    let file_type = change
                        .as_ref()
                        .map_or_else(|| planner.classify(file), |c| c.file_type);
                    let result = self.transform_planned(file, spec, file_type, change).await;
                    (idx, Some(result))
                })
                .buffer_unordered(self.config.max_concurrency.max(1))
                .boxed();

            while let Some((idx, result)) = results.next().await {
                let Some(result) = result else { continue };
                processed += 1;
                on_progress(BatchProgress::new(
                    processed,
                    total,
                    Some(files[idx].path.clone()),
                ));
                slots[idx] = Some(result);
            }
        }

        let cancelled = control.is_some_and(JobControl::is_cancelled);
        if cancelled {
            tracing::info!(processed, total, "batch cancelled");
        } else {
            on_progress(BatchProgress::new(total, total, None));
        }

        files
            .iter()
            .zip(slots)
            .filter_map(|(file, slot)| slot.map(|r| (file.path.clone(), r)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mig_core::{
        ExportStyle, Language, LayoutConvention, MappingTables, NamingConvention, RoutingModel,
        Rule, RuleSets, SourceConfig, TargetConfig,
    };
    use pretty_assertions::assert_eq;

    fn spec() -> MigrationSpecification {
        let mut mappings = MappingTables::default();
        mappings
            .imports
            .insert("react-router-dom".into(), "next/navigation".into());
        mappings.routing.insert("useHistory".into(), "useRouter".into());
        MigrationSpecification::new(
            SourceConfig {
                language: Language::JavaScript,
                framework: "react".into(),
                version: "18".into(),
                routing: RoutingModel::PagesDirectory,
                patterns: vec![],
            },
            TargetConfig {
                language: Language::TypeScript,
                framework: "next".into(),
                version: "14".into(),
                routing: RoutingModel::AppDirectory,
                layout: LayoutConvention::AppRouter,
                naming: NamingConvention::KebabCase,
                exports: ExportStyle::Default,
                client_directive: false,
            },
        )
        .with_mappings(mappings)
    }

    #[test]
    fn confidence_composition() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.compose_confidence(90, 0, 0), 90);
        assert_eq!(cfg.compose_confidence(90, 1, 1), 65);
        assert_eq!(cfg.compose_confidence(90, 10, 10), 45);
        assert_eq!(cfg.compose_confidence(20, 10, 0), 0);
    }

    #[test]
    fn statistics() {
        let file = RepositoryFile::new("a.js", "x");
        let mut ok = TransformResult::failed(&file, FileType::Other, "w");
        ok.confidence = 90;
        ok.requires_review = false;
        let bad = TransformResult::failed(&file, FileType::Other, "w");
        let stats = get_transformation_statistics([&ok, &bad]);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.successful_transformations, 1);
        assert_eq!(stats.requires_review, 1);
        assert_eq!(stats.total_warnings, 2);
        assert!((stats.average_confidence - 45.0).abs() < f64::EPSILON);
        assert_eq!(get_transformation_statistics(Vec::<TransformResult>::new().iter()).total_files, 0);
    }

    #[tokio::test]
    async fn rewrites_and_relocates_a_page() {
        let engine = HybridTransformationEngine::new(
            EngineConfig::default(),
            Arc::new(PassthroughSemanticEngine::with_confidence(90)),
            Arc::new(CompositeStrategy::default()),
        );
        let file = RepositoryFile::new(
            "pages/about.jsx",
            "import { useHistory } from 'react-router-dom';\nexport default function About() {\n  const h = useHistory();\n  return null;\n}\n",
        );
        let result = engine.transform(&file, &spec()).await;
        assert_eq!(result.new_path, "app/about/page.tsx");
        assert!(result.code.contains("next/navigation"));
        assert!(result.code.contains("useRouter()"));
        assert_eq!(result.confidence, 90);
        assert!(!result.requires_review);
        assert!(result.diff.starts_with("--- a/pages/about.jsx\n+++ b/app/about/page.tsx\n"));
        assert_eq!(result.metadata.file_type, FileType::Page);
        assert!(result.metadata.structure_change.is_some());
    }

    #[tokio::test]
    async fn violations_lower_confidence_and_force_review() {
        let spec = spec().with_rules(RuleSets {
            must_remove: vec![Rule::new("no-proptypes", "PropTypes", r"PropTypes")],
            ..RuleSets::default()
        });
        let engine = HybridTransformationEngine::new(
            EngineConfig::default(),
            Arc::new(PassthroughSemanticEngine::with_confidence(80)),
            Arc::new(CompositeStrategy::default()),
        );
        let file = RepositoryFile::new("components/Card.jsx", "const t = PropTypes.string;\n");
        let result = engine.transform(&file, &spec).await;
        assert_eq!(result.confidence, 65);
        assert!(result.requires_review);
        assert_eq!(
            result.warnings,
            vec!["rule violation: [no-proptypes] must be removed: PropTypes".to_string()]
        );
    }

    #[tokio::test]
    async fn parse_failure_degrades_to_zero() {
        let engine = HybridTransformationEngine::default();
        let file = RepositoryFile::new("components/Broken.jsx", "export default function (\n");
        let result = engine.transform(&file, &spec()).await;
        assert_eq!(result.confidence, 0);
        assert!(result.requires_review);
        assert_eq!(result.code, file.content);
        assert!(result.warnings[0].starts_with("rule stage failed: parse error"));
    }

    #[tokio::test]
    async fn non_script_files_pass_through() {
        let engine = HybridTransformationEngine::default();
        let file = RepositoryFile::new("styles/globals.css", "body { margin: 0 }");
        let result = engine.transform(&file, &spec()).await;
        assert_eq!(result.confidence, 100);
        assert_eq!(result.code, file.content);
        assert_eq!(result.new_path, "app/globals.css");
        assert!(result.diff.is_empty());
    }
}
