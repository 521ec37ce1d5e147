//! Job summary aggregates

use indexmap::{IndexMap, IndexSet};
use mig_core::{FileStructureChange, TransformResult};
use mig_transform::DiffStats;
use serde::{Deserialize, Serialize};

/// Outcome classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    /// No low-confidence results
    Success,
    /// Some low, some high
    Partial,
    /// No high-confidence results
    Failed,
}

/// Aggregates over all file results of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Files fetched
    pub total_files: usize,
    /// Files whose code changed
    pub transformed_files: usize,
    /// Files whose code did not change
    pub unchanged_files: usize,
    /// Lines added across diffs
    pub lines_added: usize,
    /// Lines removed across diffs
    pub lines_removed: usize,
    /// Distinct module specifiers added
    pub dependencies_added: Vec<String>,
    /// Distinct module specifiers removed
    pub dependencies_removed: Vec<String>,
    /// Mean confidence
    pub average_confidence: f64,
    /// Results flagged for review
    pub requires_review: usize,
    /// Results below the review threshold
    pub low_confidence: usize,
    /// Results at or above the review threshold
    pub high_confidence: usize,
    /// Planned structure changes
    pub structure_changes: usize,
    /// Classification
    pub status: SummaryStatus,
}

/// Build the summary for a job
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn summarize(
    results: &IndexMap<String, TransformResult>,
    structure_changes: &[FileStructureChange],
    review_threshold: u8,
) -> MigrationSummary {
    let mut added: IndexSet<String> = IndexSet::new();
    let mut removed: IndexSet<String> = IndexSet::new();
    let (mut lines_added, mut lines_removed) = (0, 0);
    let (mut transformed, mut review, mut low, mut high) = (0, 0, 0, 0);
    let mut confidence_sum = 0u64;

    for result in results.values() {
        if result.is_changed() {
            transformed += 1;
            let stats = DiffStats::from_unified(&result.diff);
            lines_added += stats.added;
            lines_removed += stats.removed;
        }
        if result.requires_review {
            review += 1;
        }
        if result.is_confident(review_threshold) {
            high += 1;
        } else {
            low += 1;
        }
        confidence_sum += u64::from(result.confidence);
        added.extend(result.metadata.dependencies_added.iter().cloned());
        removed.extend(result.metadata.dependencies_removed.iter().cloned());
    }

    let status = if low == 0 {
        SummaryStatus::Success
    } else if high == 0 {
        SummaryStatus::Failed
    } else {
        SummaryStatus::Partial
    };

    MigrationSummary {
        total_files: results.len(),
        transformed_files: transformed,
        unchanged_files: results.len() - transformed,
        lines_added,
        lines_removed,
        dependencies_added: added.into_iter().collect(),
        dependencies_removed: removed.into_iter().collect(),
        average_confidence: if results.is_empty() {
            0.0
        } else {
            confidence_sum as f64 / results.len() as f64
        },
        requires_review: review,
        low_confidence: low,
        high_confidence: high,
        structure_changes: structure_changes.len(),
        status,
    }
}
