//! Rule validator
//!
//! Checks the final code of a file against the specification's rule sets.
//! Rule patterns are regular expressions compiled once and cached.

use crate::error::ValidationError;
use async_trait::async_trait;
use dashmap::DashMap;
use mig_core::{MigrationSpecification, Rule};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Validator verdict for one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// No violations
    pub valid: bool,
    /// Violated rules, as messages
    pub violations: Vec<String>,
    /// Non-blocking findings
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Report with no findings
    #[must_use]
    pub fn clean() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }
}

/// Validates transformed code against rule sets
#[async_trait]
pub trait RuleValidator: Send + Sync {
    /// Validate `code` (the final output) produced from `original`
    ///
    /// # Errors
    /// Returns [`ValidationError`] when the rules themselves cannot be
    /// evaluated
    async fn validate_against_rules(
        &self,
        original: &str,
        code: &str,
        spec: &MigrationSpecification,
    ) -> Result<ValidationReport, ValidationError>;
}

/// Regex-backed validator
///
/// - `must_preserve`: violated when the pattern matched the original but
///   not the output
/// - `must_transform` / `must_remove`: violated when the pattern still
///   matches the output
/// - `must_refactor`: a match is reported as a warning
#[derive(Debug, Default)]
pub struct PatternRuleValidator {
    cache: DashMap<String, Arc<Regex>>,
}

impl PatternRuleValidator {
    /// Create with an empty pattern cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, rule: &Rule) -> Result<Arc<Regex>, ValidationError> {
        if let Some(re) = self.cache.get(&rule.pattern) {
            return Ok(Arc::clone(re.value()));
        }
        let re = Regex::new(&rule.pattern).map_err(|e| ValidationError::InvalidPattern {
            rule_id: rule.id.clone(),
            message: e.to_string(),
        })?;
        let re = Arc::new(re);
        self.cache.insert(rule.pattern.clone(), Arc::clone(&re));
        Ok(re)
    }

    /// Number of cached patterns
    #[must_use]
    pub fn cached_patterns(&self) -> usize {
        self.cache.len()
    }
}

fn describe(rule: &Rule) -> &str {
    if rule.description.is_empty() {
        &rule.id
    } else {
        &rule.description
    }
}

#[async_trait]
impl RuleValidator for PatternRuleValidator {
    async fn validate_against_rules(
        &self,
        original: &str,
        code: &str,
        spec: &MigrationSpecification,
    ) -> Result<ValidationReport, ValidationError> {
        let rules = &spec.rules;
        let mut report = ValidationReport::clean();

        for rule in &rules.must_preserve {
            let re = self.compile(rule)?;
            if re.is_match(original) && !re.is_match(code) {
                report
                    .violations
                    .push(format!("[{}] must be preserved: {}", rule.id, describe(rule)));
            }
        }
        for rule in &rules.must_transform {
            if self.compile(rule)?.is_match(code) {
                report
                    .violations
                    .push(format!("[{}] was not transformed: {}", rule.id, describe(rule)));
            }
        }
        for rule in &rules.must_remove {
            if self.compile(rule)?.is_match(code) {
                report
                    .violations
                    .push(format!("[{}] must be removed: {}", rule.id, describe(rule)));
            }
        }
        for rule in &rules.must_refactor {
            if self.compile(rule)?.is_match(code) {
                report
                    .warnings
                    .push(format!("[{}] needs refactoring: {}", rule.id, describe(rule)));
            }
        }

        report.valid = report.violations.is_empty();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mig_core::{
        ExportStyle, Language, LayoutConvention, NamingConvention, RoutingModel, RuleSets,
        SourceConfig, TargetConfig,
    };
    use pretty_assertions::assert_eq;

    fn spec(rules: RuleSets) -> MigrationSpecification {
        MigrationSpecification::new(
            SourceConfig {
                language: Language::JavaScript,
                framework: "react".into(),
                version: "18".into(),
                routing: RoutingModel::ClientSide,
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
                client_directive: true,
            },
        )
        .with_rules(rules)
    }

    #[tokio::test]
    async fn each_rule_kind() {
        let rules = RuleSets {
            must_preserve: vec![Rule::new("keep-props", "props kept", r"props\.title")],
            must_transform: vec![Rule::new("router", "", r"react-router-dom")],
            must_remove: vec![Rule::new("no-proptypes", "PropTypes removed", r"PropTypes")],
            must_refactor: vec![Rule::new("class", "class component", r"extends\s+React\.Component")],
        };
        let spec = spec(rules);
        let original = "import x from 'react-router-dom';\nprops.title;\nPropTypes;";
        let code = "import x from 'react-router-dom';\nclass A extends React.Component {}\nPropTypes;";

        let validator = PatternRuleValidator::new();
        let report = validator
            .validate_against_rules(original, code, &spec)
            .await
            .unwrap();

        assert!(!report.valid);
        assert_eq!(
            report.violations,
            vec![
                "[keep-props] must be preserved: props kept".to_string(),
                "[router] was not transformed: router".to_string(),
                "[no-proptypes] must be removed: PropTypes removed".to_string(),
            ]
        );
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(validator.cached_patterns(), 4);
    }

    #[tokio::test]
    async fn preserve_rule_ignores_absent_constructs() {
        let rules = RuleSets {
            must_preserve: vec![Rule::new("ctx", "", "useContext")],
            ..RuleSets::default()
        };
        let report = PatternRuleValidator::new()
            .validate_against_rules("a", "b", &spec(rules))
            .await
            .unwrap();
        assert_eq!(report, ValidationReport::clean());
    }

    #[tokio::test]
    async fn invalid_pattern_is_an_error() {
        let rules = RuleSets {
            must_remove: vec![Rule::new("bad", "", "(")],
            ..RuleSets::default()
        };
        let err = PatternRuleValidator::new()
            .validate_against_rules("", "", &spec(rules))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPattern { rule_id, .. } if rule_id == "bad"));
    }
}
