//! Migration specification types
//!
//! A [`MigrationSpecification`] describes one source -> target transition:
//! - Source configuration (language, framework, routing model, detected patterns)
//! - Target configuration (adds file layout, naming and export conventions)
//! - Declarative mapping tables consumed by the rule stage
//! - Rule sets consumed by the validator
//!
//! Specifications are immutable once attached to a job; the orchestrator
//! shares them behind an `Arc`.

use crate::error::SpecError;
use crate::layout::LayoutConvention;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source language of a code base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// JavaScript (including JSX)
    #[default]
    JavaScript,
    /// TypeScript (including TSX)
    TypeScript,
}

impl Language {
    /// Human-readable name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }
}

/// How a framework resolves URLs to code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingModel {
    /// Routes declared in code (react-router style), page files under `src/pages`
    ClientSide,
    /// File-based routing from a `pages/` directory
    PagesDirectory,
    /// Nested file-based routing from an `app/` directory
    AppDirectory,
}

impl RoutingModel {
    /// Directory convention implied by this routing model
    #[inline]
    #[must_use]
    pub fn layout_convention(&self) -> LayoutConvention {
        match self {
            RoutingModel::ClientSide => LayoutConvention::SpaRouter,
            RoutingModel::PagesDirectory => LayoutConvention::PagesRouter,
            RoutingModel::AppDirectory => LayoutConvention::AppRouter,
        }
    }
}

/// File naming convention for generated paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NamingConvention {
    /// `user-profile`
    #[default]
    KebabCase,
    /// `UserProfile`
    PascalCase,
    /// `userProfile`
    CamelCase,
}

/// Preferred export style of migrated modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExportStyle {
    /// `export default function Page()`
    #[default]
    Default,
    /// `export function Page()`
    Named,
}

/// Configuration of the code base being migrated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source language
    pub language: Language,
    /// Framework name (e.g. `react`, `next`)
    pub framework: String,
    /// Framework version (semver-ish)
    pub version: String,
    /// Routing model
    pub routing: RoutingModel,
    /// Patterns detected in the code base (e.g. `class-components`)
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl SourceConfig {
    /// Directory convention of the source
    #[inline]
    #[must_use]
    pub fn layout(&self) -> LayoutConvention {
        self.routing.layout_convention()
    }
}

/// Configuration the code base is migrated to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target language
    pub language: Language,
    /// Framework name
    pub framework: String,
    /// Framework version
    pub version: String,
    /// Routing model
    pub routing: RoutingModel,
    /// File layout convention
    pub layout: LayoutConvention,
    /// Naming convention for generated paths
    #[serde(default)]
    pub naming: NamingConvention,
    /// Export convention
    #[serde(default)]
    pub exports: ExportStyle,
    /// Whether modules using client hooks need a `'use client'` directive
    #[serde(default)]
    pub client_directive: bool,
}

/// Declarative rename tables consumed by the rule stage
///
/// Keys are source identifiers or module specifiers, values their target
/// replacements. `BTreeMap` keeps rewrites deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingTables {
    /// Module specifier renames (`react-router-dom` -> `next/navigation`)
    pub imports: BTreeMap<String, String>,
    /// Routing API renames (`useHistory` -> `useRouter`)
    pub routing: BTreeMap<String, String>,
    /// Component renames (`Link` -> `Link`, `Helmet` -> `Head`)
    pub components: BTreeMap<String, String>,
    /// Styling module renames
    pub styling: BTreeMap<String, String>,
    /// State-management module or API renames
    pub state_management: BTreeMap<String, String>,
    /// Lifecycle method -> effect mapping (`componentDidMount` -> `useEffect(fn, [])`)
    pub lifecycle: BTreeMap<String, String>,
}

impl MappingTables {
    /// Look up a module specifier rename across the module-level tables
    #[must_use]
    pub fn module_rename(&self, specifier: &str) -> Option<&str> {
        self.imports
            .get(specifier)
            .or_else(|| self.styling.get(specifier))
            .or_else(|| self.state_management.get(specifier))
            .map(String::as_str)
    }

    /// Look up an identifier rename across the API-level tables
    #[must_use]
    pub fn identifier_rename(&self, ident: &str) -> Option<&str> {
        self.routing
            .get(ident)
            .or_else(|| self.components.get(ident))
            .map(String::as_str)
    }

    /// Total number of entries across all tables
    #[must_use]
    pub fn len(&self) -> usize {
        self.imports.len()
            + self.routing.len()
            + self.components.len()
            + self.styling.len()
            + self.state_management.len()
            + self.lifecycle.len()
    }

    /// True when every table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single validation rule
///
/// `pattern` is a regular expression evaluated against transformed code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable rule identifier
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Regular expression
    pub pattern: String,
}

impl Rule {
    /// Create a rule
    #[inline]
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            pattern: pattern.into(),
        }
    }
}

/// Rule sets checked by the validator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSets {
    /// Constructs that must survive the transformation
    pub must_preserve: Vec<Rule>,
    /// Constructs that must be rewritten
    pub must_transform: Vec<Rule>,
    /// Constructs that must disappear
    pub must_remove: Vec<Rule>,
    /// Constructs that need a structural refactor (reported as warnings)
    pub must_refactor: Vec<Rule>,
}

impl RuleSets {
    /// Iterate over every rule
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.must_preserve
            .iter()
            .chain(&self.must_transform)
            .chain(&self.must_remove)
            .chain(&self.must_refactor)
    }
}

/// Specification metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecMetadata {
    /// Complexity estimate recorded at planning time (0-100)
    pub complexity_estimate: Option<u8>,
    /// Known breaking changes of the transition
    pub breaking_changes: Vec<String>,
}

/// Full description of a migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSpecification {
    /// Source configuration
    pub source: SourceConfig,
    /// Target configuration
    pub target: TargetConfig,
    /// Rename tables
    #[serde(default)]
    pub mappings: MappingTables,
    /// Validation rules
    #[serde(default)]
    pub rules: RuleSets,
    /// Metadata
    #[serde(default)]
    pub metadata: SpecMetadata,
}

impl MigrationSpecification {
    /// Create specification with empty tables
    #[inline]
    #[must_use]
    pub fn new(source: SourceConfig, target: TargetConfig) -> Self {
        Self {
            source,
            target,
            mappings: MappingTables::default(),
            rules: RuleSets::default(),
            metadata: SpecMetadata::default(),
        }
    }

    /// With mapping tables
    #[inline]
    #[must_use]
    pub fn with_mappings(mut self, mappings: MappingTables) -> Self {
        self.mappings = mappings;
        self
    }

    /// With rule sets
    #[inline]
    #[must_use]
    pub fn with_rules(mut self, rules: RuleSets) -> Self {
        self.rules = rules;
        self
    }

    /// Whether the transition changes framework
    #[inline]
    #[must_use]
    pub fn changes_framework(&self) -> bool {
        !self
            .source
            .framework
            .eq_ignore_ascii_case(&self.target.framework)
    }

    /// Short `source -> target` label for logs
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{}@{} ({:?}) -> {}@{} ({:?})",
            self.source.framework,
            self.source.version,
            self.source.routing,
            self.target.framework,
            self.target.version,
            self.target.layout
        )
    }

    /// Structural validation of the specification
    ///
    /// # Errors
    /// - `SpecError::MissingField` for empty framework names
    /// - `SpecError::DuplicateRule` when two rules share an id
    /// - `SpecError::SelfMapping` when a table maps a key onto itself
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.source.framework.trim().is_empty() {
            return Err(SpecError::MissingField("source.framework"));
        }
        if self.target.framework.trim().is_empty() {
            return Err(SpecError::MissingField("target.framework"));
        }

        let mut seen = std::collections::HashSet::new();
        for rule in self.rules.iter() {
            if !seen.insert(rule.id.as_str()) {
                return Err(SpecError::DuplicateRule(rule.id.clone()));
            }
        }

        let tables = [
            &self.mappings.imports,
            &self.mappings.routing,
            &self.mappings.components,
            &self.mappings.styling,
            &self.mappings.state_management,
        ];
        for table in tables {
            if let Some((key, _)) = table.iter().find(|(k, v)| k == v) {
                return Err(SpecError::SelfMapping(key.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> MigrationSpecification {
        MigrationSpecification::new(
            SourceConfig {
                language: Language::JavaScript,
                framework: "react".to_string(),
                version: "18.2.0".to_string(),
                routing: RoutingModel::ClientSide,
                patterns: vec![],
            },
            TargetConfig {
                language: Language::TypeScript,
                framework: "next".to_string(),
                version: "14.0.0".to_string(),
                routing: RoutingModel::AppDirectory,
                layout: LayoutConvention::AppRouter,
                naming: NamingConvention::KebabCase,
                exports: ExportStyle::Default,
                client_directive: true,
            },
        )
    }

    #[test]
    fn changes_framework_is_case_insensitive() {
        let mut s = spec();
        assert!(s.changes_framework());
        s.target.framework = "REACT".to_string();
        assert!(!s.changes_framework());
    }

    #[test]
    fn module_rename_checks_all_module_tables() {
        let mut tables = MappingTables::default();
        tables
            .imports
            .insert("react-router-dom".to_string(), "next/navigation".to_string());
        tables
            .styling
            .insert("styled-components".to_string(), "@emotion/styled".to_string());

        assert_eq!(tables.module_rename("react-router-dom"), Some("next/navigation"));
        assert_eq!(tables.module_rename("styled-components"), Some("@emotion/styled"));
        assert_eq!(tables.module_rename("react"), None);
        assert_eq!(tables.len(), 2);
    }

    #[test]
    fn validate_rejects_duplicate_rule_ids() {
        let s = spec().with_rules(RuleSets {
            must_remove: vec![Rule::new("r1", "a", "a"), Rule::new("r1", "b", "b")],
            ..RuleSets::default()
        });
        assert!(matches!(s.validate(), Err(SpecError::DuplicateRule(id)) if id == "r1"));
    }

    #[test]
    fn validate_rejects_self_mapping() {
        let mut mappings = MappingTables::default();
        mappings.routing.insert("Link".to_string(), "Link".to_string());
        let s = spec().with_mappings(mappings);
        assert!(matches!(s.validate(), Err(SpecError::SelfMapping(_))));
    }

    #[test]
    fn specification_deserializes_with_defaults() {
        let json = r#"{
            "source": {"language": "javascript", "framework": "react", "version": "18", "routing": "client-side"},
            "target": {"language": "typescript", "framework": "next", "version": "14",
                       "routing": "app-directory", "layout": "app-router"}
        }"#;
        let s: MigrationSpecification = serde_json::from_str(json).unwrap();
        assert!(s.mappings.is_empty());
        assert_eq!(s.target.naming, NamingConvention::KebabCase);
        assert_eq!(s.source.layout(), LayoutConvention::SpaRouter);
        assert!(s.validate().is_ok());
    }
}
