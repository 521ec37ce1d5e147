//! Deterministic syntax-tree rewriting
//!
//! Parses JS/JSX/TS/TSX with tree-sitter and applies rewrites driven by the
//! specification's mapping tables:
//! - module specifier renames in `import`, `export ... from`, `import()` and `require()`
//! - identifier renames (routing APIs, components)
//! - lifecycle methods annotated with their effect mapping
//! - `'use client'` directive for nested-routing targets when the file uses client hooks
//!
//! A source that does not parse is a hard error. Everything else that goes
//! wrong is reported as an error string and lowers the file's confidence.

use crate::error::TransformError;
use crate::stage::{StageContext, StageOutput, StageSignals, TransformStage};
use async_trait::async_trait;
use mig_core::{LayoutConvention, MigrationSpecification};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tree_sitter::{Language as Grammar, Node, Parser, Tree};

static CLIENT_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\buse(State|Effect|LayoutEffect|Reducer|Context|Ref|Router|Pathname|SearchParams|Params)\s*\(|\son[A-Z]\w*=\{",
    )
    .expect("client hook pattern is valid")
});

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid"));

const KNOWN_LIFECYCLE: &[&str] = &[
    "componentDidMount",
    "componentDidUpdate",
    "componentWillUnmount",
    "shouldComponentUpdate",
    "getSnapshotBeforeUpdate",
    "componentDidCatch",
    "componentWillMount",
    "componentWillReceiveProps",
    "componentWillUpdate",
    "UNSAFE_componentWillMount",
    "UNSAFE_componentWillReceiveProps",
    "UNSAFE_componentWillUpdate",
];

const CLIENT_DIRECTIVE: &str = "'use client';\n\n";

/// Output of the deterministic pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOutput {
    /// Rewritten code
    pub code: String,
    /// Non-fatal problems
    pub errors: Vec<String>,
    /// Packages introduced by renamed imports
    pub dependencies_added: Vec<String>,
    /// Packages no longer imported
    pub dependencies_removed: Vec<String>,
    /// Applied rewrites
    pub notes: Vec<String>,
}

/// Deterministic rewrite engine
pub trait RuleEngine: Send + Sync {
    /// Rewrite `code` according to `spec`
    ///
    /// # Errors
    /// `TransformError::Parse` when the source does not parse,
    /// `TransformError::UnsupportedLanguage` for non-script paths
    fn transform_code(
        &self,
        code: &str,
        path: &str,
        spec: &MigrationSpecification,
    ) -> Result<RuleOutput, TransformError>;
}

fn grammar_for(path: &str) -> Option<Grammar> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "ts" | "mts" | "cts" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "tsx" | "jsx" | "js" | "mjs" | "cjs" => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        _ => None,
    }
}

fn parse(grammar: &Grammar, code: &str) -> Result<Tree, TransformError> {
    let mut parser = Parser::new();
    parser
        .set_language(grammar)
        .map_err(|e| TransformError::Stage {
            stage: "rule",
            message: format!("grammar rejected: {e}"),
        })?;
    parser.parse(code, None).ok_or(TransformError::Stage {
        stage: "rule",
        message: "parser returned no tree".to_string(),
    })
}

fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    None
}

/// Package a module specifier belongs to; `None` for relative paths
fn package_name(specifier: &str) -> Option<String> {
    if specifier.starts_with('.') || specifier.starts_with('/') || specifier.is_empty() {
        return None;
    }
    let mut parts = specifier.split('/');
    let first = parts.next()?;
    if first.starts_with('@') {
        parts.next().map(|second| format!("{first}/{second}"))
    } else {
        Some(first.to_string())
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

struct Rewriter<'s> {
    src: &'s str,
    spec: &'s MigrationSpecification,
    edits: Vec<Edit>,
    output: RuleOutput,
    reported: HashSet<String>,
}

impl<'s> Rewriter<'s> {
    fn new(src: &'s str, spec: &'s MigrationSpecification) -> Self {
        Self {
            src,
            spec,
            edits: Vec::new(),
            output: RuleOutput::default(),
            reported: HashSet::new(),
        }
    }

    fn text(&self, node: Node<'_>) -> &'s str {
        &self.src[node.start_byte()..node.end_byte()]
    }

    fn note_once(&mut self, key: String, note: String) {
        if self.reported.insert(key) {
            self.output.notes.push(note);
        }
    }

    fn error_once(&mut self, key: String, error: String) {
        if self.reported.insert(key) {
            self.output.errors.push(error);
        }
    }

    /// Pre-order walk in source order
    fn visit(&mut self, root: Node<'_>) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "import_statement" | "export_statement" => {
                    if let Some(source) = node.child_by_field_name("source") {
                        self.rename_module(source);
                    }
                }
                "call_expression" => self.visit_call(node),
                "identifier" => self.rename_identifier(node),
                "method_definition" => self.annotate_lifecycle(node),
                _ => {}
            }

            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }

    fn visit_call(&mut self, node: Node<'_>) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let is_loader = function.kind() == "import"
            || (function.kind() == "identifier" && self.text(function) == "require");
        if !is_loader {
            return;
        }
        if let Some(arg) = node
            .child_by_field_name("arguments")
            .and_then(|args| args.named_child(0))
            .filter(|arg| arg.kind() == "string")
        {
            self.rename_module(arg);
        }
    }

    fn rename_module(&mut self, string: Node<'_>) {
        let (start, end) = (string.start_byte() + 1, string.end_byte().saturating_sub(1));
        if end <= start {
            return;
        }
        let src = self.src;
        let specifier = &src[start..end];
        let Some(target) = self.spec.mappings.module_rename(specifier) else {
            return;
        };
        let target = target.to_string();

        if let Some(pkg) = package_name(specifier) {
            push_unique(&mut self.output.dependencies_removed, pkg);
        }
        if let Some(pkg) = package_name(&target) {
            push_unique(&mut self.output.dependencies_added, pkg);
        }
        self.note_once(
            format!("module:{specifier}"),
            format!("import '{specifier}' -> '{target}'"),
        );
        self.edits.push(Edit { start, end, text: target });
    }

    fn rename_identifier(&mut self, node: Node<'_>) {
        let name = self.text(node);
        let Some(target) = self.spec.mappings.identifier_rename(name) else {
            return;
        };
        if !IDENTIFIER.is_match(target) {
            self.error_once(
                format!("bad-ident:{name}"),
                format!("mapping for '{name}' is not an identifier: '{target}'"),
            );
            return;
        }
        let target = target.to_string();
        self.note_once(format!("ident:{name}"), format!("renamed {name} -> {target}"));
        self.edits.push(Edit {
            start: node.start_byte(),
            end: node.end_byte(),
            text: target,
        });
    }

    fn annotate_lifecycle(&mut self, node: Node<'_>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        match self.spec.mappings.lifecycle.get(name) {
            Some(effect) => {
                let src = self.src;
                let start = node.start_byte();
                let line_start = src[..start].rfind('\n').map_or(0, |i| i + 1);
                let indent = &src[line_start..start];
                let indent = if indent.trim().is_empty() { indent } else { "" };
                self.output
                    .notes
                    .push(format!("lifecycle {name} -> {effect}"));
                self.edits.push(Edit {
                    start,
                    end: start,
                    text: format!("// migrate: {name} -> {effect}\n{indent}"),
                });
            }
            None if KNOWN_LIFECYCLE.contains(&name) => {
                self.error_once(
                    format!("lifecycle:{name}"),
                    format!("no mapping for lifecycle method '{name}'"),
                );
            }
            None => {}
        }
    }

    fn has_client_directive(&self, root: Node<'_>) -> bool {
        let mut cursor = root.walk();
        let first = root
            .named_children(&mut cursor)
            .find(|n| n.kind() != "comment");
        first.is_some_and(|n| {
            n.kind() == "expression_statement" && {
                let text = self.text(n).trim_start();
                text.starts_with("'use client'") || text.starts_with("\"use client\"")
            }
        })
    }

    fn finish(mut self) -> RuleOutput {
        self.edits.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));
        let mut code = self.src.to_string();
        let mut floor = usize::MAX;
        for edit in self.edits {
            if edit.end > floor {
                continue;
            }
            code.replace_range(edit.start..edit.end, &edit.text);
            floor = edit.start;
        }
        self.output.code = code;
        self.output
    }
}

/// tree-sitter backed [`RuleEngine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterRuleEngine;

impl TreeSitterRuleEngine {
    /// Create engine
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl RuleEngine for TreeSitterRuleEngine {
    fn transform_code(
        &self,
        code: &str,
        path: &str,
        spec: &MigrationSpecification,
    ) -> Result<RuleOutput, TransformError> {
        let grammar =
            grammar_for(path).ok_or_else(|| TransformError::UnsupportedLanguage(path.to_string()))?;
        let tree = parse(&grammar, code)?;
        let root = tree.root_node();

        if let Some(bad) = first_error(root) {
            let pos = bad.start_position();
            let what = if bad.is_missing() {
                format!("missing {}", bad.kind())
            } else {
                "unexpected syntax".to_string()
            };
            return Err(TransformError::Parse {
                path: path.to_string(),
                message: format!("{what} at {}:{}", pos.row + 1, pos.column + 1),
            });
        }

        let mut rewriter = Rewriter::new(code, spec);
        rewriter.visit(root);

        let wants_directive = spec.target.client_directive
            && spec.target.layout == LayoutConvention::AppRouter
            && CLIENT_ONLY.is_match(code)
            && !rewriter.has_client_directive(root);
        if wants_directive {
            rewriter.output.notes.push("added 'use client' directive".to_string());
            rewriter.edits.push(Edit {
                start: 0,
                end: 0,
                text: CLIENT_DIRECTIVE.to_string(),
            });
        }

        let mut output = rewriter.finish();

        if output.code != code {
            let reparsed = parse(&grammar, &output.code)?;
            if reparsed.root_node().has_error() {
                tracing::warn!(path, "rewritten source no longer parses, keeping original");
                output.code = code.to_string();
                output.dependencies_added.clear();
                output.dependencies_removed.clear();
                output
                    .errors
                    .push("rewritten output no longer parses; rewrites discarded".to_string());
            }
        }
        Ok(output)
    }
}

/// Deterministic stage wrapping a [`RuleEngine`]
#[derive(Clone)]
pub struct RuleStage {
    engine: Arc<dyn RuleEngine>,
}

impl std::fmt::Debug for RuleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStage").finish_non_exhaustive()
    }
}

impl Default for RuleStage {
    fn default() -> Self {
        Self::new(Arc::new(TreeSitterRuleEngine))
    }
}

impl RuleStage {
    /// Stage over a custom engine
    #[must_use]
    pub fn new(engine: Arc<dyn RuleEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TransformStage for RuleStage {
    fn name(&self) -> &'static str {
        "rule"
    }

    async fn apply(
        &self,
        code: &str,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, TransformError> {
        let out = self.engine.transform_code(code, &ctx.file.path, ctx.spec)?;
        tracing::debug!(
            path = %ctx.file.path,
            rewrites = out.notes.len(),
            errors = out.errors.len(),
            "rule stage finished"
        );
        Ok(StageOutput {
            code: out.code,
            signals: StageSignals {
                errors: out.errors,
                notes: out.notes,
                dependencies_added: out.dependencies_added,
                dependencies_removed: out.dependencies_removed,
                ..StageSignals::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mig_core::{
        ExportStyle, Language, MappingTables, NamingConvention, RoutingModel, SourceConfig,
        TargetConfig,
    };
    use pretty_assertions::assert_eq;

    fn spec(client_directive: bool) -> MigrationSpecification {
        let mut mappings = MappingTables::default();
        mappings
            .imports
            .insert("react-router-dom".into(), "next/navigation".into());
        mappings.routing.insert("useHistory".into(), "useRouter".into());
        mappings.components.insert("Helmet".into(), "Head".into());
        mappings.components.insert("Switch".into(), "next/link".into());
        mappings
            .lifecycle
            .insert("componentDidMount".into(), "useEffect(fn, [])".into());
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
                client_directive,
            },
        )
        .with_mappings(mappings)
    }

    fn run(code: &str, path: &str, client: bool) -> Result<RuleOutput, TransformError> {
        TreeSitterRuleEngine.transform_code(code, path, &spec(client))
    }

    #[test]
    fn renames_imports_and_hooks() {
        let code = "import { useHistory } from 'react-router-dom';\n\nexport default function Nav() {\n  const history = useHistory();\n  return <a onClick={() => history.push('/')}>Home</a>;\n}\n";
        let out = run(code, "src/Nav.jsx", false).unwrap();
        assert_eq!(
            out.code,
            "import { useRouter } from 'next/navigation';\n\nexport default function Nav() {\n  const history = useRouter();\n  return <a onClick={() => history.push('/')}>Home</a>;\n}\n"
        );
        assert_eq!(out.dependencies_added, vec!["next".to_string()]);
        assert_eq!(out.dependencies_removed, vec!["react-router-dom".to_string()]);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn deeply_nested_code_is_walked_without_recursion() {
        let depth = 20_000;
        let code = format!(
            "import {{ useHistory }} from 'react-router-dom';\nconst nested = {}useHistory{};\n",
            "[".repeat(depth),
            "]".repeat(depth)
        );
        let out = run(&code, "src/deep.js", false).unwrap();
        assert!(out.code.starts_with("import { useRouter } from 'next/navigation';"));
        assert!(out.code.contains("[useRouter]"));
    }

    #[test]
    fn adds_client_directive_once() {
        let code = "import { useState } from 'react';\nexport function C() { const [a] = useState(0); return <p>{a}</p>; }\n";
        let out = run(code, "src/C.tsx", true).unwrap();
        assert!(out.code.starts_with("'use client';\n\nimport"));

        let again = run(&out.code, "src/C.tsx", true).unwrap();
        assert_eq!(again.code, out.code);
    }

    #[test]
    fn server_files_get_no_directive() {
        let code = "export default async function Page() { return <main>hi</main>; }\n";
        let out = run(code, "app/page.tsx", true).unwrap();
        assert_eq!(out.code, code);
    }

    #[test]
    fn lifecycle_annotation_and_unmapped_error() {
        let code = "class A extends React.Component {\n  componentDidMount() {}\n  componentWillUnmount() {}\n  render() { return <div />; }\n}\n";
        let out = run(code, "src/A.jsx", false).unwrap();
        assert!(out
            .code
            .contains("  // migrate: componentDidMount -> useEffect(fn, [])\n  componentDidMount() {}"));
        assert_eq!(
            out.errors,
            vec!["no mapping for lifecycle method 'componentWillUnmount'".to_string()]
        );
    }

    #[test]
    fn non_identifier_mapping_is_reported() {
        let code = "const s = <Switch><Helmet /></Switch>;\n";
        let out = run(code, "src/s.jsx", false).unwrap();
        assert!(out.code.contains("<Head />"));
        assert!(out.code.contains("<Switch>"));
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("'Switch'"));
    }

    #[test]
    fn require_and_dynamic_import() {
        let code = "const r = require('react-router-dom');\nconst l = import('react-router-dom');\n";
        let out = run(code, "src/x.js", false).unwrap();
        assert_eq!(out.code.matches("'next/navigation'").count(), 2);
    }

    #[test]
    fn parse_error_is_fatal() {
        let err = run("function (", "src/bad.js", false).unwrap_err();
        assert!(matches!(err, TransformError::Parse { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn unsupported_extension() {
        let err = run("body {}", "src/a.css", false).unwrap_err();
        assert_eq!(err, TransformError::UnsupportedLanguage("src/a.css".into()));
    }

    #[test]
    fn typescript_grammar_for_ts() {
        let code = "const x = <number>y;\nexport { x };\n";
        assert!(run(code, "src/cast.ts", false).is_ok());
    }

    #[test]
    fn scoped_package_names() {
        assert_eq!(package_name("@tanstack/react-query/devtools").as_deref(), Some("@tanstack/react-query"));
        assert_eq!(package_name("next/link").as_deref(), Some("next"));
        assert_eq!(package_name("./local"), None);
    }
}
