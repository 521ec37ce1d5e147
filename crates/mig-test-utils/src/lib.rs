//! Testing utilities for the MIG workspace
//!
//! Shared fixtures and scripted fakes for the engine and orchestrator.

#![allow(missing_docs)]

use async_trait::async_trait;
use mig_core::{
    ExportStyle, Language, LayoutConvention, MappingTables, MigrationSpecification,
    NamingConvention, RepositoryFile, RoutingModel, Rule, RuleSets, SourceConfig, TargetConfig,
};
use mig_orchestrator::{FetchError, FetchProgress, FetchProgressFn, RepositoryFetcher, RepositoryRef};
use mig_transform::{SemanticContext, SemanticEngine, SemanticOutcome, TransformError};
use parking_lot::Mutex;
use std::time::Duration;

/// React pages-router app -> Next.js app router, with a couple of mappings and rules
pub fn sample_spec() -> MigrationSpecification {
    let mut mappings = MappingTables::default();
    mappings
        .imports
        .insert("react-router-dom".into(), "next/navigation".into());
    mappings.routing.insert("useHistory".into(), "useRouter".into());

    let rules = RuleSets {
        must_remove: vec![Rule::new(
            "no-router-dom",
            "react-router-dom imports",
            r"from\s+['\x22]react-router-dom['\x22]",
        )],
        ..RuleSets::default()
    };

    MigrationSpecification::new(
        SourceConfig {
            language: Language::JavaScript,
            framework: "react".into(),
            version: "18.2.0".into(),
            routing: RoutingModel::PagesDirectory,
            patterns: vec!["react-router".into()],
        },
        TargetConfig {
            language: Language::JavaScript,
            framework: "next".into(),
            version: "14.0.0".into(),
            routing: RoutingModel::AppDirectory,
            layout: LayoutConvention::AppRouter,
            naming: NamingConvention::KebabCase,
            exports: ExportStyle::Default,
            client_directive: true,
        },
    )
    .with_mappings(mappings)
    .with_rules(rules)
}

/// A small pages-router repository
pub fn sample_files() -> Vec<RepositoryFile> {
    vec![
        RepositoryFile::new(
            "pages/index.jsx",
            "import { useHistory } from 'react-router-dom';\n\nexport default function Home() {\n  const history = useHistory();\n  return <main>Home</main>;\n}\n",
        ),
        RepositoryFile::new(
            "pages/blog/[slug].jsx",
            "export default function Post() {\n  return <article />;\n}\n",
        ),
        RepositoryFile::new(
            "components/Nav.jsx",
            "export default function Nav() {\n  return <nav />;\n}\n",
        ),
        RepositoryFile::new("styles/globals.css", "body { margin: 0; }\n"),
    ]
}

/// Semantic engine returning `code` unchanged at a fixed confidence
#[derive(Default)]
pub struct ScriptedSemanticEngine {
    confidence: u8,
    delay: Duration,
}

impl ScriptedSemanticEngine {
    pub fn new(confidence: u8) -> Self {
        Self {
            confidence,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl SemanticEngine for ScriptedSemanticEngine {
    async fn transform_component(
        &self,
        code: &str,
        _ctx: &SemanticContext<'_>,
    ) -> Result<SemanticOutcome, TransformError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(SemanticOutcome {
            code: code.to_string(),
            confidence: self.confidence,
            reasoning: "scripted".into(),
            warnings: vec![],
            requires_review: false,
        })
    }
}

/// Fetcher serving a fixed file list, or a fixed error
#[derive(Default)]
pub struct InMemoryFetcher {
    files: Vec<RepositoryFile>,
    error: Option<FetchError>,
    delay: Duration,
    seen: Mutex<Vec<RepositoryRef>>,
}

impl InMemoryFetcher {
    pub fn new(files: Vec<RepositoryFile>) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Repositories requested so far
    pub fn requested(&self) -> Vec<RepositoryRef> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl RepositoryFetcher for InMemoryFetcher {
    async fn fetch_all_source_files(
        &self,
        repository: &RepositoryRef,
        on_progress: FetchProgressFn<'_>,
    ) -> Result<Vec<RepositoryFile>, FetchError> {
        self.seen.lock().push(repository.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let total = self.files.len();
        for (idx, file) in self.files.iter().enumerate() {
            on_progress(FetchProgress {
                fetched: idx + 1,
                total,
                current: Some(file.path.clone()),
            });
        }
        Ok(self.files.clone())
    }
}
