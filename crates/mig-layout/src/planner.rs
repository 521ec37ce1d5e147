//! Structure planning
//!
//! Turns a source tree into the list of moves, creations and deletions
//! needed to satisfy the target layout convention. Content transforms are
//! not involved; the planner only looks at paths plus a few content signals.

use crate::classify::{classify, ContentSignals};
use crate::error::LayoutError;
use crate::route::{parse_route, render_route, RenderExt, RouteFile, RouteRole};
use mig_core::{
    FileStructureChange, FileType, Language, LayoutConvention, MigrationSpecification,
    NamingConvention, RepositoryFile, StructureAction, StructureMetadata,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Files made obsolete when leaving a client-side SPA for file routing
static SPA_OBSOLETE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(index\.html|public/index\.html|vite\.config\.(js|ts|mjs)|src/(main|index)\.(js|jsx|ts|tsx)|src/vite-env\.d\.ts|src/reportWebVitals\.(js|ts)|src/setupProxy\.js)$",
    )
    .expect("spa obsolete pattern is valid")
});

/// Files made obsolete when leaving file routing for a client-side SPA
static FILE_ROUTING_OBSOLETE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(next\.config\.(js|mjs|ts)|next-env\.d\.ts|middleware\.(js|ts))$")
        .expect("file routing obsolete pattern is valid")
});

/// Scaffolding file required by a target convention
#[derive(Debug, Clone, Copy)]
struct Scaffold {
    /// Path without extension for scripts, full path for stylesheets
    stem: &'static str,
    file_type: FileType,
    is_script: bool,
}

const APP_SCAFFOLD: &[Scaffold] = &[
    Scaffold { stem: "app/layout", file_type: FileType::Layout, is_script: true },
    Scaffold { stem: "app/error", file_type: FileType::Error, is_script: true },
    Scaffold { stem: "app/not-found", file_type: FileType::Page, is_script: true },
    Scaffold { stem: "app/globals.css", file_type: FileType::Style, is_script: false },
];

const PAGES_SCAFFOLD: &[Scaffold] = &[
    Scaffold { stem: "pages/_app", file_type: FileType::Layout, is_script: true },
    Scaffold { stem: "styles/globals.css", file_type: FileType::Style, is_script: false },
];

fn scaffold_for(convention: LayoutConvention) -> &'static [Scaffold] {
    match convention {
        LayoutConvention::AppRouter => APP_SCAFFOLD,
        LayoutConvention::PagesRouter => PAGES_SCAFFOLD,
        LayoutConvention::SpaRouter => &[],
    }
}

fn global_stylesheet(convention: LayoutConvention) -> &'static str {
    match convention {
        LayoutConvention::SpaRouter => "src/index.css",
        LayoutConvention::PagesRouter => "styles/globals.css",
        LayoutConvention::AppRouter => "app/globals.css",
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn strip_script_ext(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((stem, ext)) if matches!(ext, "js" | "jsx" | "ts" | "tsx" | "mjs") => stem,
        _ => path,
    }
}

/// Plans file relocations for one source -> target transition
#[derive(Debug, Clone)]
pub struct StructurePlanner {
    source: LayoutConvention,
    target: LayoutConvention,
    source_language: Language,
    target_language: Language,
    naming: NamingConvention,
}

impl StructurePlanner {
    /// Create planner for a specification
    #[must_use]
    pub fn new(spec: &MigrationSpecification) -> Self {
        Self {
            source: spec.source.layout(),
            target: spec.target.layout,
            source_language: spec.source.language,
            target_language: spec.target.language,
            naming: spec.target.naming,
        }
    }

    /// Source convention
    #[inline]
    #[must_use]
    pub fn source(&self) -> LayoutConvention {
        self.source
    }

    /// Target convention
    #[inline]
    #[must_use]
    pub fn target(&self) -> LayoutConvention {
        self.target
    }

    /// Classify a file against the source convention
    #[inline]
    #[must_use]
    pub fn classify(&self, file: &RepositoryFile) -> FileType {
        classify(file, self.source)
    }

    fn render_ext(&self, source_ext: &str) -> RenderExt<'static> {
        match self.target_language {
            Language::TypeScript => RenderExt { component: "tsx", module: "ts" },
            Language::JavaScript => RenderExt {
                component: if source_ext == "js" { "js" } else { "jsx" },
                module: "js",
            },
        }
    }

    /// Re-spell a script extension for the target language
    fn convert_ext(&self, path: &str) -> String {
        if self.source_language == self.target_language
            || self.target_language != Language::TypeScript
        {
            return path.to_string();
        }
        match path.rsplit_once('.') {
            Some((stem, "jsx")) => format!("{stem}.tsx"),
            Some((stem, "js")) if !stem.ends_with(".config") => format!("{stem}.ts"),
            _ => path.to_string(),
        }
    }

    fn is_obsolete(&self, path: &str) -> bool {
        let leaving_spa = self.source == LayoutConvention::SpaRouter
            && self.target != LayoutConvention::SpaRouter;
        let entering_spa = self.source != LayoutConvention::SpaRouter
            && self.target == LayoutConvention::SpaRouter;
        (leaving_spa && SPA_OBSOLETE.is_match(path))
            || (entering_spa && FILE_ROUTING_OBSOLETE.is_match(path))
    }

    fn validate_path(path: &str) -> Result<(), LayoutError> {
        if path.is_empty() || path.starts_with('/') || path.contains('\\') {
            return Err(LayoutError::InvalidPath(path.to_string()));
        }
        if path.split('/').any(|seg| seg == ".." || seg == ".") {
            return Err(LayoutError::InvalidPath(path.to_string()));
        }
        Ok(())
    }

    fn change(
        original: &str,
        new_path: String,
        file_type: FileType,
        metadata: StructureMetadata,
    ) -> Option<FileStructureChange> {
        if new_path == original {
            return None;
        }
        let action = if parent_dir(original) == parent_dir(&new_path) {
            StructureAction::Rename
        } else {
            StructureAction::Move
        };
        Some(FileStructureChange {
            original_path: original.to_string(),
            new_path,
            action,
            file_type,
            metadata,
        })
    }

    fn route_metadata(&self, route: &RouteFile, content: &str) -> StructureMetadata {
        let signals = ContentSignals::scan(content);
        let is_page = route.role == RouteRole::Page;
        let nested_routing = self.target == LayoutConvention::AppRouter;
        StructureMetadata {
            is_route_file: route.role.file_type().is_route(),
            route_segment: Some(route.url()),
            requires_layout: is_page && signals.uses_layout,
            requires_loading: is_page && nested_routing && signals.fetches_data,
            requires_error: is_page && nested_routing && signals.handles_errors,
        }
    }

    /// Plan the change for a single file
    ///
    /// Returns `Ok(None)` when the file keeps its path.
    ///
    /// # Errors
    /// `LayoutError::InvalidPath` for absolute paths or paths escaping the root
    pub fn plan_file(
        &self,
        file: &RepositoryFile,
    ) -> Result<Option<FileStructureChange>, LayoutError> {
        Self::validate_path(&file.path)?;
        let path = file.path.as_str();

        if self.is_obsolete(path) {
            return Ok(Some(FileStructureChange {
                original_path: path.to_string(),
                new_path: String::new(),
                action: StructureAction::Delete,
                file_type: self.classify(file),
                metadata: StructureMetadata::default(),
            }));
        }

        if let Some(route) = parse_route(self.source, path) {
            let source_ext = path.rsplit_once('.').map_or("js", |(_, ext)| ext);
            let ext = self.render_ext(source_ext);
            let file_type = route.role.file_type();
            return Ok(match render_route(self.target, &route, ext, self.naming) {
                Some(new_path) => {
                    let metadata = self.route_metadata(&route, &file.content);
                    Self::change(path, new_path, file_type, metadata)
                }
                None if route.role.is_disposable() => Some(FileStructureChange {
                    original_path: path.to_string(),
                    new_path: String::new(),
                    action: StructureAction::Delete,
                    file_type,
                    metadata: StructureMetadata {
                        route_segment: Some(route.url()),
                        ..StructureMetadata::default()
                    },
                }),
                None => {
                    // No slot in the target route tree: park it next to the components
                    let new_path = format!(
                        "{}/routes/{}.{}",
                        self.target.component_root(),
                        route.flat_name(),
                        ext.component
                    );
                    Self::change(path, new_path, FileType::Component, StructureMetadata::default())
                }
            });
        }

        let file_type = self.classify(file);
        let new_path = match file_type {
            FileType::Component => {
                let relocated = relocate(path, self.source.component_root(), self.target.component_root());
                self.convert_ext(&relocated)
            }
            FileType::Style => {
                if path == global_stylesheet(self.source) {
                    global_stylesheet(self.target).to_string()
                } else {
                    relocate(path, self.source.style_root(), self.target.style_root())
                }
            }
            FileType::Other => self.convert_ext(path),
            _ => path.to_string(),
        };
        Ok(Self::change(path, new_path, file_type, StructureMetadata::default()))
    }

    /// Plan changes for a whole tree, synthesize scaffolding and sort
    ///
    /// A move never lands on a path that exists in `files` or that an
    /// earlier move already claimed; such files keep their original path.
    #[must_use]
    pub fn plan(&self, files: &[RepositoryFile]) -> Vec<FileStructureChange> {
        let mut changes = Vec::new();
        let mut taken: HashSet<String> = files.iter().map(|f| f.path.clone()).collect();
        // Paths present once the plan is applied
        let mut occupied: HashSet<String> = HashSet::new();

        for file in files {
            match self.plan_file(file) {
                Ok(Some(change)) if change.is_deletion() => changes.push(change),
                Ok(Some(change)) => {
                    if taken.insert(change.new_path.clone()) {
                        occupied.insert(change.new_path.clone());
                        changes.push(change);
                    } else {
                        tracing::warn!(
                            path = %file.path,
                            target = %change.new_path,
                            "structure change collides with another file, keeping original path"
                        );
                        occupied.insert(file.path.clone());
                    }
                }
                Ok(None) => {
                    occupied.insert(file.path.clone());
                }
                Err(e) => {
                    tracing::warn!(path = %file.path, error = %e, "skipping file in structure plan");
                }
            }
        }

        changes.extend(self.scaffolding(&occupied));
        sort_changes(&mut changes);

        tracing::debug!(
            source = %self.source,
            target = %self.target,
            changes = changes.len(),
            "planned structure changes"
        );
        changes
    }

    /// Scaffolding entries missing from the planned tree
    fn scaffolding(&self, occupied: &HashSet<String>) -> Vec<FileStructureChange> {
        let ext = self.render_ext("jsx").component;
        let occupied_stems: HashSet<&str> = occupied.iter().map(|p| strip_script_ext(p)).collect();

        scaffold_for(self.target)
            .iter()
            .filter(|s| !occupied_stems.contains(s.stem))
            .map(|s| {
                let new_path = if s.is_script {
                    format!("{}.{}", s.stem, ext)
                } else {
                    s.stem.to_string()
                };
                let is_route_file = s.file_type.is_route();
                FileStructureChange {
                    original_path: String::new(),
                    new_path,
                    action: StructureAction::Create,
                    file_type: s.file_type,
                    metadata: StructureMetadata {
                        is_route_file,
                        route_segment: is_route_file.then(|| "/".to_string()),
                        ..StructureMetadata::default()
                    },
                }
            })
            .collect()
    }
}

fn relocate(path: &str, from_root: &str, to_root: &str) -> String {
    if from_root == to_root {
        return path.to_string();
    }
    match path.strip_prefix(from_root).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) => format!("{to_root}/{rest}"),
        None => path.to_string(),
    }
}

/// Sort changes into application order
///
/// Deletions go last. Among the rest, layouts come first, then creations
/// before moves, then shallower paths before deeper ones.
pub fn sort_changes(changes: &mut [FileStructureChange]) {
    changes.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
}

fn sort_key(change: &FileStructureChange) -> (bool, bool, u8, usize, String) {
    let action_rank = match change.action {
        StructureAction::Create => 0,
        StructureAction::Move | StructureAction::Rename => 1,
        StructureAction::Delete => 2,
    };
    (
        change.is_deletion(),
        change.file_type != FileType::Layout,
        action_rank,
        change.depth(),
        change.effective_path().to_string(),
    )
}

/// Plan structure changes for `files` under `spec`
#[must_use]
pub fn plan_structure_changes(
    files: &[RepositoryFile],
    spec: &MigrationSpecification,
) -> Vec<FileStructureChange> {
    StructurePlanner::new(spec).plan(files)
}
