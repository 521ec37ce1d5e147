//! File layout vocabulary
//!
//! Shared between the structure planner (which produces
//! [`FileStructureChange`] records) and the transformation engine (which
//! attaches them to per-file results).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory convention of a framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutConvention {
    /// Client-side router; pages under `src/pages`, components under `src/components`
    SpaRouter,
    /// `pages/` directory file routing (`pages/blog/[slug].tsx`)
    PagesRouter,
    /// `app/` directory nested routing (`app/blog/[slug]/page.tsx`)
    AppRouter,
}

impl LayoutConvention {
    /// Root directory for shared components
    #[inline]
    #[must_use]
    pub fn component_root(&self) -> &'static str {
        match self {
            LayoutConvention::SpaRouter => "src/components",
            LayoutConvention::PagesRouter | LayoutConvention::AppRouter => "components",
        }
    }

    /// Root directory for stylesheets
    #[inline]
    #[must_use]
    pub fn style_root(&self) -> &'static str {
        match self {
            LayoutConvention::SpaRouter => "src/styles",
            LayoutConvention::PagesRouter => "styles",
            LayoutConvention::AppRouter => "app",
        }
    }
}

impl fmt::Display for LayoutConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutConvention::SpaRouter => write!(f, "spa-router"),
            LayoutConvention::PagesRouter => write!(f, "pages-router"),
            LayoutConvention::AppRouter => write!(f, "app-router"),
        }
    }
}

/// Role of a file in the target layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Routable page
    Page,
    /// Layout wrapping pages
    Layout,
    /// Loading placeholder
    Loading,
    /// Error boundary
    Error,
    /// API route handler
    Api,
    /// Shared component
    Component,
    /// Stylesheet
    Style,
    /// Tooling or framework configuration
    Config,
    /// Anything else
    Other,
}

impl FileType {
    /// Whether this file participates in routing
    #[inline]
    #[must_use]
    pub fn is_route(&self) -> bool {
        matches!(
            self,
            FileType::Page | FileType::Layout | FileType::Loading | FileType::Error | FileType::Api
        )
    }
}

/// Kind of structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureAction {
    /// Relocated to another directory
    Move,
    /// Newly synthesized file
    Create,
    /// No longer needed
    Delete,
    /// Renamed within the same directory
    Rename,
}

/// Routing metadata of a structural change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureMetadata {
    /// Whether the file is part of the route tree
    pub is_route_file: bool,
    /// URL path this file serves (e.g. `/blog/[slug]`)
    pub route_segment: Option<String>,
    /// Page needs an enclosing layout
    pub requires_layout: bool,
    /// Page should get a loading placeholder
    pub requires_loading: bool,
    /// Page should get an error boundary
    pub requires_error: bool,
}

/// A planned file relocation, creation or deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStructureChange {
    /// Path before migration (empty for creations)
    pub original_path: String,
    /// Path after migration (empty for deletions)
    pub new_path: String,
    /// Change kind
    pub action: StructureAction,
    /// File role
    pub file_type: FileType,
    /// Routing metadata
    pub metadata: StructureMetadata,
}

impl FileStructureChange {
    /// True when this change removes the file
    #[inline]
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.new_path.is_empty()
    }

    /// Path the change is "about": new path, or original path for deletions
    #[inline]
    #[must_use]
    pub fn effective_path(&self) -> &str {
        if self.is_deletion() {
            &self.original_path
        } else {
            &self.new_path
        }
    }

    /// Directory depth of the effective path
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.effective_path().matches('/').count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletion_uses_original_path() {
        let change = FileStructureChange {
            original_path: "pages/_document.tsx".to_string(),
            new_path: String::new(),
            action: StructureAction::Delete,
            file_type: FileType::Other,
            metadata: StructureMetadata::default(),
        };
        assert!(change.is_deletion());
        assert_eq!(change.effective_path(), "pages/_document.tsx");
        assert_eq!(change.depth(), 1);
    }

    #[test]
    fn route_file_types() {
        assert!(FileType::Page.is_route());
        assert!(FileType::Api.is_route());
        assert!(!FileType::Component.is_route());
        assert!(!FileType::Style.is_route());
    }

    #[test]
    fn convention_display() {
        assert_eq!(LayoutConvention::AppRouter.to_string(), "app-router");
        assert_eq!(LayoutConvention::SpaRouter.component_root(), "src/components");
    }
}
