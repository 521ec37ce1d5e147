//! File classification from path and content

use crate::route::parse_route;
use mig_core::{FileType, LayoutConvention, RepositoryFile};
use once_cell::sync::Lazy;
use regex::Regex;

static CONFIG_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(package\.json|tsconfig(\.[\w-]+)?\.json|jsconfig\.json|\.eslintrc(\.\w+)?|\.babelrc|babel\.config\.\w+|(next|vite|webpack|tailwind|postcss|jest|vitest|rollup)\.config\.\w+|next-env\.d\.ts|\.env(\.[\w-]+)?)$",
    )
    .expect("config file pattern is valid")
});

static JSX_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Za-z][\w.]*[\s/>]").expect("jsx pattern is valid"));

static DATA_FETCHING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(getServerSideProps|getStaticProps|getInitialProps|useQuery|useSWR|fetch\s*\(|axios\.)")
        .expect("data fetching pattern is valid")
});

static ERROR_HANDLING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(throw\s|catch\s*\(|ErrorBoundary|notFound\s*\()").expect("error pattern is valid")
});

static LAYOUT_USAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(\w*Layout)[\s>]").expect("layout pattern is valid"));

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_style_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    [".css", ".scss", ".sass", ".less", ".styl"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

fn is_pascal_case(stem: &str) -> bool {
    stem.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && stem.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Classify a file relative to the source convention
#[must_use]
pub fn classify(file: &RepositoryFile, convention: LayoutConvention) -> FileType {
    if let Some(route) = parse_route(convention, &file.path) {
        return route.role.file_type();
    }

    let name = file_name(&file.path);
    if is_style_path(&file.path) {
        return FileType::Style;
    }
    if CONFIG_FILE.is_match(name) {
        return FileType::Config;
    }
    if !file.is_script() {
        return FileType::Other;
    }

    let in_component_dir = file.path.split('/').any(|d| d == "components");
    let stem = name.split('.').next().unwrap_or(name);
    if in_component_dir || (is_pascal_case(stem) && JSX_ELEMENT.is_match(&file.content)) {
        return FileType::Component;
    }
    FileType::Other
}

/// Content signals used for route metadata flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentSignals {
    /// File fetches data
    pub fetches_data: bool,
    /// File throws or handles errors
    pub handles_errors: bool,
    /// File wraps itself in a layout component
    pub uses_layout: bool,
}

impl ContentSignals {
    /// Scan file content
    #[must_use]
    pub fn scan(content: &str) -> Self {
        Self {
            fetches_data: DATA_FETCHING.is_match(content),
            handles_errors: ERROR_HANDLING.is_match(content),
            uses_layout: LAYOUT_USAGE.is_match(content),
        }
    }
}
