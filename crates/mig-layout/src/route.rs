//! Route files and their on-disk spelling per convention
//!
//! A [`RouteFile`] is the convention-independent meaning of a route-bearing
//! file: its URL segments plus the role it plays. Each
//! [`LayoutConvention`] can parse a path into a `RouteFile` and render a
//! `RouteFile` back into a path.
//!
//! ```text
//! pages/blog/[slug].tsx  --parse-->  RouteFile { [blog, [slug]], Page }  --render-->  app/blog/[slug]/page.tsx
//! ```

use mig_core::{FileType, LayoutConvention, NamingConvention};

/// One URL segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Literal segment (`blog`)
    Static(String),
    /// Single dynamic parameter (`[slug]`, `$slug`, `:slug`)
    Dynamic(String),
    /// Catch-all parameter (`[...slug]`, `$`)
    CatchAll(String),
    /// Optional catch-all (`[[...slug]]`)
    OptionalCatchAll(String),
    /// Route group that does not affect the URL (`(marketing)`)
    Group(String),
}

/// How dynamic segments are spelled on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentStyle {
    /// `[id]`, `[...rest]`, `(group)`
    Bracket { keep_groups: bool },
    /// `$id`, `$`
    Dollar,
}

impl Segment {
    /// Parse a raw directory or file-stem segment
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if let Some(inner) = raw.strip_prefix("[[...").and_then(|s| s.strip_suffix("]]")) {
            return Segment::OptionalCatchAll(inner.to_string());
        }
        if let Some(inner) = raw.strip_prefix("[...").and_then(|s| s.strip_suffix(']')) {
            return Segment::CatchAll(inner.to_string());
        }
        if let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return Segment::Dynamic(inner.to_string());
        }
        if let Some(inner) = raw.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            return Segment::Group(inner.to_string());
        }
        if raw == "$" {
            return Segment::CatchAll("splat".to_string());
        }
        if let Some(inner) = raw.strip_prefix('$').or_else(|| raw.strip_prefix(':')) {
            if !inner.is_empty() {
                return Segment::Dynamic(inner.to_string());
            }
        }
        Segment::Static(raw.to_string())
    }

    fn render(&self, style: SegmentStyle) -> Option<String> {
        match (self, style) {
            (Segment::Static(s), _) => Some(s.clone()),
            (Segment::Group(g), SegmentStyle::Bracket { keep_groups: true }) => {
                Some(format!("({g})"))
            }
            (Segment::Group(_), _) => None,
            (Segment::Dynamic(p), SegmentStyle::Bracket { .. }) => Some(format!("[{p}]")),
            (Segment::CatchAll(p), SegmentStyle::Bracket { .. }) => Some(format!("[...{p}]")),
            (Segment::OptionalCatchAll(p), SegmentStyle::Bracket { .. }) => {
                Some(format!("[[...{p}]]"))
            }
            (Segment::Dynamic(p), SegmentStyle::Dollar) => Some(format!("${p}")),
            (Segment::CatchAll(_) | Segment::OptionalCatchAll(_), SegmentStyle::Dollar) => {
                Some("$".to_string())
            }
        }
    }
}

/// Role a route file plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteRole {
    /// Routable page
    Page,
    /// Layout wrapping child routes
    Layout,
    /// Loading placeholder
    Loading,
    /// Error boundary
    Error,
    /// Not-found page
    NotFound,
    /// Whole-application error page
    GlobalError,
    /// Server route handler
    Api,
    /// HTML document shell (`_document`)
    Document,
}

impl RouteRole {
    /// File type reported for this role
    #[inline]
    #[must_use]
    pub fn file_type(&self) -> FileType {
        match self {
            RouteRole::Page | RouteRole::NotFound => FileType::Page,
            RouteRole::Layout => FileType::Layout,
            RouteRole::Loading => FileType::Loading,
            RouteRole::Error | RouteRole::GlobalError => FileType::Error,
            RouteRole::Api => FileType::Api,
            RouteRole::Document => FileType::Other,
        }
    }

    /// Roles that only carry framework plumbing and can be dropped when
    /// the target has no equivalent
    #[inline]
    #[must_use]
    pub fn is_disposable(&self) -> bool {
        matches!(
            self,
            RouteRole::Document | RouteRole::Loading | RouteRole::GlobalError
        )
    }

    fn slug(&self) -> &'static str {
        match self {
            RouteRole::Page => "page",
            RouteRole::Layout => "layout",
            RouteRole::Loading => "loading",
            RouteRole::Error => "error",
            RouteRole::NotFound => "not-found",
            RouteRole::GlobalError => "global-error",
            RouteRole::Api => "route",
            RouteRole::Document => "document",
        }
    }
}

/// Convention-independent meaning of a route file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteFile {
    /// URL segments from the route root
    pub segments: Vec<Segment>,
    /// Role
    pub role: RouteRole,
}

impl RouteFile {
    /// Create route file
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<Segment>, role: RouteRole) -> Self {
        Self { segments, role }
    }

    /// Whether the file sits at the route root (ignoring groups)
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Group(_)))
    }

    /// URL path in bracket notation, groups omitted (`/blog/[slug]`)
    #[must_use]
    pub fn url(&self) -> String {
        let parts = render_segments(&self.segments, SegmentStyle::Bracket { keep_groups: false });
        format!("/{}", parts.join("/"))
    }

    /// Flat name used when a route file is parked outside the route tree
    #[must_use]
    pub fn flat_name(&self) -> String {
        let mut parts: Vec<String> = self
            .segments
            .iter()
            .filter_map(|s| match s {
                Segment::Static(s) => Some(s.clone()),
                Segment::Dynamic(p) | Segment::CatchAll(p) | Segment::OptionalCatchAll(p) => {
                    Some(p.clone())
                }
                Segment::Group(_) => None,
            })
            .collect();
        if parts.is_empty() {
            parts.push("root".to_string());
        }
        parts.push(self.role.slug().to_string());
        parts.join("-")
    }
}

fn render_segments(segments: &[Segment], style: SegmentStyle) -> Vec<String> {
    segments.iter().filter_map(|s| s.render(style)).collect()
}

/// Split `a/b/c.tsx` into (`["a", "b"]`, `"c"`, `"tsx"`)
fn split_path(path: &str) -> Option<(Vec<&str>, &str, &str)> {
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let file = parts.pop()?;
    let (stem, ext) = file.rsplit_once('.')?;
    Some((parts, stem, ext))
}

fn is_script_ext(ext: &str) -> bool {
    matches!(ext, "js" | "jsx" | "ts" | "tsx" | "mjs")
}

fn strip_root<'a>(dirs: &'a [&'a str], root: &str) -> Option<&'a [&'a str]> {
    match dirs {
        [first, rest @ ..] if *first == root => Some(rest),
        ["src", second, rest @ ..] if *second == root => Some(rest),
        _ => None,
    }
}

/// Parse a repository path as a route file of `convention`
///
/// Returns `None` for files outside the route tree.
#[must_use]
pub fn parse_route(convention: LayoutConvention, path: &str) -> Option<RouteFile> {
    let (dirs, stem, ext) = split_path(path)?;
    if !is_script_ext(ext) {
        return None;
    }
    match convention {
        LayoutConvention::AppRouter => parse_app(&dirs, stem),
        LayoutConvention::PagesRouter => parse_pages(&dirs, stem),
        LayoutConvention::SpaRouter => parse_spa(&dirs, stem),
    }
}

fn parse_app(dirs: &[&str], stem: &str) -> Option<RouteFile> {
    let rest = strip_root(dirs, "app")?;
    let role = match stem {
        "page" => RouteRole::Page,
        "layout" | "template" => RouteRole::Layout,
        "loading" => RouteRole::Loading,
        "error" => RouteRole::Error,
        "not-found" => RouteRole::NotFound,
        "global-error" => RouteRole::GlobalError,
        "route" => RouteRole::Api,
        _ => return None,
    };
    let segments = rest.iter().map(|d| Segment::parse(d)).collect();
    Some(RouteFile::new(segments, role))
}

fn parse_pages(dirs: &[&str], stem: &str) -> Option<RouteFile> {
    let rest = strip_root(dirs, "pages")?;
    let mut segments: Vec<Segment> = rest.iter().map(|d| Segment::parse(d)).collect();

    if rest.is_empty() {
        let special = match stem {
            "_app" => Some(RouteRole::Layout),
            "_document" => Some(RouteRole::Document),
            "_error" => Some(RouteRole::Error),
            "404" => Some(RouteRole::NotFound),
            "500" => Some(RouteRole::GlobalError),
            _ => None,
        };
        if let Some(role) = special {
            return Some(RouteFile::new(Vec::new(), role));
        }
    }
    if stem.starts_with('_') {
        return None;
    }

    let role = if rest.first() == Some(&"api") {
        RouteRole::Api
    } else {
        RouteRole::Page
    };
    if stem != "index" {
        segments.push(Segment::parse(stem));
    }
    Some(RouteFile::new(segments, role))
}

fn parse_spa(dirs: &[&str], stem: &str) -> Option<RouteFile> {
    if dirs == ["src"] && stem == "App" {
        return Some(RouteFile::new(Vec::new(), RouteRole::Layout));
    }
    // SPA routes always live under `src/`
    if dirs.first() != Some(&"src") {
        return None;
    }
    let rest = strip_root(dirs, "pages").or_else(|| strip_root(dirs, "routes"))?;

    let mut segments: Vec<Segment> = rest.iter().map(|d| spa_segment(d)).collect();
    let lowered = stem.to_ascii_lowercase();
    let role = match lowered.as_str() {
        "notfound" | "not-found" | "404" => RouteRole::NotFound,
        "errorboundary" | "error" => RouteRole::Error,
        "loading" => RouteRole::Loading,
        "layout" => RouteRole::Layout,
        "home" | "index" => RouteRole::Page,
        _ => {
            segments.push(spa_segment(stem));
            RouteRole::Page
        }
    };
    Some(RouteFile::new(segments, role))
}

fn spa_segment(raw: &str) -> Segment {
    match Segment::parse(raw) {
        Segment::Static(s) => Segment::Static(to_kebab_case(&s)),
        other => other,
    }
}

/// Extensions to use when rendering a route file
#[derive(Debug, Clone, Copy)]
pub struct RenderExt<'a> {
    /// Extension for JSX-bearing modules
    pub component: &'a str,
    /// Extension for plain modules (route handlers)
    pub module: &'a str,
}

/// Render a route file as a path in `convention`
///
/// Returns `None` when the convention has no place for this role at this
/// position in the tree.
#[must_use]
pub fn render_route(
    convention: LayoutConvention,
    route: &RouteFile,
    ext: RenderExt<'_>,
    naming: NamingConvention,
) -> Option<String> {
    match convention {
        LayoutConvention::AppRouter => render_app(route, ext),
        LayoutConvention::PagesRouter => render_pages(route, ext),
        LayoutConvention::SpaRouter => render_spa(route, ext, naming),
    }
}

fn join_dir(root: &str, parts: &[String]) -> String {
    if parts.is_empty() {
        root.to_string()
    } else {
        format!("{}/{}", root, parts.join("/"))
    }
}

fn render_app(route: &RouteFile, ext: RenderExt<'_>) -> Option<String> {
    if route.role == RouteRole::Document {
        return None;
    }
    let dir = join_dir(
        "app",
        &render_segments(&route.segments, SegmentStyle::Bracket { keep_groups: true }),
    );
    let file_ext = if route.role == RouteRole::Api {
        ext.module
    } else {
        ext.component
    };
    Some(format!("{}/{}.{}", dir, route.role.slug(), file_ext))
}

fn render_pages(route: &RouteFile, ext: RenderExt<'_>) -> Option<String> {
    let parts = render_segments(&route.segments, SegmentStyle::Bracket { keep_groups: false });
    let root_only = |name: &str| -> Option<String> {
        route
            .is_root()
            .then(|| format!("pages/{}.{}", name, ext.component))
    };
    match route.role {
        RouteRole::Page => Some(if parts.is_empty() {
            format!("pages/index.{}", ext.component)
        } else {
            format!("pages/{}.{}", parts.join("/"), ext.component)
        }),
        RouteRole::Api => Some(if parts.len() <= 1 {
            format!("pages/api/index.{}", ext.module)
        } else {
            format!("pages/{}.{}", parts.join("/"), ext.module)
        }),
        RouteRole::Layout => root_only("_app"),
        RouteRole::Error => root_only("_error"),
        RouteRole::NotFound => root_only("404"),
        RouteRole::GlobalError => root_only("500"),
        RouteRole::Document => root_only("_document"),
        RouteRole::Loading => None,
    }
}

fn render_spa(route: &RouteFile, ext: RenderExt<'_>, naming: NamingConvention) -> Option<String> {
    let mut parts = render_segments(&route.segments, SegmentStyle::Dollar);
    match route.role {
        RouteRole::Page => {
            if let Some(last) = parts.pop() {
                let file = if last.starts_with('$') {
                    last
                } else {
                    apply_naming(&last, naming)
                };
                Some(format!("{}/{}.{}", join_dir("src/pages", &parts), file, ext.component))
            } else {
                Some(format!("src/pages/index.{}", ext.component))
            }
        }
        RouteRole::Layout if route.is_root() => Some(format!("src/App.{}", ext.component)),
        RouteRole::NotFound if route.is_root() => {
            Some(format!("src/pages/NotFound.{}", ext.component))
        }
        RouteRole::Error if route.is_root() => {
            Some(format!("src/pages/ErrorBoundary.{}", ext.component))
        }
        _ => None,
    }
}

/// `UserProfile` / `userProfile` / `user_profile` -> `user-profile`
#[must_use]
pub fn to_kebab_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == ' ' {
            if !out.ends_with('-') && !out.is_empty() {
                out.push('-');
            }
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
            if (prev.is_ascii_lowercase() || prev.is_ascii_digit())
                || (prev.is_ascii_uppercase() && next_lower)
            {
                if !out.ends_with('-') {
                    out.push('-');
                }
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Re-spell a kebab-case name in `naming`
#[must_use]
pub fn apply_naming(kebab: &str, naming: NamingConvention) -> String {
    match naming {
        NamingConvention::KebabCase => kebab.to_string(),
        NamingConvention::PascalCase | NamingConvention::CamelCase => {
            let mut out = String::with_capacity(kebab.len());
            for (i, word) in kebab.split('-').filter(|w| !w.is_empty()).enumerate() {
                let mut chars = word.chars();
                if let Some(first) = chars.next() {
                    if i == 0 && naming == NamingConvention::CamelCase {
                        out.push(first.to_ascii_lowercase());
                    } else {
                        out.push(first.to_ascii_uppercase());
                    }
                    out.push_str(chars.as_str());
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TSX: RenderExt<'static> = RenderExt {
        component: "tsx",
        module: "ts",
    };

    fn to_app(source: LayoutConvention, path: &str) -> Option<String> {
        parse_route(source, path)
            .and_then(|r| render_route(LayoutConvention::AppRouter, &r, TSX, NamingConvention::KebabCase))
    }

    #[test]
    fn segment_parse_variants() {
        assert_eq!(Segment::parse("blog"), Segment::Static("blog".into()));
        assert_eq!(Segment::parse("[slug]"), Segment::Dynamic("slug".into()));
        assert_eq!(Segment::parse("[...all]"), Segment::CatchAll("all".into()));
        assert_eq!(Segment::parse("[[...opt]]"), Segment::OptionalCatchAll("opt".into()));
        assert_eq!(Segment::parse("(shop)"), Segment::Group("shop".into()));
        assert_eq!(Segment::parse("$id"), Segment::Dynamic("id".into()));
        assert_eq!(Segment::parse(":id"), Segment::Dynamic("id".into()));
        assert_eq!(Segment::parse("$"), Segment::CatchAll("splat".into()));
    }

    #[test]
    fn pages_to_app_routes() {
        let p = LayoutConvention::PagesRouter;
        assert_eq!(to_app(p, "pages/index.tsx").as_deref(), Some("app/page.tsx"));
        assert_eq!(to_app(p, "pages/about.tsx").as_deref(), Some("app/about/page.tsx"));
        assert_eq!(
            to_app(p, "pages/blog/[slug].tsx").as_deref(),
            Some("app/blog/[slug]/page.tsx")
        );
        assert_eq!(
            to_app(p, "pages/docs/[...path].tsx").as_deref(),
            Some("app/docs/[...path]/page.tsx")
        );
        assert_eq!(to_app(p, "pages/blog/index.tsx").as_deref(), Some("app/blog/page.tsx"));
        assert_eq!(to_app(p, "pages/_app.tsx").as_deref(), Some("app/layout.tsx"));
        assert_eq!(to_app(p, "pages/404.tsx").as_deref(), Some("app/not-found.tsx"));
        assert_eq!(to_app(p, "pages/api/users.ts").as_deref(), Some("app/api/users/route.ts"));
        assert_eq!(to_app(p, "src/pages/about.tsx").as_deref(), Some("app/about/page.tsx"));
    }

    #[test]
    fn app_to_pages_routes() {
        let route = parse_route(LayoutConvention::AppRouter, "app/(shop)/cart/[id]/page.tsx").unwrap();
        assert_eq!(route.url(), "/cart/[id]");
        assert_eq!(
            render_route(LayoutConvention::PagesRouter, &route, TSX, NamingConvention::KebabCase).as_deref(),
            Some("pages/cart/[id].tsx")
        );

        let api = parse_route(LayoutConvention::AppRouter, "app/api/users/route.ts").unwrap();
        assert_eq!(
            render_route(LayoutConvention::PagesRouter, &api, TSX, NamingConvention::KebabCase).as_deref(),
            Some("pages/api/users.ts")
        );

        let loading = parse_route(LayoutConvention::AppRouter, "app/loading.tsx").unwrap();
        assert_eq!(
            render_route(LayoutConvention::PagesRouter, &loading, TSX, NamingConvention::KebabCase),
            None
        );
    }

    #[test]
    fn spa_pages_become_kebab_routes() {
        let s = LayoutConvention::SpaRouter;
        assert_eq!(to_app(s, "src/pages/Home.jsx").as_deref(), Some("app/page.tsx"));
        assert_eq!(
            to_app(s, "src/pages/UserProfile.jsx").as_deref(),
            Some("app/user-profile/page.tsx")
        );
        assert_eq!(
            to_app(s, "src/pages/users/$id.jsx").as_deref(),
            Some("app/users/[id]/page.tsx")
        );
        assert_eq!(to_app(s, "src/App.jsx").as_deref(), Some("app/layout.tsx"));
        assert_eq!(to_app(s, "src/pages/NotFound.jsx").as_deref(), Some("app/not-found.tsx"));
        assert_eq!(parse_route(s, "pages/About.jsx"), None);
    }

    #[test]
    fn non_route_files_are_ignored() {
        assert_eq!(parse_route(LayoutConvention::AppRouter, "app/globals.css"), None);
        assert_eq!(parse_route(LayoutConvention::AppRouter, "app/components/Nav.tsx"), None);
        assert_eq!(parse_route(LayoutConvention::PagesRouter, "components/Nav.tsx"), None);
    }

    #[test]
    fn kebab_case_conversion() {
        assert_eq!(to_kebab_case("UserProfile"), "user-profile");
        assert_eq!(to_kebab_case("HTMLPage"), "html-page");
        assert_eq!(to_kebab_case("user_settings"), "user-settings");
        assert_eq!(to_kebab_case("about"), "about");
        assert_eq!(apply_naming("user-profile", NamingConvention::PascalCase), "UserProfile");
        assert_eq!(apply_naming("user-profile", NamingConvention::CamelCase), "userProfile");
    }
}
