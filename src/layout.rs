//! Source and output tree layout.
//!
//! Resolves the configured directory tables into a [`SourceTree`], an
//! [`OutputTree`] and one [`GlobSpec`] per [`AssetClass`]. Resolution is pure
//! path arithmetic; nothing here touches the filesystem.

use crate::config::SiteConfig;
use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Error while resolving the layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// A sub-directory is absolute or climbs out of its root
    #[error("'{field}' must be a relative path inside its root, got '{}'", .path.display())]
    EscapesRoot { field: &'static str, path: PathBuf },
    /// The output root would swallow the sources or the project
    #[error("output root '{}' overlaps source root '{}'", .out.display(), .src.display())]
    OverlappingRoots { src: PathBuf, out: PathBuf },
    /// Invalid glob pattern
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern { pattern: String, source: glob::PatternError },
}

/// Logical class of input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetClass {
    Styles,
    Markup,
    Partials,
    Data,
    Scripts,
    Images,
    Static,
}

impl AssetClass {
    /// Every class, in declaration order.
    pub const ALL: [AssetClass; 7] = [
        AssetClass::Styles,
        AssetClass::Markup,
        AssetClass::Partials,
        AssetClass::Data,
        AssetClass::Scripts,
        AssetClass::Images,
        AssetClass::Static,
    ];
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssetClass::Styles => "styles",
            AssetClass::Markup => "markup",
            AssetClass::Partials => "partials",
            AssetClass::Data => "data",
            AssetClass::Scripts => "scripts",
            AssetClass::Images => "images",
            AssetClass::Static => "static",
        };
        f.write_str(name)
    }
}

/// Source root and its per-class sub-directories (all absolute).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub root: PathBuf,
    pub styles: PathBuf,
    pub markup: PathBuf,
    pub data: PathBuf,
    pub scripts: PathBuf,
    pub images: PathBuf,
    pub statics: PathBuf,
}

/// Output root and the sub-directory each stage writes into (all absolute).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTree {
    pub root: PathBuf,
    pub css: PathBuf,
    pub js: PathBuf,
    pub images: PathBuf,
    pub html: PathBuf,
    pub statics: PathBuf,
}

/// Ordered include patterns (plus excludes) relative to one base directory.
#[derive(Debug, Clone)]
pub struct GlobSpec {
    base: PathBuf,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

/// Match options shared by every spec: `*` stops at `/`, `**` crosses it.
const MATCH_OPTIONS: MatchOptions =
    MatchOptions { case_sensitive: true, require_literal_separator: true, require_literal_leading_dot: false };

impl GlobSpec {
    /// Create a spec from include and exclude pattern strings.
    pub fn new(
        base: impl Into<PathBuf>,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self, LayoutError> {
        Ok(Self { base: base.into(), include: compile(include)?, exclude: compile(exclude)? })
    }

    /// Directory the patterns are relative to.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Include patterns as written.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.include.iter().map(Pattern::as_str)
    }

    /// Check a path relative to the base directory.
    pub fn matches_relative(&self, relative: &Path) -> bool {
        self.include.iter().any(|p| p.matches_path_with(relative, MATCH_OPTIONS))
            && !self.exclude.iter().any(|p| p.matches_path_with(relative, MATCH_OPTIONS))
    }

    /// Check an absolute path; paths outside the base never match.
    pub fn matches(&self, path: &Path) -> bool {
        match path.strip_prefix(&self.base) {
            Ok(relative) => self.matches_relative(relative),
            Err(_) => false,
        }
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, LayoutError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|source| LayoutError::InvalidPattern { pattern: p.clone(), source })
        })
        .collect()
}

/// Fully resolved layout: both trees plus the glob of every class.
#[derive(Debug, Clone)]
pub struct SiteLayout {
    pub source: SourceTree,
    pub output: OutputTree,
    globs: BTreeMap<AssetClass, GlobSpec>,
}

impl SiteLayout {
    /// Resolve the layout for a project rooted at `project_root`.
    pub fn resolve(project_root: &Path, config: &SiteConfig) -> Result<Self, LayoutError> {
        let src_root = normalize(&project_root.join(&config.project.src));
        let out_root = normalize(&project_root.join(&config.project.out));
        let project_root = normalize(project_root);

        if out_root == project_root
            || src_root.starts_with(&out_root)
            || out_root.starts_with(&src_root)
        {
            return Err(LayoutError::OverlappingRoots { src: src_root, out: out_root });
        }

        let s = &config.source;
        let source = SourceTree {
            styles: sub_dir(&src_root, "source.styles", &s.styles)?,
            markup: sub_dir(&src_root, "source.markup", &s.markup)?,
            data: sub_dir(&src_root, "source.data", &s.data)?,
            scripts: sub_dir(&src_root, "source.scripts", &s.scripts)?,
            images: sub_dir(&src_root, "source.images", &s.images)?,
            statics: sub_dir(&src_root, "source.assets", &s.assets)?,
            root: src_root,
        };

        let o = &config.output;
        let output = OutputTree {
            css: sub_dir(&out_root, "output.css", &o.css)?,
            js: sub_dir(&out_root, "output.js", &o.js)?,
            images: sub_dir(&out_root, "output.images", &o.images)?,
            html: sub_dir(&out_root, "output.html", &o.html)?,
            statics: sub_dir(&out_root, "output.assets", &o.assets)?,
            root: out_root,
        };

        let mut globs = BTreeMap::new();
        globs.insert(AssetClass::Styles, GlobSpec::new(&source.styles, &config.styles.patterns, &[])?);
        globs.insert(
            AssetClass::Markup,
            GlobSpec::new(&source.markup, &config.markup.patterns, &config.markup.exclude)?,
        );
        globs.insert(AssetClass::Partials, GlobSpec::new(&source.markup, &config.markup.partials, &[])?);
        globs.insert(AssetClass::Data, GlobSpec::new(&source.data, &config.markup.data, &[])?);
        globs.insert(AssetClass::Scripts, GlobSpec::new(&source.scripts, &config.scripts.patterns, &[])?);
        globs.insert(AssetClass::Images, GlobSpec::new(&source.images, &config.images.patterns, &[])?);
        globs.insert(AssetClass::Static, GlobSpec::new(&source.statics, &config.assets.patterns, &[])?);

        Ok(Self { source, output, globs })
    }

    /// The glob of one asset class.
    pub fn glob(&self, class: AssetClass) -> &GlobSpec {
        // resolve() inserts every class
        &self.globs[&class]
    }

    /// Every class with its glob.
    pub fn globs(&self) -> impl Iterator<Item = (AssetClass, &GlobSpec)> {
        self.globs.iter().map(|(class, spec)| (*class, spec))
    }
}

/// Join a configured sub-directory onto its root, rejecting escapes.
fn sub_dir(root: &Path, field: &'static str, sub: &Path) -> Result<PathBuf, LayoutError> {
    let escapes = sub.components().any(|c| {
        matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
    });
    if escapes {
        return Err(LayoutError::EscapesRoot { field, path: sub.to_path_buf() });
    }
    Ok(normalize(&root.join(sub)))
}

/// Lexically normalize a path, dropping `.` and folding `..`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SiteLayout {
        SiteLayout::resolve(Path::new("/project"), &SiteConfig::default()).unwrap()
    }

    #[test]
    fn test_default_source_tree() {
        let layout = layout();
        assert_eq!(layout.source.root, PathBuf::from("/project/src"));
        assert_eq!(layout.source.styles, PathBuf::from("/project/src/sass"));
        assert_eq!(layout.source.markup, PathBuf::from("/project/src/pug"));
        assert_eq!(layout.source.data, PathBuf::from("/project/src/data"));
        assert_eq!(layout.source.scripts, PathBuf::from("/project/src/js"));
        assert_eq!(layout.source.images, PathBuf::from("/project/src/images"));
        assert_eq!(layout.source.statics, PathBuf::from("/project/src/assets"));
    }

    #[test]
    fn test_default_output_tree() {
        let layout = layout();
        assert_eq!(layout.output.root, PathBuf::from("/project/public"));
        assert_eq!(layout.output.css, PathBuf::from("/project/public/css"));
        assert_eq!(layout.output.js, PathBuf::from("/project/public/js"));
        assert_eq!(layout.output.images, PathBuf::from("/project/public/images"));
        assert_eq!(layout.output.html, PathBuf::from("/project/public"));
        assert_eq!(layout.output.statics, PathBuf::from("/project/public"));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let a = layout();
        let b = layout();
        assert_eq!(a.source, b.source);
        assert_eq!(a.output, b.output);
    }

    #[test]
    fn test_every_class_has_a_glob() {
        let layout = layout();
        assert_eq!(layout.globs().count(), AssetClass::ALL.len());
        for class in AssetClass::ALL {
            assert!(layout.glob(class).patterns().count() > 0, "{} has no patterns", class);
        }
    }

    #[test]
    fn test_style_glob_is_top_level_only() {
        let layout = layout();
        let styles = layout.glob(AssetClass::Styles);
        assert!(styles.matches(Path::new("/project/src/sass/main.scss")));
        assert!(styles.matches(Path::new("/project/src/sass/legacy.sass")));
        assert!(!styles.matches(Path::new("/project/src/sass/vendor/grid.scss")));
        assert!(!styles.matches(Path::new("/project/src/js/main.scss")));
    }

    #[test]
    fn test_markup_glob_excludes_partials() {
        let layout = layout();
        let markup = layout.glob(AssetClass::Markup);
        let partials = layout.glob(AssetClass::Partials);

        assert!(markup.matches(Path::new("/project/src/pug/index.pug")));
        assert!(markup.matches(Path::new("/project/src/pug/blog/post.pug")));
        assert!(!markup.matches(Path::new("/project/src/pug/templates/layout.pug")));
        assert!(partials.matches(Path::new("/project/src/pug/templates/layout.pug")));
        assert!(!partials.matches(Path::new("/project/src/pug/index.pug")));
    }

    #[test]
    fn test_recursive_globs() {
        let layout = layout();
        let scripts = layout.glob(AssetClass::Scripts);
        assert!(scripts.matches(Path::new("/project/src/js/app.js")));
        assert!(scripts.matches(Path::new("/project/src/js/lib/util.js")));
        assert!(!scripts.matches(Path::new("/project/src/js/readme.md")));

        let images = layout.glob(AssetClass::Images);
        assert!(images.matches(Path::new("/project/src/images/icons/a.svg")));
    }

    #[test]
    fn test_sub_dir_escaping_root_is_rejected() {
        let mut config = SiteConfig::default();
        config.source.styles = PathBuf::from("../shared/sass");

        let err = SiteLayout::resolve(Path::new("/project"), &config).unwrap_err();
        assert!(matches!(err, LayoutError::EscapesRoot { field: "source.styles", .. }));
    }

    #[test]
    fn test_absolute_sub_dir_is_rejected() {
        let mut config = SiteConfig::default();
        config.output.css = PathBuf::from("/tmp/css");

        assert!(SiteLayout::resolve(Path::new("/project"), &config).is_err());
    }

    #[test]
    fn test_output_root_must_not_contain_sources() {
        let mut config = SiteConfig::default();
        config.project.out = PathBuf::from(".");

        let err = SiteLayout::resolve(Path::new("/project"), &config).unwrap_err();
        assert!(matches!(err, LayoutError::OverlappingRoots { .. }));
    }

    #[test]
    fn test_invalid_pattern() {
        let mut config = SiteConfig::default();
        config.scripts.patterns = vec!["[".to_string()];

        let err = SiteLayout::resolve(Path::new("/project"), &config).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidPattern { .. }));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("./src")), PathBuf::from("src"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }
}
