//! Configuration schema types for `sitepipe.toml`
//!
//! Defines the structure and validation rules for a site project. Every field
//! has a default, so an empty file describes the conventional layout:
//! sources under `src/`, output under `public/`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Project metadata and the two tree roots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name, used in log output
    #[serde(default = "default_name")]
    pub name: String,
    /// Source tree root
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Output tree root
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { name: default_name(), src: default_src(), out: default_out() }
    }
}

fn default_name() -> String {
    "site".to_string()
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

fn default_out() -> PathBuf {
    PathBuf::from("public")
}

/// Source sub-directories, relative to `project.src`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_styles_dir")]
    pub styles: PathBuf,
    #[serde(default = "default_markup_dir")]
    pub markup: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data: PathBuf,
    #[serde(default = "default_scripts_dir")]
    pub scripts: PathBuf,
    #[serde(default = "default_images_dir")]
    pub images: PathBuf,
    #[serde(default = "default_assets_dir")]
    pub assets: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            styles: default_styles_dir(),
            markup: default_markup_dir(),
            data: default_data_dir(),
            scripts: default_scripts_dir(),
            images: default_images_dir(),
            assets: default_assets_dir(),
        }
    }
}

fn default_styles_dir() -> PathBuf {
    PathBuf::from("sass")
}

fn default_markup_dir() -> PathBuf {
    PathBuf::from("pug")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("js")
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

/// Output sub-directories, relative to `project.out`
///
/// An empty path means the output root itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_css_out")]
    pub css: PathBuf,
    #[serde(default = "default_js_out")]
    pub js: PathBuf,
    #[serde(default = "default_images_dir")]
    pub images: PathBuf,
    #[serde(default)]
    pub html: PathBuf,
    #[serde(default)]
    pub assets: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            css: default_css_out(),
            js: default_js_out(),
            images: default_images_dir(),
            html: PathBuf::new(),
            assets: PathBuf::new(),
        }
    }
}

fn default_css_out() -> PathBuf {
    PathBuf::from("css")
}

fn default_js_out() -> PathBuf {
    PathBuf::from("js")
}

/// Style compilation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Entry patterns, relative to the styles directory
    #[serde(default = "default_style_patterns")]
    pub patterns: Vec<String>,
    /// Prebuilt stylesheets prepended to the bundle, relative to the project root
    #[serde(default)]
    pub vendor: Vec<PathBuf>,
    /// Base name of the emitted stylesheet
    #[serde(default = "default_style_bundle")]
    pub bundle: String,
    /// Browser targets for vendor prefixing, e.g. `chrome = "90"`
    #[serde(default = "default_browsers")]
    pub browsers: BTreeMap<String, String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            patterns: default_style_patterns(),
            vendor: vec![],
            bundle: default_style_bundle(),
            browsers: default_browsers(),
        }
    }
}

fn default_style_patterns() -> Vec<String> {
    vec!["*.scss".to_string(), "*.sass".to_string()]
}

fn default_style_bundle() -> String {
    "style".to_string()
}

fn default_browsers() -> BTreeMap<String, String> {
    [("chrome", "90"), ("edge", "90"), ("firefox", "88"), ("safari", "14"), ("ios_saf", "14")]
        .into_iter()
        .map(|(browser, version)| (browser.to_string(), version.to_string()))
        .collect()
}

/// Browsers understood by the `styles.browsers` table
pub const KNOWN_BROWSERS: &[&str] =
    &["android", "chrome", "edge", "firefox", "ie", "ios_saf", "opera", "safari", "samsung"];

/// Markup rendering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupConfig {
    /// Page template patterns, relative to the markup directory
    #[serde(default = "default_markup_patterns")]
    pub patterns: Vec<String>,
    /// Patterns excluded from the page set (partials live here)
    #[serde(default = "default_markup_exclude")]
    pub exclude: Vec<String>,
    /// Partial template patterns, relative to the markup directory
    #[serde(default = "default_partial_patterns")]
    pub partials: Vec<String>,
    /// Data file patterns, relative to the data directory
    #[serde(default = "default_data_patterns")]
    pub data: Vec<String>,
    /// Fail a page whose data file is missing (otherwise render with an empty context)
    #[serde(default = "default_true")]
    pub require_data: bool,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            patterns: default_markup_patterns(),
            exclude: default_markup_exclude(),
            partials: default_partial_patterns(),
            data: default_data_patterns(),
            require_data: true,
        }
    }
}

fn default_markup_patterns() -> Vec<String> {
    vec!["**/*.pug".to_string()]
}

fn default_markup_exclude() -> Vec<String> {
    vec!["templates/**".to_string()]
}

fn default_partial_patterns() -> Vec<String> {
    vec!["templates/*.pug".to_string()]
}

fn default_data_patterns() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

fn default_true() -> bool {
    true
}

/// Script bundling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Source patterns, relative to the scripts directory
    #[serde(default = "default_script_patterns")]
    pub patterns: Vec<String>,
    /// Prebuilt scripts placed ahead of the sources, relative to the project root
    #[serde(default)]
    pub vendor: Vec<PathBuf>,
    /// Base name of the emitted bundle
    #[serde(default = "default_script_bundle")]
    pub bundle: String,
    /// Syntax level to lower to: `es2015`..`esnext`, optionally with engines (`es2017,chrome58`)
    #[serde(default = "default_script_target")]
    pub target: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            patterns: default_script_patterns(),
            vendor: vec![],
            bundle: default_script_bundle(),
            target: default_script_target(),
        }
    }
}

/// Script target used when `[scripts] target` is not set.
pub const DEFAULT_SCRIPT_TARGET: &str = "es2015";

fn default_script_target() -> String {
    DEFAULT_SCRIPT_TARGET.to_string()
}

fn default_script_patterns() -> Vec<String> {
    vec!["**/*.js".to_string()]
}

fn default_script_bundle() -> String {
    "app".to_string()
}

/// Image optimization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_everything")]
    pub patterns: Vec<String>,
    /// oxipng preset, 0 to 6
    #[serde(default = "default_png_level")]
    pub png_level: u8,
    /// JPEG re-encode quality, 1 to 100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            patterns: default_everything(),
            png_level: default_png_level(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_everything() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_png_level() -> u8 {
    5
}

fn default_jpeg_quality() -> u8 {
    75
}

/// Static asset copy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_everything")]
    pub patterns: Vec<String>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self { patterns: default_everything() }
    }
}

/// Development server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Inject the reload client and broadcast output changes
    #[serde(default = "default_true")]
    pub live_reload: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), live_reload: true }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100, clear_screen: false }
    }
}

/// Build scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildConfig {
    /// Worker threads per level (defaults to available parallelism)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

/// Complete sitepipe.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SiteConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub markup: MarkupConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "images.jpeg_quality")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sitepipe.toml: '{}' {}", self.field, self.message)
    }
}

/// Parse a `major[.minor[.patch]]` browser version into lightningcss' packed form.
pub fn parse_browser_version(version: &str) -> Option<u32> {
    let mut parts = version.trim().split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
    let patch: u32 = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
    if parts.next().is_some() || major > 255 || minor > 255 || patch > 255 {
        return None;
    }
    Some((major << 16) | (minor << 8) | patch)
}

impl SiteConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: &str| {
            errors.push(ConfigValidationError {
                field: field.to_string(),
                message: message.to_string(),
            })
        };

        if self.project.name.is_empty() {
            push("project.name", "must be a non-empty string");
        }

        for (field, patterns) in [
            ("styles.patterns", &self.styles.patterns),
            ("markup.patterns", &self.markup.patterns),
            ("markup.data", &self.markup.data),
            ("scripts.patterns", &self.scripts.patterns),
            ("images.patterns", &self.images.patterns),
            ("assets.patterns", &self.assets.patterns),
        ] {
            if patterns.is_empty() {
                push(field, "must contain at least one glob pattern");
            }
        }

        for (field, bundle) in
            [("styles.bundle", &self.styles.bundle), ("scripts.bundle", &self.scripts.bundle)]
        {
            if bundle.is_empty() || bundle.contains(['/', '\\']) {
                push(field, "must be a plain file name");
            }
        }

        for (browser, version) in &self.styles.browsers {
            let field = format!("styles.browsers.{}", browser);
            if !KNOWN_BROWSERS.contains(&browser.as_str()) {
                push(&field, "is not a known browser");
            } else if parse_browser_version(version).is_none() {
                push(&field, "must be a version like \"90\" or \"15.4\"");
            }
        }

        if oxc_compat::EngineTargets::from_target(&self.scripts.target).is_err() {
            push(
                "scripts.target",
                "must be an ES version or engine list like \"es2015\" or \"es2017,chrome58\"",
            );
        }

        if self.images.png_level > 6 {
            push("images.png_level", "must be between 0 and 6");
        }
        if self.images.jpeg_quality == 0 || self.images.jpeg_quality > 100 {
            push("images.jpeg_quality", "must be between 1 and 100");
        }

        if self.server.host.is_empty() {
            push("server.host", "must be a non-empty string");
        }

        if self.build.jobs == Some(0) {
            push("build.jobs", "must be a positive integer");
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
