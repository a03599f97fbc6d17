//! Style compilation: Sass to a prefixed, minified stylesheet with a source map.
//!
//! Entries are compiled with `grass` against an in-memory view of the styles
//! directory, so `@use` and `@import` resolve between the discovered files
//! only. The compiled CSS (vendor sheets first) is then run through
//! `lightningcss` once for the readable bundle and once for the minified one.

use super::{Stage, StageError, StageInputs, StageOutput, VirtualFile};
use crate::build::{FileDiagnostic, TaskId};
use crate::config::{parse_browser_version, StylesConfig};
use crate::layout::{normalize, AssetClass, OutputTree};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Compiles the styles directory into `css/<bundle>.css` and `<bundle>.min.css`.
#[derive(Debug, Clone)]
pub struct StyleStage {
    bundle: String,
    vendor: Vec<PathBuf>,
    targets: Targets,
}

impl StyleStage {
    pub fn new(config: &StylesConfig) -> Self {
        Self {
            bundle: config.bundle.clone(),
            vendor: config.vendor.clone(),
            targets: Targets::from(browsers(&config.browsers)),
        }
    }

    /// Compile one entry to expanded CSS.
    fn compile_entry(&self, entry: &VirtualFile, fs: &MemoryFs) -> Result<String, StageError> {
        let source = entry.text()?;
        let virtual_path = Path::new("/").join(&entry.path);
        let syntax = match entry.path.extension().and_then(|e| e.to_str()) {
            Some("sass") => grass::InputSyntax::Sass,
            Some("css") => grass::InputSyntax::Css,
            _ => grass::InputSyntax::Scss,
        };
        let options = grass::Options::default()
            .style(grass::OutputStyle::Expanded)
            .input_syntax(syntax)
            .quiet(true)
            .load_path(virtual_path.parent().unwrap_or(Path::new("/")))
            .fs(fs);

        grass::from_string(source.to_string(), &options)
            .map_err(|e| StageError::Compile(sass_diagnostic(&entry.path, &e.to_string())))
    }

    /// Prefix and print `css`; returns (readable, minified, source map json).
    fn finish(&self, css: &str) -> Result<(String, String, String), StageError> {
        let filename = format!("{}.css", self.bundle);
        let mut sheet = StyleSheet::parse(
            css,
            ParserOptions { filename: filename.clone(), ..ParserOptions::default() },
        )
        .map_err(|e| {
            let diagnostic = match &e.loc {
                Some(loc) => FileDiagnostic::with_location(
                    &filename,
                    loc.line as usize + 1,
                    loc.column as usize,
                    e.kind.to_string(),
                ),
                None => FileDiagnostic::new(&filename, e.kind.to_string()),
            };
            StageError::Compile(diagnostic)
        })?;

        sheet
            .minify(MinifyOptions { targets: self.targets, ..MinifyOptions::default() })
            .map_err(|e| StageError::Compile(FileDiagnostic::new(&filename, e.to_string())))?;

        let readable = sheet
            .to_css(PrinterOptions {
                minify: false,
                targets: self.targets,
                ..PrinterOptions::default()
            })
            .map_err(|e| StageError::Compile(FileDiagnostic::new(&filename, e.to_string())))?;

        let mut map = SourceMap::new("/");
        map.add_source(&filename);
        map.set_source_content(0, css).map_err(|e| StageError::Sourcemap(format!("{e:?}")))?;

        let minified = sheet
            .to_css(PrinterOptions {
                minify: true,
                source_map: Some(&mut map),
                targets: self.targets,
                ..PrinterOptions::default()
            })
            .map_err(|e| StageError::Compile(FileDiagnostic::new(&filename, e.to_string())))?;

        let json = map.to_json(None).map_err(|e| StageError::Sourcemap(format!("{e:?}")))?;
        Ok((readable.code, minified.code, json))
    }
}

impl Stage for StyleStage {
    fn task(&self) -> TaskId {
        TaskId::Styles
    }

    fn inputs(&self) -> &[AssetClass] {
        &[AssetClass::Styles]
    }

    fn vendor_files(&self) -> &[PathBuf] {
        &self.vendor
    }

    fn output_dir(&self, output: &OutputTree) -> PathBuf {
        output.css.clone()
    }

    fn transform(&self, inputs: &StageInputs) -> Result<StageOutput, StageError> {
        let sources = inputs.files(AssetClass::Styles);
        if inputs.vendor.is_empty() && sources.iter().all(|f| is_partial(&f.path)) {
            return Ok(StageOutput::default());
        }
        let fs = MemoryFs::new(sources);

        let mut css = String::new();
        for vendor in &inputs.vendor {
            css.push_str(vendor.text()?);
            css.push('\n');
        }
        for entry in sources.iter().filter(|f| !is_partial(&f.path)) {
            css.push_str(&self.compile_entry(entry, &fs)?);
            css.push('\n');
        }

        let (readable, minified, map) = self.finish(&css)?;
        let min_name = format!("{}.min.css", self.bundle);
        let minified = format!("{minified}\n/*# sourceMappingURL={min_name}.map */\n");

        Ok(StageOutput {
            files: vec![
                VirtualFile::new(format!("{}.css", self.bundle), readable),
                VirtualFile::new(format!("{min_name}.map"), map),
                VirtualFile::new(min_name, minified),
            ],
            ..StageOutput::default()
        })
    }

    fn notice(&self) -> &'static str {
        "Styles compiled"
    }
}

/// Partials (`_name.scss`) are only reachable through `@use`/`@import`.
fn is_partial(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with('_'))
}

/// Browser targets from the config table; unknown names were rejected by validation.
fn browsers(table: &BTreeMap<String, String>) -> Browsers {
    let mut browsers = Browsers::default();
    for (name, version) in table {
        let version = parse_browser_version(version);
        match name.as_str() {
            "android" => browsers.android = version,
            "chrome" => browsers.chrome = version,
            "edge" => browsers.edge = version,
            "firefox" => browsers.firefox = version,
            "ie" => browsers.ie = version,
            "ios_saf" => browsers.ios_saf = version,
            "opera" => browsers.opera = version,
            "safari" => browsers.safari = version,
            "samsung" => browsers.samsung = version,
            _ => {}
        }
    }
    browsers
}

/// Turn a grass error report into a diagnostic, keeping the location when present.
fn sass_diagnostic(file: &Path, report: &str) -> FileDiagnostic {
    static LOCATION: OnceLock<Option<Regex>> = OnceLock::new();
    // `./stdin:3:8`, or `  stdin 3:8  root stylesheet` without unicode
    let location = LOCATION
        .get_or_init(|| Regex::new(r"(?m)(\d+):(\d+)(?:\s+root stylesheet)?\s*$").ok());

    let message = report.lines().next().unwrap_or(report).trim_start_matches("Error: ").to_string();
    let last = location.as_ref().and_then(|re| re.captures_iter(report).last());
    let position = last.and_then(|caps| {
        Some((caps[1].parse::<usize>().ok()?, caps[2].parse::<usize>().ok()?))
    });

    match position {
        Some((line, column)) => FileDiagnostic::with_location(file, line, column, message),
        None => FileDiagnostic::new(file, message),
    }
}

/// Read-only view of the style sources for the Sass compiler, rooted at `/`.
#[derive(Debug)]
struct MemoryFs {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryFs {
    fn new(sources: &[VirtualFile]) -> Self {
        let files = sources
            .iter()
            .map(|f| (normalize(&Path::new("/").join(&f.path)), f.contents.clone()))
            .collect();
        Self { files }
    }
}

impl grass::Fs for MemoryFs {
    fn is_dir(&self, path: &Path) -> bool {
        let path = normalize(path);
        self.files.keys().any(|f| f.starts_with(&path) && *f != path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        self.files.get(&normalize(path)).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("{} not found", path.display()))
        })
    }
}
