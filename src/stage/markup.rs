//! Markup rendering: page templates plus per-page JSON data to HTML.
//!
//! Templates use Tera syntax. Partials are registered under their path
//! relative to the markup directory (`templates/layout.pug`) so pages can
//! `{% extends %}` or `{% include %}` them. Each page reads its data from
//! `<data dir>/<page path>.json`; the data may contain comments.

use super::{Stage, StageError, StageInputs, StageOutput, VirtualFile};
use crate::build::{FileDiagnostic, TaskId};
use crate::config::MarkupConfig;
use crate::layout::{AssetClass, OutputTree};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

/// Extensions rendered with HTML autoescaping.
const AUTOESCAPE: &[&str] = &[".pug", ".html", ".htm"];

/// Renders every page template into `<html dir>/<relative dir>/<stem>.html`.
#[derive(Debug, Clone)]
pub struct MarkupStage {
    require_data: bool,
}

impl MarkupStage {
    pub fn new(config: &MarkupConfig) -> Self {
        Self { require_data: config.require_data }
    }

    /// Tera instance holding every partial.
    fn partials(&self, partials: &[VirtualFile]) -> Result<Tera, StageError> {
        let mut tera = Tera::default();
        tera.autoescape_on(AUTOESCAPE.to_vec());

        let mut sources = Vec::with_capacity(partials.len());
        for partial in partials {
            sources.push((template_name(&partial.path), partial.text()?));
        }

        tera.add_raw_templates(sources).map_err(|e| {
            let message = error_chain(&e);
            // Blame the partial the error names, if any
            let file = partials
                .iter()
                .find(|p| message.contains(&template_name(&p.path)))
                .or_else(|| partials.first())
                .map(|p| p.path.clone())
                .unwrap_or_default();
            StageError::Compile(FileDiagnostic::new(file, message))
        })?;
        Ok(tera)
    }

    /// Render one page against the shared partials.
    fn render_page(
        &self,
        base: &Tera,
        page: &VirtualFile,
        data: &BTreeMap<PathBuf, &VirtualFile>,
    ) -> Result<VirtualFile, FileDiagnostic> {
        let context = self.context_for(page, data)?;
        let source =
            page.text().map_err(|_| FileDiagnostic::new(&page.path, "template is not valid UTF-8"))?;
        let name = template_name(&page.path);

        let mut tera = base.clone();
        tera.add_raw_template(&name, source)
            .map_err(|e| FileDiagnostic::new(&page.path, error_chain(&e)))?;
        let html =
            tera.render(&name, &context).map_err(|e| FileDiagnostic::new(&page.path, error_chain(&e)))?;

        Ok(VirtualFile::new(page.path.with_extension("html"), html))
    }

    /// Load the data file of a page as a template context.
    fn context_for(
        &self,
        page: &VirtualFile,
        data: &BTreeMap<PathBuf, &VirtualFile>,
    ) -> Result<Context, FileDiagnostic> {
        let data_path = data_path(&page.path);
        let Some(file) = data.get(&data_path) else {
            if self.require_data {
                return Err(FileDiagnostic::new(
                    &page.path,
                    format!("missing data file '{}'", data_path.display()),
                ));
            }
            return Ok(Context::new());
        };

        let text = file
            .text()
            .map_err(|_| FileDiagnostic::new(&file.path, "data file is not valid UTF-8"))?;
        let value: serde_json::Value = json5::from_str(text)
            .map_err(|e| FileDiagnostic::new(&file.path, format!("malformed data: {e}")))?;
        Context::from_value(value).map_err(|_| {
            FileDiagnostic::new(&file.path, "data must be a JSON object at the top level")
        })
    }
}

impl Stage for MarkupStage {
    fn task(&self) -> TaskId {
        TaskId::Markup
    }

    fn inputs(&self) -> &[AssetClass] {
        &[AssetClass::Markup, AssetClass::Partials, AssetClass::Data]
    }

    fn output_dir(&self, output: &OutputTree) -> PathBuf {
        output.html.clone()
    }

    fn transform(&self, inputs: &StageInputs) -> Result<StageOutput, StageError> {
        let base = self.partials(inputs.files(AssetClass::Partials))?;
        let data: BTreeMap<PathBuf, &VirtualFile> =
            inputs.files(AssetClass::Data).iter().map(|f| (f.path.clone(), f)).collect();

        let mut output = StageOutput::default();
        for page in inputs.files(AssetClass::Markup) {
            match self.render_page(&base, page, &data) {
                Ok(html) => output.files.push(html),
                Err(diagnostic) => output.diagnostics.push(diagnostic),
            }
        }
        Ok(output)
    }

    fn notice(&self) -> &'static str {
        "HTML rendered"
    }
}

/// Template name: the path relative to the markup dir, with `/` separators.
fn template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// `index.pug` reads `index.pug.json`.
fn data_path(page: &Path) -> PathBuf {
    let mut name = page.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Flatten a Tera error and its causes into one line.
fn error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> MarkupStage {
        MarkupStage::new(&MarkupConfig::default())
    }

    fn page(path: &str, src: &str) -> (AssetClass, VirtualFile) {
        (AssetClass::Markup, VirtualFile::new(path, src))
    }

    fn partial(path: &str, src: &str) -> (AssetClass, VirtualFile) {
        (AssetClass::Partials, VirtualFile::new(path, src))
    }

    fn data(path: &str, src: &str) -> (AssetClass, VirtualFile) {
        (AssetClass::Data, VirtualFile::new(path, src))
    }

    fn inputs(files: Vec<(AssetClass, VirtualFile)>) -> StageInputs {
        files.into_iter().fold(StageInputs::new(), |i, (class, file)| i.with(class, file))
    }

    fn html<'a>(out: &'a StageOutput, name: &str) -> &'a str {
        let file = out.files.iter().find(|f| f.path == Path::new(name)).unwrap();
        std::str::from_utf8(&file.contents).unwrap()
    }

    #[test]
    fn test_renders_page_with_data() {
        let out = stage()
            .transform(&inputs(vec![
                page("index.pug", "<h1>{{ title }}</h1>"),
                data("index.pug.json", r#"{"title": "Home"}"#),
            ]))
            .unwrap();

        assert!(out.diagnostics.is_empty());
        assert_eq!(html(&out, "index.html"), "<h1>Home</h1>");
    }

    #[test]
    fn test_nested_page_keeps_relative_dir() {
        let out = stage()
            .transform(&inputs(vec![
                page("blog/post.pug", "{{ slug }}"),
                data("blog/post.pug.json", r#"{"slug": "first"}"#),
            ]))
            .unwrap();

        assert_eq!(html(&out, "blog/post.html"), "first");
    }

    #[test]
    fn test_data_with_comments() {
        let out = stage()
            .transform(&inputs(vec![
                page("index.pug", "{{ title }}"),
                data("index.pug.json", "{\n  // page title\n  \"title\": \"Home\", /* trailing */\n}"),
            ]))
            .unwrap();

        assert_eq!(html(&out, "index.html"), "Home");
    }

    #[test]
    fn test_malformed_data_fails_only_that_page() {
        let out = stage()
            .transform(&inputs(vec![
                page("about.pug", "{{ title }}"),
                page("index.pug", "{{ title }}"),
                data("about.pug.json", "{ \"title\": "),
                data("index.pug.json", r#"{"title": "Home"}"#),
            ]))
            .unwrap();

        assert_eq!(out.files.len(), 1);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].file, PathBuf::from("about.pug.json"));
        assert_eq!(html(&out, "index.html"), "Home");
    }

    #[test]
    fn test_missing_data_is_an_error_by_default() {
        let out = stage().transform(&inputs(vec![page("index.pug", "static")])).unwrap();

        assert!(out.files.is_empty());
        assert!(out.diagnostics[0].message.contains("index.pug.json"));
    }

    #[test]
    fn test_missing_data_allowed_when_not_required() {
        let config = MarkupConfig { require_data: false, ..MarkupConfig::default() };
        let out = MarkupStage::new(&config)
            .transform(&inputs(vec![page("index.pug", "static")]))
            .unwrap();

        assert_eq!(html(&out, "index.html"), "static");
    }

    #[test]
    fn test_non_object_data_is_rejected() {
        let out = stage()
            .transform(&inputs(vec![page("index.pug", "x"), data("index.pug.json", "[1, 2]")]))
            .unwrap();

        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn test_page_extends_partial() {
        let out = stage()
            .transform(&inputs(vec![
                partial(
                    "templates/layout.pug",
                    "<main>{% block content %}{% endblock content %}</main>",
                ),
                page(
                    "index.pug",
                    "{% extends \"templates/layout.pug\" %}{% block content %}{{ title }}{% endblock content %}",
                ),
                data("index.pug.json", r#"{"title": "Home"}"#),
            ]))
            .unwrap();

        assert_eq!(html(&out, "index.html"), "<main>Home</main>");
    }

    #[test]
    fn test_template_error_fails_only_that_page() {
        let out = stage()
            .transform(&inputs(vec![
                page("broken.pug", "{% if %}"),
                page("index.pug", "ok"),
                data("broken.pug.json", "{}"),
                data("index.pug.json", "{}"),
            ]))
            .unwrap();

        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].file, PathBuf::from("broken.pug"));
        assert_eq!(html(&out, "index.html"), "ok");
    }

    #[test]
    fn test_broken_partial_fails_stage() {
        let err = stage()
            .transform(&inputs(vec![partial("templates/layout.pug", "{% block %}")]))
            .unwrap_err();

        match err {
            StageError::Compile(d) => assert_eq!(d.file, PathBuf::from("templates/layout.pug")),
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_autoescapes_data() {
        let out = stage()
            .transform(&inputs(vec![
                page("index.pug", "{{ title }}"),
                data("index.pug.json", r#"{"title": "<b>"}"#),
            ]))
            .unwrap();

        assert_eq!(html(&out, "index.html"), "&lt;b&gt;");
    }

    #[test]
    fn test_data_path() {
        assert_eq!(data_path(Path::new("index.pug")), PathBuf::from("index.pug.json"));
        assert_eq!(data_path(Path::new("blog/post.pug")), PathBuf::from("blog/post.pug.json"));
    }
}
