//! Build System Test Suite
//!
//! End-to-end tests for the sitepipe build system against real source trees:
//!
//! - Markup rendering with per-page data
//! - Error isolation between pages and between stages
//! - Clean and rebuild behaviour
//! - Watch dispatch onto a real pipeline
//! - Progress reporting

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use sitepipe::build::{
    BuildContext, ConsoleProgress, GraphError, Pipeline, PipelineState, Task, TaskGraph, TaskId,
};
use sitepipe::config::{SiteConfig, WatchConfig};
use sitepipe::watch::{ChangeBatch, MemorySource, WatchCoordinator};

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a project in a temporary directory with default configuration.
fn create_test_project() -> (TempDir, BuildContext) {
    let temp = TempDir::new().unwrap();
    let ctx = BuildContext::new(SiteConfig::default(), temp.path().to_path_buf()).unwrap();
    (temp, ctx)
}

/// Create a test file with content.
fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// A small site touching every text stage.
fn populate_site(root: &Path) {
    create_test_file(root, "src/sass/_vars.scss", "$accent: #336699;\n");
    create_test_file(
        root,
        "src/sass/main.scss",
        "@import 'vars';\nbody { color: $accent; display: flex; }\n",
    );
    create_test_file(
        root,
        "src/pug/templates/layout.pug",
        "<html><head><title>{{ title }}</title></head><body>{% block content %}{% endblock content %}</body></html>",
    );
    create_test_file(
        root,
        "src/pug/index.pug",
        "{% extends \"templates/layout.pug\" %}{% block content %}<h1>{{ title }}</h1>{% endblock content %}",
    );
    create_test_file(root, "src/data/index.pug.json", r#"{"title": "Home"}"#);
    create_test_file(root, "src/js/app.js", "function greet(name) { return 'hi ' + name; }\ngreet('x');\n");
    create_test_file(root, "src/assets/robots.txt", "User-agent: *\n");
}

/// Every file under a directory with its contents.
fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(dir).unwrap().to_path_buf();
                files.insert(relative, fs::read(&path).unwrap());
            }
        }
    }
    files
}

/// Test writer for capturing output.
struct TestWriter(Arc<Mutex<Vec<u8>>>);

impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Pipeline Integration Tests
// ============================================================================

#[test]
fn test_home_page_renders_from_data() {
    let (temp, ctx) = create_test_project();
    create_test_file(temp.path(), "src/pug/index.pug", "<h1>{{ title }}</h1>");
    create_test_file(temp.path(), "src/data/index.pug.json", r#"{"title":"Home"}"#);

    let result = Pipeline::new(ctx).build();

    assert!(result.is_success(), "{}", result.summary());
    let html = fs::read_to_string(temp.path().join("public/index.html")).unwrap();
    assert!(html.contains("Home"));
    // No style or script sources, so no bundles
    assert!(!temp.path().join("public/css").exists());
    assert!(!temp.path().join("public/js").exists());
}

#[test]
fn test_full_site_build() {
    let (temp, ctx) = create_test_project();
    populate_site(temp.path());

    let pipeline = Pipeline::new(ctx);
    let result = pipeline.build();

    assert!(result.is_success(), "{}", result.summary());
    assert_eq!(result.success_count(), 6);
    assert_eq!(pipeline.state(), PipelineState::Idle);

    let public = temp.path().join("public");
    let css = fs::read_to_string(public.join("css/style.css")).unwrap();
    assert!(css.contains("#369") || css.contains("#336699"));
    assert!(fs::read_to_string(public.join("css/style.min.css"))
        .unwrap()
        .ends_with("/*# sourceMappingURL=style.min.css.map */\n"));
    assert!(public.join("css/style.min.css.map").is_file());
    assert!(public.join("js/app.min.js").is_file());
    assert!(public.join("js/app.min.js.map").is_file());
    assert_eq!(fs::read_to_string(public.join("robots.txt")).unwrap(), "User-agent: *\n");

    let html = fs::read_to_string(public.join("index.html")).unwrap();
    assert!(html.contains("<title>Home</title>"));
    assert!(html.contains("<h1>Home</h1>"));
    // Partials are never rendered as pages
    assert!(!public.join("templates").exists());
}

#[test]
fn test_nested_page_keeps_relative_path() {
    let (temp, ctx) = create_test_project();
    create_test_file(temp.path(), "src/pug/blog/first.pug", "<p>{{ title }}</p>");
    create_test_file(temp.path(), "src/data/blog/first.pug.json", r#"{"title":"First post"}"#);

    let result = Pipeline::new(ctx).build();

    assert!(result.is_success(), "{}", result.summary());
    let html = fs::read_to_string(temp.path().join("public/blog/first.html")).unwrap();
    assert_eq!(html, "<p>First post</p>");
}

#[test]
fn test_malformed_data_fails_one_page() {
    let (temp, ctx) = create_test_project();
    create_test_file(temp.path(), "src/pug/index.pug", "<h1>{{ title }}</h1>");
    create_test_file(temp.path(), "src/data/index.pug.json", r#"{"title":"Home"}"#);
    create_test_file(temp.path(), "src/pug/about.pug", "<h1>{{ title }}</h1>");
    create_test_file(temp.path(), "src/data/about.pug.json", r#"{"title": "#);

    let result = Pipeline::new(ctx).build();

    let markup = result.get(TaskId::Markup).unwrap();
    assert!(!markup.is_success());
    assert_eq!(markup.diagnostics.len(), 1);
    assert!(temp.path().join("public/index.html").is_file());
    assert!(!temp.path().join("public/about.html").exists());
    // Siblings are unaffected
    assert!(result.get(TaskId::Styles).unwrap().is_success());
    assert!(result.get(TaskId::Assets).unwrap().is_success());
}

#[test]
fn test_style_error_does_not_block_siblings() {
    let (temp, ctx) = create_test_project();
    populate_site(temp.path());
    create_test_file(temp.path(), "src/sass/main.scss", "body { color: $missing; }\n");

    let result = Pipeline::new(ctx).build();

    assert!(!result.is_success());
    assert_eq!(result.failed_count(), 1);
    let styles = result.get(TaskId::Styles).unwrap();
    assert_eq!(styles.diagnostics.len(), 1);
    assert!(temp.path().join("public/index.html").is_file());
    assert!(temp.path().join("public/js/app.min.js").is_file());
    assert!(!temp.path().join("public/css/style.css").exists());
}

#[test]
fn test_missing_data_is_an_error() {
    let (temp, ctx) = create_test_project();
    create_test_file(temp.path(), "src/pug/index.pug", "<h1>{{ title }}</h1>");

    let result = Pipeline::new(ctx).build();

    let markup = result.get(TaskId::Markup).unwrap();
    assert_eq!(markup.diagnostics.len(), 1);
    assert!(markup.diagnostics[0].message.contains("index.pug.json"));
}

// ============================================================================
// Clean and Rebuild Tests
// ============================================================================

#[test]
fn test_clean_leaves_root_usable() {
    let (temp, ctx) = create_test_project();
    create_test_file(temp.path(), "public/old.html", "stale");
    create_test_file(temp.path(), "public/css/deep/old.css", "stale");

    let result = Pipeline::new(ctx).clean();

    assert!(result.is_success());
    let public = temp.path().join("public");
    assert!(public.is_dir());
    assert_eq!(fs::read_dir(&public).unwrap().count(), 0);
    fs::write(public.join("new.txt"), "ok").unwrap();
    assert!(public.join("new.txt").is_file());
}

#[test]
fn test_rebuild_is_byte_identical() {
    let (temp, ctx) = create_test_project();
    populate_site(temp.path());
    let pipeline = Pipeline::new(ctx);

    assert!(pipeline.build().is_success());
    let first = snapshot(&temp.path().join("public"));
    assert!(pipeline.build().is_success());
    let second = snapshot(&temp.path().join("public"));

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_no_stale_outputs_after_rebuild() {
    let (temp, ctx) = create_test_project();
    populate_site(temp.path());
    create_test_file(temp.path(), "src/pug/old.pug", "<p>{{ title }}</p>");
    create_test_file(temp.path(), "src/data/old.pug.json", r#"{"title":"Old"}"#);
    let pipeline = Pipeline::new(ctx);

    assert!(pipeline.build().is_success());
    assert!(temp.path().join("public/old.html").is_file());

    fs::remove_file(temp.path().join("src/pug/old.pug")).unwrap();
    assert!(pipeline.build().is_success());

    assert!(!temp.path().join("public/old.html").exists());
    assert!(temp.path().join("public/index.html").is_file());
}

#[test]
fn test_cyclic_graph_rejected() {
    let result = TaskGraph::new(vec![
        Task::new(TaskId::Clean),
        Task::new(TaskId::Styles).after(TaskId::Clean).after(TaskId::Scripts),
        Task::new(TaskId::Scripts).after(TaskId::Styles),
    ]);

    assert!(matches!(result, Err(GraphError::CyclicDependency(_))));
}

// ============================================================================
// Watch Integration Tests
// ============================================================================

#[test]
fn test_style_change_triggers_only_styles() {
    let (temp, ctx) = create_test_project();
    populate_site(temp.path());
    let pipeline = Pipeline::new(ctx);
    assert!(pipeline.build().is_success());

    let main = create_test_file(temp.path(), "src/sass/main.scss", "main { margin: 0; }\n");
    fs::remove_file(temp.path().join("public/index.html")).unwrap();
    fs::remove_file(temp.path().join("public/js/app.min.js")).unwrap();

    let coordinator =
        WatchCoordinator::from_layout(pipeline.context().layout(), &WatchConfig::default());
    assert_eq!(coordinator.tasks_for(&[main.clone()]), vec![TaskId::Styles]);

    let mut source = MemorySource::new(vec![ChangeBatch::new([main])]);
    let stats = coordinator.run(&mut source, &pipeline).unwrap();

    assert_eq!(stats.dispatched, 1);
    let css = fs::read_to_string(temp.path().join("public/css/style.css")).unwrap();
    assert!(css.contains("main"));
    // Neither markup nor scripts reran
    assert!(!temp.path().join("public/index.html").exists());
    assert!(!temp.path().join("public/js/app.min.js").exists());
}

#[test]
fn test_watch_self_corrects_after_fix() {
    let (temp, ctx) = create_test_project();
    create_test_file(temp.path(), "src/pug/index.pug", "<h1>{{ title }}</h1>");
    let data = create_test_file(temp.path(), "src/data/index.pug.json", "{ broken");
    let pipeline = Pipeline::new(ctx);
    assert!(!pipeline.build().is_success());

    create_test_file(temp.path(), "src/data/index.pug.json", r#"{"title":"Fixed"}"#);
    let coordinator =
        WatchCoordinator::from_layout(pipeline.context().layout(), &WatchConfig::default());
    let mut source = MemorySource::new(vec![ChangeBatch::new([data])]);
    coordinator.run(&mut source, &pipeline).unwrap();

    let html = fs::read_to_string(temp.path().join("public/index.html")).unwrap();
    assert!(html.contains("Fixed"));
}

// ============================================================================
// Progress Reporting Tests
// ============================================================================

#[test]
fn test_console_progress_reports_notices_and_errors() {
    let (temp, ctx) = create_test_project();
    populate_site(temp.path());
    create_test_file(temp.path(), "src/pug/broken.pug", "<p>{{ title }}</p>");
    create_test_file(temp.path(), "src/data/broken.pug.json", "[");

    let output = Arc::new(Mutex::new(Vec::new()));
    let progress = ConsoleProgress::with_output(TestWriter(output.clone()));
    let result = Pipeline::new(ctx).with_progress(Arc::new(progress)).build();

    assert!(!result.is_success());
    let text = String::from_utf8(output.lock().unwrap().clone()).unwrap();
    assert!(text.contains("Styles compiled"));
    assert!(text.contains("Assets copied"));
    assert!(text.contains("broken.pug.json"));
    assert!(!text.contains("HTML rendered"));
    assert!(text.contains("Build failed"));
}
