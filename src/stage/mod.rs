//! Transform stages.
//!
//! Every stage is a pure [`Stage::transform`] from in-memory input files to
//! in-memory output files, plus a shared runner ([`run_stage`]) that does the
//! reading and writing. Unit tests drive `transform` directly; the pipeline
//! drives `run_stage`.

pub mod assets;
pub mod image;
pub mod markup;
pub mod script;
pub mod style;

pub use assets::AssetStage;
pub use image::ImageStage;
pub use markup::MarkupStage;
pub use script::{MinifyCompiler, ScriptCompiler, ScriptStage};
pub use style::StyleStage;

use crate::build::{discover, BuildContext, DiscoveryError, FileDiagnostic, TaskId, TaskResult};
use crate::config::SiteConfig;
use crate::layout::{AssetClass, OutputTree};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// An in-memory file, addressed relative to the root of its tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl VirtualFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self { path: path.into(), contents: contents.into() }
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> Result<&str, StageError> {
        std::str::from_utf8(&self.contents).map_err(|e| {
            StageError::Compile(FileDiagnostic::new(&self.path, format!("not valid UTF-8: {e}")))
        })
    }
}

/// Inputs handed to a stage, grouped by asset class.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    files: BTreeMap<AssetClass, Vec<VirtualFile>>,
    /// Vendor files, in configured order
    pub vendor: Vec<VirtualFile>,
}

impl StageInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests.
    pub fn with(mut self, class: AssetClass, file: VirtualFile) -> Self {
        self.add(class, file);
        self
    }

    pub fn add(&mut self, class: AssetClass, file: VirtualFile) {
        self.files.entry(class).or_default().push(file);
    }

    /// Files of one class; empty when none were discovered.
    pub fn files(&self, class: AssetClass) -> &[VirtualFile] {
        self.files.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// What a stage produced.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    /// Files to write, relative to the stage's output directory
    pub files: Vec<VirtualFile>,
    /// Per-file failures; the other files were still produced
    pub diagnostics: Vec<FileDiagnostic>,
    pub warnings: Vec<String>,
}

/// Error that aborts a whole stage run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to access '{}': {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("{0}")]
    Compile(FileDiagnostic),
    #[error("failed to generate source map: {0}")]
    Sourcemap(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// One transform stage of the site build.
pub trait Stage: Send + Sync {
    /// Task this stage implements.
    fn task(&self) -> TaskId;

    /// Asset classes read before `transform`.
    fn inputs(&self) -> &[AssetClass];

    /// Extra files, relative to the project root, read into [`StageInputs::vendor`].
    fn vendor_files(&self) -> &[PathBuf] {
        &[]
    }

    /// Directory the output files are written under.
    fn output_dir(&self, output: &OutputTree) -> PathBuf;

    fn transform(&self, inputs: &StageInputs) -> Result<StageOutput, StageError>;

    /// Message shown when the stage finished cleanly.
    fn notice(&self) -> &'static str;
}

/// The five stages of a site build, configured from `config`.
pub fn standard_stages(config: &SiteConfig) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(StyleStage::new(&config.styles)),
        Box::new(MarkupStage::new(&config.markup)),
        Box::new(ScriptStage::new(&config.scripts)),
        Box::new(ImageStage::new(&config.images)),
        Box::new(AssetStage::new()),
    ]
}

/// Read a stage's inputs, transform them and write the results.
pub fn run_stage(stage: &dyn Stage, context: &BuildContext) -> TaskResult {
    let start = Instant::now();
    let task = stage.task();

    let outcome = read_inputs(stage, context).and_then(|inputs| stage.transform(&inputs));
    let output = match outcome {
        Ok(output) => output,
        Err(StageError::Compile(diagnostic)) => {
            return TaskResult::failed(task, diagnostic.to_string(), start.elapsed())
                .with_diagnostics(vec![diagnostic]);
        }
        Err(e) => return TaskResult::failed(task, e.to_string(), start.elapsed()),
    };

    let out_dir = stage.output_dir(&context.layout().output);
    match write_outputs(&out_dir, &output.files) {
        Ok(written) => TaskResult::success(task, written, start.elapsed())
            .with_warnings(output.warnings)
            .with_diagnostics(output.diagnostics),
        Err(e) => TaskResult::failed(task, e.to_string(), start.elapsed()),
    }
}

/// Discover and load every input a stage asks for.
pub fn read_inputs(stage: &dyn Stage, context: &BuildContext) -> Result<StageInputs, StageError> {
    let mut inputs = StageInputs::new();

    for &class in stage.inputs() {
        let spec = context.layout().glob(class);
        for path in discover(spec)? {
            let contents = read_file(&path)?;
            let relative = path.strip_prefix(spec.base()).unwrap_or(&path).to_path_buf();
            inputs.add(class, VirtualFile::new(relative, contents));
        }
    }

    for vendor in stage.vendor_files() {
        let contents = read_file(&context.resolve_path(vendor))?;
        inputs.vendor.push(VirtualFile::new(vendor.clone(), contents));
    }

    Ok(inputs)
}

/// Write files under `out_dir`, creating parent directories as needed.
pub fn write_outputs(out_dir: &Path, files: &[VirtualFile]) -> Result<Vec<PathBuf>, StageError> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = out_dir.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| StageError::Io { path: parent.to_path_buf(), source })?;
        }
        fs::write(&path, &file.contents)
            .map_err(|source| StageError::Io { path: path.clone(), source })?;
        written.push(path);
    }
    Ok(written)
}

fn read_file(path: &Path) -> Result<Vec<u8>, StageError> {
    fs::read(path).map_err(|source| StageError::Io { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildStatus;
    use tempfile::TempDir;

    struct UpperStage;

    impl Stage for UpperStage {
        fn task(&self) -> TaskId {
            TaskId::Scripts
        }

        fn inputs(&self) -> &[AssetClass] {
            &[AssetClass::Scripts]
        }

        fn output_dir(&self, output: &OutputTree) -> PathBuf {
            output.js.clone()
        }

        fn transform(&self, inputs: &StageInputs) -> Result<StageOutput, StageError> {
            let mut output = StageOutput::default();
            for file in inputs.files(AssetClass::Scripts) {
                if file.contents.starts_with(b"bad") {
                    output.diagnostics.push(FileDiagnostic::new(&file.path, "bad input"));
                    continue;
                }
                output.files.push(VirtualFile::new(
                    &file.path,
                    file.text()?.to_uppercase().into_bytes(),
                ));
            }
            Ok(output)
        }

        fn notice(&self) -> &'static str {
            "Upper"
        }
    }

    fn context(temp: &TempDir) -> BuildContext {
        BuildContext::new(SiteConfig::default(), temp.path().to_path_buf()).unwrap()
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_stage_inputs_grouping() {
        let inputs = StageInputs::new()
            .with(AssetClass::Styles, VirtualFile::new("a.scss", "a"))
            .with(AssetClass::Styles, VirtualFile::new("b.scss", "b"));
        assert_eq!(inputs.files(AssetClass::Styles).len(), 2);
        assert!(inputs.files(AssetClass::Markup).is_empty());
    }

    #[test]
    fn test_virtual_file_text_rejects_invalid_utf8() {
        let file = VirtualFile::new("bin.js", vec![0xff, 0xfe]);
        assert!(matches!(file.text(), Err(StageError::Compile(_))));
    }

    #[test]
    fn test_run_stage_reads_relative_and_writes() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/js/lib/a.js", "abc");
        let ctx = context(&temp);

        let result = run_stage(&UpperStage, &ctx);

        assert!(result.is_success());
        let out = temp.path().join("public/js/lib/a.js");
        assert_eq!(result.outputs, vec![out.clone()]);
        assert_eq!(fs::read_to_string(out).unwrap(), "ABC");
    }

    #[test]
    fn test_run_stage_diagnostics_fail_task_but_keep_outputs() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/js/good.js", "ok");
        write(temp.path(), "src/js/worse.js", "bad");
        let ctx = context(&temp);

        let result = run_stage(&UpperStage, &ctx);

        assert!(matches!(result.status, BuildStatus::Failed(_)));
        assert_eq!(result.diagnostics.len(), 1);
        assert!(temp.path().join("public/js/good.js").exists());
    }

    #[test]
    fn test_run_stage_compile_error_attaches_diagnostic() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/js")).unwrap();
        fs::write(temp.path().join("src/js/bin.js"), [0xff, 0xfe]).unwrap();
        let ctx = context(&temp);

        let result = run_stage(&UpperStage, &ctx);

        assert!(!result.is_success());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].file, PathBuf::from("bin.js"));
    }

    #[test]
    fn test_standard_stages_cover_every_build_task() {
        let stages = standard_stages(&SiteConfig::default());
        let tasks: Vec<TaskId> = stages.iter().map(|s| s.task()).collect();
        assert_eq!(tasks, TaskId::STAGES.to_vec());
    }
}
