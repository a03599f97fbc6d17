//! Script bundling: vendor scripts then sources, lowered and minified into one file.

use super::{Stage, StageError, StageInputs, StageOutput, VirtualFile};
use crate::build::{FileDiagnostic, TaskId};
use crate::config::{ScriptsConfig, DEFAULT_SCRIPT_TARGET};
use crate::layout::{AssetClass, OutputTree};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc_compat::EngineTargets;
use oxc_mangler::MangleOptions;
use oxc_minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{HelperLoaderMode, TransformOptions, Transformer};
use parcel_sourcemap::{OriginalLocation, SourceMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Turns one script into the text that goes into the bundle.
pub trait ScriptCompiler: Send + Sync {
    fn compile(&self, path: &Path, source: &str) -> Result<String, FileDiagnostic>;
}

/// Down-levels syntax to a target with oxc, then compresses and mangles.
///
/// Sources are classic scripts that share one global scope once bundled, so
/// top-level names are neither renamed nor dropped.
#[derive(Debug, Clone)]
pub struct MinifyCompiler {
    target: String,
}

impl Default for MinifyCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT_TARGET)
    }
}

impl MinifyCompiler {
    /// `target` is an oxc target list such as `es2015` or `es2017,chrome58`.
    pub fn new(target: impl Into<String>) -> Self {
        Self { target: target.into() }
    }
}

impl ScriptCompiler for MinifyCompiler {
    fn compile(&self, path: &Path, source: &str) -> Result<String, FileDiagnostic> {
        let invalid_target =
            |e: String| FileDiagnostic::new(path, format!("scripts.target: {e}"));
        let mut transform = TransformOptions::from_target(&self.target).map_err(invalid_target)?;
        // Helpers resolve against a global `babelHelpers` rather than an import
        transform.helper_loader.mode = HelperLoaderMode::External;
        let engines = EngineTargets::from_target(&self.target).map_err(invalid_target)?;

        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, SourceType::cjs()).parse();
        if let Some(error) = parsed.errors.first() {
            return Err(FileDiagnostic::new(path, error.to_string()));
        }
        let mut program = parsed.program;

        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
        let lowered =
            Transformer::new(&allocator, path, &transform).build_with_scoping(scoping, &mut program);
        if let Some(error) = lowered.errors.first() {
            return Err(FileDiagnostic::new(path, error.to_string()));
        }

        let options = MinifierOptions {
            mangle: Some(MangleOptions { top_level: false, ..MangleOptions::default() }),
            compress: Some(CompressOptions { target: engines, ..CompressOptions::smallest() }),
        };
        let minified = Minifier::new(options).minify(&allocator, &mut program);

        let codegen_options = CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        };
        let generated = Codegen::new()
            .with_options(codegen_options)
            .with_scoping(minified.scoping)
            .build(&program);

        Ok(generated.code)
    }
}

/// Bundles every script into `js/<bundle>.min.js` with a line-level source map.
#[derive(Clone)]
pub struct ScriptStage {
    bundle: String,
    vendor: Vec<PathBuf>,
    compiler: Arc<dyn ScriptCompiler>,
}

impl std::fmt::Debug for ScriptStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptStage")
            .field("bundle", &self.bundle)
            .field("vendor", &self.vendor)
            .finish()
    }
}

impl ScriptStage {
    pub fn new(config: &ScriptsConfig) -> Self {
        Self {
            bundle: config.bundle.clone(),
            vendor: config.vendor.clone(),
            compiler: Arc::new(MinifyCompiler::new(config.target.clone())),
        }
    }

    /// Replace the compiler used for every chunk.
    pub fn with_compiler(mut self, compiler: impl ScriptCompiler + 'static) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }
}

impl Stage for ScriptStage {
    fn task(&self) -> TaskId {
        TaskId::Scripts
    }

    fn inputs(&self) -> &[AssetClass] {
        &[AssetClass::Scripts]
    }

    fn vendor_files(&self) -> &[PathBuf] {
        &self.vendor
    }

    fn output_dir(&self, output: &OutputTree) -> PathBuf {
        output.js.clone()
    }

    fn transform(&self, inputs: &StageInputs) -> Result<StageOutput, StageError> {
        let chunks: Vec<&VirtualFile> =
            inputs.vendor.iter().chain(inputs.files(AssetClass::Scripts)).collect();
        if chunks.is_empty() {
            return Ok(StageOutput::default());
        }

        let mut bundle = String::new();
        let mut map = SourceMap::new("/");
        let mut line: u32 = 0;

        for chunk in chunks {
            let source = chunk.text()?;
            let mut code = self.compiler.compile(&chunk.path, source).map_err(StageError::Compile)?;
            let trimmed_len = code.trim_end().len();
            code.truncate(trimmed_len);
            if !code.is_empty() && !code.ends_with(';') {
                code.push(';');
            }

            let name = chunk.path.to_string_lossy().replace('\\', "/");
            let index = map.add_source(&name);
            map.set_source_content(index as usize, source)
                .map_err(|e| StageError::Sourcemap(format!("{e:?}")))?;

            // Every generated line points at the top of its source file
            for _ in code.lines() {
                map.add_mapping(line, 0, Some(OriginalLocation::new(0, 0, index, None)));
                line += 1;
            }
            if code.is_empty() {
                line += 1;
            }
            bundle.push_str(&code);
            bundle.push('\n');
        }

        let min_name = format!("{}.min.js", self.bundle);
        bundle.push_str(&format!("//# sourceMappingURL={min_name}.map\n"));
        let json = map.to_json(None).map_err(|e| StageError::Sourcemap(format!("{e:?}")))?;

        Ok(StageOutput {
            files: vec![
                VirtualFile::new(format!("{min_name}.map"), json),
                VirtualFile::new(min_name, bundle),
            ],
            ..StageOutput::default()
        })
    }

    fn notice(&self) -> &'static str {
        "Scripts bundled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> ScriptStage {
        ScriptStage::new(&ScriptsConfig::default())
    }

    fn inputs(files: &[(&str, &str)]) -> StageInputs {
        files.iter().fold(StageInputs::new(), |inputs, (path, src)| {
            inputs.with(AssetClass::Scripts, VirtualFile::new(*path, *src))
        })
    }

    fn text<'a>(out: &'a StageOutput, name: &str) -> &'a str {
        let file = out.files.iter().find(|f| f.path == Path::new(name)).unwrap();
        std::str::from_utf8(&file.contents).unwrap()
    }

    /// Passes source through untouched so bundle layout is easy to assert on.
    struct Identity;

    impl ScriptCompiler for Identity {
        fn compile(&self, _path: &Path, source: &str) -> Result<String, FileDiagnostic> {
            Ok(source.to_string())
        }
    }

    #[test]
    fn test_bundles_vendor_then_sources() {
        let mut inputs = inputs(&[("a.js", "a()"), ("b.js", "b();")]);
        inputs.vendor.push(VirtualFile::new("vendor/lib.js", "lib()"));

        let out = stage().with_compiler(Identity).transform(&inputs).unwrap();

        assert_eq!(
            text(&out, "app.min.js"),
            "lib();\na();\nb();\n//# sourceMappingURL=app.min.js.map\n"
        );
    }

    #[test]
    fn test_source_map_lists_every_chunk() {
        let out = stage()
            .with_compiler(Identity)
            .transform(&inputs(&[("a.js", "a()"), ("lib/b.js", "b()")]))
            .unwrap();

        let map: serde_json::Value = serde_json::from_str(text(&out, "app.min.js.map")).unwrap();
        let sources: Vec<&str> =
            map["sources"].as_array().unwrap().iter().map(|s| s.as_str().unwrap()).collect();
        assert_eq!(sources, vec!["a.js", "lib/b.js"]);
    }

    #[test]
    fn test_minifies_sources() {
        let out = stage()
            .transform(&inputs(&[(
                "main.js",
                "// greeting\nfunction greet(name) {\n  var message = 'hi ' + name;\n  return message;\n}\nwindow.greet = greet;\n",
            )]))
            .unwrap();

        let js = text(&out, "app.min.js");
        assert!(!js.contains("// greeting"));
        assert!(js.len() < 120);
    }

    #[test]
    fn test_top_level_names_shared_across_files() {
        let out = stage()
            .transform(&inputs(&[
                ("a.js", "function helper(x) { return x + 1; }\nvar counter = 0;\n"),
                ("b.js", "console.log(helper(counter));\n"),
            ]))
            .unwrap();

        let js = text(&out, "app.min.js");
        assert!(js.contains("function helper("), "helper dropped or renamed: {js}");
        assert!(js.contains("counter"), "counter dropped or renamed: {js}");
        assert!(js.contains("helper(counter)"));
    }

    #[test]
    fn test_lowers_syntax_to_target() {
        let source = "window.square = function (x) { return x ** 2; };\n";

        let lowered = MinifyCompiler::default().compile(Path::new("sq.js"), source).unwrap();
        assert!(lowered.contains("Math.pow"), "not lowered: {lowered}");
        assert!(!lowered.contains("**"));

        let modern = MinifyCompiler::new("esnext").compile(Path::new("sq.js"), source).unwrap();
        assert!(modern.contains("**"), "lowered for esnext: {modern}");
    }

    #[test]
    fn test_configured_target_reaches_compiler() {
        let config = ScriptsConfig { target: "es2016".to_string(), ..ScriptsConfig::default() };
        let out = ScriptStage::new(&config)
            .transform(&inputs(&[("sq.js", "window.square = (x) => x ** 2;\n")]))
            .unwrap();

        assert!(text(&out, "app.min.js").contains("**"));
    }

    #[test]
    fn test_unknown_target_is_reported() {
        let err = MinifyCompiler::new("netscape4").compile(Path::new("a.js"), "a();").unwrap_err();
        assert!(err.message.contains("scripts.target"));
    }

    #[test]
    fn test_syntax_error_aborts_stage() {
        let err = stage().transform(&inputs(&[("ok.js", "a();"), ("bad.js", "function (")]));
        match err {
            Err(StageError::Compile(d)) => assert_eq!(d.file, PathBuf::from("bad.js")),
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_no_scripts_no_bundle() {
        let out = stage().transform(&StageInputs::new()).unwrap();
        assert!(out.files.is_empty());
    }

    #[test]
    fn test_custom_bundle_name() {
        let config = ScriptsConfig { bundle: "site".to_string(), ..ScriptsConfig::default() };
        let out = ScriptStage::new(&config)
            .with_compiler(Identity)
            .transform(&inputs(&[("a.js", "a();")]))
            .unwrap();

        assert!(text(&out, "site.min.js").ends_with("//# sourceMappingURL=site.min.js.map\n"));
    }
}
