//! Image optimization per format.
//!
//! PNG is recompressed losslessly with oxipng, JPEG is re-encoded at the
//! configured quality and SVG loses comments, metadata and whitespace between
//! tags. Everything else passes through. A result that is not smaller than
//! the input is thrown away in favour of the original bytes.

use super::{Stage, StageError, StageInputs, StageOutput, VirtualFile};
use crate::build::TaskId;
use crate::config::ImagesConfig;
use crate::layout::{AssetClass, OutputTree};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageFormat};
use rayon::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Formats with a dedicated optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Png,
    Jpeg,
    Svg,
    Other,
}

impl Kind {
    fn of(path: &Path) -> Self {
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("png") => Kind::Png,
            Some("jpg") | Some("jpeg") => Kind::Jpeg,
            Some("svg") => Kind::Svg,
            _ => Kind::Other,
        }
    }
}

/// Compresses every file of the images directory into the images output dir.
#[derive(Debug, Clone)]
pub struct ImageStage {
    png_level: u8,
    jpeg_quality: u8,
}

impl ImageStage {
    pub fn new(config: &ImagesConfig) -> Self {
        Self { png_level: config.png_level, jpeg_quality: config.jpeg_quality }
    }

    /// Optimize one file; a decode failure yields the original plus a warning.
    fn optimize(&self, file: &VirtualFile) -> (VirtualFile, Option<String>) {
        let optimized = match Kind::of(&file.path) {
            Kind::Png => self.png(&file.contents),
            Kind::Jpeg => self.jpeg(&file.contents),
            Kind::Svg => svg(&file.contents),
            Kind::Other => return (file.clone(), None),
        };

        match optimized {
            Ok(bytes) if bytes.len() < file.contents.len() => {
                (VirtualFile::new(&file.path, bytes), None)
            }
            Ok(_) => (file.clone(), None),
            Err(reason) => (
                file.clone(),
                Some(format!("{}: {reason}; copied unchanged", file.path.display())),
            ),
        }
    }

    fn png(&self, bytes: &[u8]) -> Result<Vec<u8>, String> {
        let options = oxipng::Options::from_preset(self.png_level);
        oxipng::optimize_from_memory(bytes, &options).map_err(|e| e.to_string())
    }

    fn jpeg(&self, bytes: &[u8]) -> Result<Vec<u8>, String> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .map_err(|e| e.to_string())?;
        let rgb = decoded.to_rgb8();

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.jpeg_quality)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            .map_err(|e| e.to_string())?;
        Ok(out)
    }
}

/// Strip comments, `<metadata>` and whitespace between tags.
fn svg(bytes: &[u8]) -> Result<Vec<u8>, String> {
    static PATTERNS: OnceLock<Option<[Regex; 3]>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        Some([
            Regex::new(r"(?s)<!--.*?-->").ok()?,
            Regex::new(r"(?s)<metadata\b.*?</metadata>").ok()?,
            Regex::new(r">\s+<").ok()?,
        ])
    });
    let Some([comments, metadata, between]) = patterns else {
        return Err("svg patterns failed to compile".to_string());
    };

    let text = std::str::from_utf8(bytes).map_err(|e| format!("not valid UTF-8: {e}"))?;
    let text = comments.replace_all(text, "");
    let text = metadata.replace_all(&text, "");
    let text = between.replace_all(&text, "><");
    Ok(text.trim().as_bytes().to_vec())
}

impl Stage for ImageStage {
    fn task(&self) -> TaskId {
        TaskId::Images
    }

    fn inputs(&self) -> &[AssetClass] {
        &[AssetClass::Images]
    }

    fn output_dir(&self, output: &OutputTree) -> PathBuf {
        output.images.clone()
    }

    fn transform(&self, inputs: &StageInputs) -> Result<StageOutput, StageError> {
        let results: Vec<(VirtualFile, Option<String>)> =
            inputs.files(AssetClass::Images).par_iter().map(|f| self.optimize(f)).collect();

        let mut output = StageOutput::default();
        for (file, warning) in results {
            output.files.push(file);
            output.warnings.extend(warning);
        }
        Ok(output)
    }

    fn notice(&self) -> &'static str {
        "Images compressed"
    }
}
