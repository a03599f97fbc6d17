//! Static asset copy.

use super::{Stage, StageError, StageInputs, StageOutput};
use crate::build::TaskId;
use crate::layout::{AssetClass, OutputTree};
use std::path::PathBuf;

/// Copies static files verbatim into the static output dir.
#[derive(Debug, Clone, Default)]
pub struct AssetStage;

impl AssetStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for AssetStage {
    fn task(&self) -> TaskId {
        TaskId::Assets
    }

    fn inputs(&self) -> &[AssetClass] {
        &[AssetClass::Static]
    }

    fn output_dir(&self, output: &OutputTree) -> PathBuf {
        output.statics.clone()
    }

    fn transform(&self, inputs: &StageInputs) -> Result<StageOutput, StageError> {
        Ok(StageOutput {
            files: inputs.files(AssetClass::Static).to_vec(),
            ..StageOutput::default()
        })
    }

    fn notice(&self) -> &'static str {
        "Assets copied"
    }
}
