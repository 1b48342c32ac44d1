//! Process-wide model ownership: every model is constructed once at
//! startup, then shared read-only across requests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::Device;

use crate::decoder::StructureDecoder;
use crate::error::{ModelError, ModelResult};
use crate::pretrained::PretrainedEncoder;
use crate::text::{ByteSequenceModel, SequenceModel, TextEncoder, TEXT_FEATURES};
use crate::volumetric::{VolumetricEncoder, VOLUME_RESOLUTION};

/// Construction parameters for [`ModelContext`].
///
/// `weights_dir` selects load-then-serve (safetensors checkpoints must be
/// present); with no directory the models fall back to deterministic
/// seeded initialization. `text_model_dir` points at a pretrained
/// tokenizer/weights directory; without one a seeded byte-embedding model
/// stands in.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub grid_resolution: usize,
    pub seed: u64,
    pub weights_dir: Option<PathBuf>,
    pub text_model_dir: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            grid_resolution: VOLUME_RESOLUTION,
            seed: 42,
            weights_dir: None,
            text_model_dir: None,
        }
    }
}

/// Immutable owner of the three models.
///
/// No request path mutates anything in here; concurrent inference against a
/// shared `Arc<ModelContext>` needs no locking. A future fine-tuning path
/// would have to serialize against in-flight inference instead of mutating
/// through this type.
#[derive(Debug)]
pub struct ModelContext {
    pub volumetric: VolumetricEncoder,
    pub text: TextEncoder,
    pub decoder: StructureDecoder,
}

impl ModelContext {
    pub fn new(config: &ModelConfig) -> ModelResult<Self> {
        let device = Device::Cpu;

        let text_model: Arc<dyn SequenceModel> = match &config.text_model_dir {
            Some(dir) => Arc::new(PretrainedEncoder::load(dir, &device)?),
            None => Arc::new(ByteSequenceModel::seeded(
                TEXT_FEATURES,
                config.seed,
                &device,
            )?),
        };
        let text = TextEncoder::new(text_model);

        let volumetric = match &config.weights_dir {
            Some(dir) => VolumetricEncoder::from_checkpoint(
                &required(dir, "volumetric.safetensors")?,
                config.grid_resolution,
                &device,
            )?,
            None => VolumetricEncoder::seeded(config.grid_resolution, config.seed, &device)?,
        };

        // The decoder's expected input width is fixed here, once, from the
        // declared encoder output sizes.
        let joint_width = volumetric.output_len() + text.hidden_size();
        let decoder = match &config.weights_dir {
            Some(dir) => StructureDecoder::from_checkpoint(
                &required(dir, "decoder.safetensors")?,
                joint_width,
                &device,
            )?,
            None => StructureDecoder::seeded(joint_width, config.seed, &device)?,
        };

        Ok(Self {
            volumetric,
            text,
            decoder,
        })
    }

    pub fn joint_width(&self) -> usize {
        self.decoder.joint_width()
    }
}

fn required(dir: &Path, file: &str) -> ModelResult<PathBuf> {
    let path = dir.join(file);
    if !path.exists() {
        return Err(ModelError::Load(format!(
            "checkpoint {} not found in {}",
            file,
            dir.display()
        )));
    }
    Ok(path)
}
