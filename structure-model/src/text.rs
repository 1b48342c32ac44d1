//! Text feature encoder: pools per-token hidden states from a pretrained
//! sequence model into one fixed-length vector.

use std::sync::Arc;

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{ModelError, ModelResult};
use crate::fusion::{FeatureVector, Provenance};
use crate::weights::uniform_init;

/// Native hidden size Dt of the default text model.
pub const TEXT_FEATURES: usize = 768;

/// Token-level encoding collaborator.
///
/// Implementations return one hidden-state row per token, `[S, hidden]`
/// with S >= 1; degenerate input (no tokens) maps to a single zero row.
pub trait SequenceModel: Send + Sync {
    fn hidden_size(&self) -> usize;
    fn hidden_states(&self, text: &str) -> ModelResult<Tensor>;
}

/// Thin wrapper that averages a sequence model's hidden states across the
/// sequence dimension into a text-origin feature vector.
pub struct TextEncoder {
    model: Arc<dyn SequenceModel>,
}

impl std::fmt::Debug for TextEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextEncoder")
            .field("hidden_size", &self.model.hidden_size())
            .finish()
    }
}

impl TextEncoder {
    pub fn new(model: Arc<dyn SequenceModel>) -> Self {
        Self { model }
    }

    pub fn hidden_size(&self) -> usize {
        self.model.hidden_size()
    }

    /// Encode text into a vector of the model's hidden size. Empty or very
    /// short text yields a defined (zero) vector of the same length.
    pub fn encode(&self, text: &str) -> ModelResult<FeatureVector> {
        let hidden = self.model.hidden_size();
        let states = self.model.hidden_states(text)?;
        let (seq_len, state_width) = states.dims2()?;
        if state_width != hidden {
            return Err(ModelError::shape(
                "text encoder",
                format!("hidden size {hidden}"),
                format!("hidden size {state_width}"),
            ));
        }
        if seq_len == 0 {
            return Ok(FeatureVector::new(Provenance::Text, vec![0.0; hidden]));
        }
        let pooled = states.mean(0)?;
        Ok(FeatureVector::new(Provenance::Text, pooled.to_vec1()?))
    }
}

/// Seeded byte-embedding sequence model.
///
/// Stands in for untrained language-model weights in the init-then-serve
/// mode: each input byte indexes a fixed embedding table, so hidden states
/// depend only on the text and the seed.
pub struct ByteSequenceModel {
    table: Tensor,
    hidden: usize,
}

impl ByteSequenceModel {
    pub fn seeded(hidden: usize, seed: u64, device: &Device) -> ModelResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let table = Tensor::from_vec(
            uniform_init(&mut rng, hidden, 256 * hidden),
            (256, hidden),
            device,
        )?;
        Ok(Self { table, hidden })
    }
}

impl SequenceModel for ByteSequenceModel {
    fn hidden_size(&self) -> usize {
        self.hidden
    }

    fn hidden_states(&self, text: &str) -> ModelResult<Tensor> {
        let bytes = text.as_bytes();
        if bytes.is_empty() {
            return Ok(Tensor::zeros(
                (1, self.hidden),
                candle_core::DType::F32,
                self.table.device(),
            )?);
        }
        let ids: Vec<u32> = bytes.iter().map(|&b| b as u32).collect();
        let ids = Tensor::from_vec(ids, bytes.len(), self.table.device())?;
        Ok(self.table.index_select(&ids, 0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstantModel {
        hidden: usize,
    }

    impl SequenceModel for ConstantModel {
        fn hidden_size(&self) -> usize {
            self.hidden
        }

        fn hidden_states(&self, text: &str) -> ModelResult<Tensor> {
            let rows = text.split_whitespace().count().max(1);
            let values: Vec<f32> = (0..rows)
                .flat_map(|row| (0..self.hidden).map(move |_| row as f32))
                .collect();
            Ok(Tensor::from_vec(
                values,
                (rows, self.hidden),
                &Device::Cpu,
            )?)
        }
    }

    #[test]
    fn pools_by_averaging_over_tokens() {
        let encoder = TextEncoder::new(Arc::new(ConstantModel { hidden: 4 }));
        // Rows 0, 1, 2 average to 1.0 in every column.
        let features = encoder.encode("three token text").unwrap();
        assert_eq!(features.provenance(), Provenance::Text);
        assert_eq!(features.values(), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn empty_text_yields_defined_vector() {
        let model = ByteSequenceModel::seeded(16, 3, &Device::Cpu).unwrap();
        let encoder = TextEncoder::new(Arc::new(model));
        let features = encoder.encode("").unwrap();
        assert_eq!(features.len(), 16);
        assert!(features.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn byte_model_is_deterministic() {
        let a = ByteSequenceModel::seeded(16, 3, &Device::Cpu).unwrap();
        let b = ByteSequenceModel::seeded(16, 3, &Device::Cpu).unwrap();
        let ea = TextEncoder::new(Arc::new(a)).encode("a small house").unwrap();
        let eb = TextEncoder::new(Arc::new(b)).encode("a small house").unwrap();
        assert_eq!(ea.values(), eb.values());
    }

    #[test]
    fn different_text_changes_features() {
        let model = ByteSequenceModel::seeded(16, 3, &Device::Cpu).unwrap();
        let encoder = TextEncoder::new(Arc::new(model));
        let a = encoder.encode("a tall tower").unwrap();
        let b = encoder.encode("a wide bungalow").unwrap();
        assert_ne!(a.values(), b.values());
    }
}
