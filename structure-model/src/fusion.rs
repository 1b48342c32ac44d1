use candle_core::{Device, Tensor};

use crate::error::{ModelError, ModelResult};

/// Which encoder produced a feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Volume,
    Text,
}

/// Fixed-length feature vector tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    provenance: Provenance,
    values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(provenance: Provenance, values: Vec<f32>) -> Self {
        Self { provenance, values }
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Concatenation of a volume vector and a text vector, volume first.
///
/// The ordering is part of the contract with the decoder: a joint vector
/// assembled in the other order decodes to garbage without any runtime
/// signal, so construction is only possible through [`fuse`].
#[derive(Debug, Clone, PartialEq)]
pub struct JointVector {
    values: Vec<f32>,
}

impl JointVector {
    pub fn width(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// View as a `[1, width]` row tensor.
    pub fn to_tensor(&self, device: &Device) -> ModelResult<Tensor> {
        Ok(Tensor::from_slice(
            &self.values,
            (1, self.values.len()),
            device,
        )?)
    }
}

/// Concatenate encoder outputs into one joint representation.
///
/// Both inputs must carry a declared, non-zero length, and the volume
/// vector always comes first.
pub fn fuse(volume: &FeatureVector, text: &FeatureVector) -> ModelResult<JointVector> {
    if volume.provenance() != Provenance::Volume {
        return Err(ModelError::FusionOrder(
            "first argument must be the volume-origin vector",
        ));
    }
    if text.provenance() != Provenance::Text {
        return Err(ModelError::FusionOrder(
            "second argument must be the text-origin vector",
        ));
    }
    if volume.is_empty() || text.is_empty() {
        return Err(ModelError::shape(
            "fusion",
            "two non-empty feature vectors",
            format!("volume len {}, text len {}", volume.len(), text.len()),
        ));
    }

    let mut values = Vec::with_capacity(volume.len() + text.len());
    values.extend_from_slice(volume.values());
    values.extend_from_slice(text.values());
    Ok(JointVector { values })
}
