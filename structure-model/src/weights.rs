//! Weight storage shared by the volumetric encoder and the structure
//! decoder: seeded initialization for the init-then-serve mode and
//! safetensors checkpoints for load-then-serve.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{ModelError, ModelResult};

/// Uniform init scaled by fan-in, matching what an untrained checkpoint of
/// the reference models would contain.
pub(crate) fn uniform_init(rng: &mut StdRng, fan_in: usize, n: usize) -> Vec<f32> {
    let bound = (1.0 / fan_in as f32).sqrt();
    (0..n).map(|_| rng.gen_range(-bound..bound)).collect()
}

/// Affine stage `y = x W^T + b` with weight `[out, in]` and bias `[out]`.
#[derive(Debug)]
pub(crate) struct Affine {
    weight: Tensor,
    bias: Tensor,
    in_dim: usize,
    out_dim: usize,
}

impl Affine {
    pub(crate) fn seeded(
        rng: &mut StdRng,
        in_dim: usize,
        out_dim: usize,
        device: &Device,
    ) -> ModelResult<Self> {
        let weight = Tensor::from_vec(
            uniform_init(rng, in_dim, out_dim * in_dim),
            (out_dim, in_dim),
            device,
        )?;
        let bias = Tensor::from_vec(uniform_init(rng, in_dim, out_dim), out_dim, device)?;
        Ok(Self {
            weight,
            bias,
            in_dim,
            out_dim,
        })
    }

    pub(crate) fn from_map(
        map: &TensorMap,
        prefix: &str,
        in_dim: usize,
        out_dim: usize,
    ) -> ModelResult<Self> {
        let weight = map.get(&format!("{prefix}.weight"), &[out_dim, in_dim])?;
        let bias = map.get(&format!("{prefix}.bias"), &[out_dim])?;
        Ok(Self {
            weight,
            bias,
            in_dim,
            out_dim,
        })
    }

    pub(crate) fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub(crate) fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Apply to a `[rows, in]` tensor, producing `[rows, out]`.
    pub(crate) fn apply(&self, x: &Tensor) -> ModelResult<Tensor> {
        Ok(x.matmul(&self.weight.t()?)?.broadcast_add(&self.bias)?)
    }
}

/// Named tensors loaded from one safetensors checkpoint, with shape
/// validation on every lookup.
pub(crate) struct TensorMap {
    tensors: HashMap<String, Tensor>,
    path: String,
}

impl TensorMap {
    pub(crate) fn load(path: &Path, device: &Device) -> ModelResult<Self> {
        let tensors = candle_core::safetensors::load(path, device)
            .map_err(|e| ModelError::Load(format!("{}: {e}", path.display())))?;
        Ok(Self {
            tensors,
            path: path.display().to_string(),
        })
    }

    /// Lookup without a full shape contract, for tensors whose leading
    /// dimension (e.g. vocabulary size) the checkpoint governs.
    pub(crate) fn get_any(&self, name: &str) -> ModelResult<Tensor> {
        self.tensors
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::MissingWeight(format!("{name} in {}", self.path)))
    }

    pub(crate) fn get(&self, name: &str, expected: &[usize]) -> ModelResult<Tensor> {
        let tensor = self
            .tensors
            .get(name)
            .ok_or_else(|| ModelError::MissingWeight(format!("{name} in {}", self.path)))?;
        if tensor.dims() != expected {
            return Err(ModelError::shape(
                "checkpoint tensor",
                format!("{name} with dims {expected:?}"),
                format!("dims {:?}", tensor.dims()),
            ));
        }
        Ok(tensor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn uniform_init_is_seeded_and_bounded() {
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        let va = uniform_init(&mut a, 16, 64);
        let vb = uniform_init(&mut b, 16, 64);
        assert_eq!(va, vb);
        let bound = (1.0f32 / 16.0).sqrt();
        assert!(va.iter().all(|v| v.abs() <= bound));
    }

    #[test]
    fn affine_applies_expected_dims() {
        let mut rng = StdRng::seed_from_u64(3);
        let affine = Affine::seeded(&mut rng, 4, 2, &Device::Cpu).unwrap();
        let x = Tensor::from_vec(vec![1.0f32, 0.0, 0.0, 0.0], (1, 4), &Device::Cpu).unwrap();
        let y = affine.apply(&x).unwrap();
        assert_eq!(y.dims(), &[1, 2]);
    }
}
