//! Volumetric feature encoder: hierarchical spatial downsampling of a
//! single-channel occupancy grid into a fixed 256-length feature vector.

use candle_core::{DType, Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::error::{ModelError, ModelResult};
use crate::fusion::{FeatureVector, Provenance};
use crate::grid::OccupancyGrid;
use crate::weights::{uniform_init, Affine, TensorMap};

/// Side length of the encoder input grid.
pub const VOLUME_RESOLUTION: usize = 32;
/// Declared output dimension Dv.
pub const VOLUME_FEATURES: usize = 256;

const STAGE1_CHANNELS: usize = 32;
const STAGE2_CHANNELS: usize = 64;
const HIDDEN: usize = 512;

/// 3x3x3 neighborhood aggregation with padding 1, expressed as 27
/// shifted matmuls over the padded grid.
#[derive(Debug)]
struct Conv3 {
    weight: Tensor,
    bias: Tensor,
    in_channels: usize,
    out_channels: usize,
}

impl Conv3 {
    fn seeded(
        rng: &mut StdRng,
        in_channels: usize,
        out_channels: usize,
        device: &Device,
    ) -> ModelResult<Self> {
        let fan_in = in_channels * 27;
        let weight = Tensor::from_vec(
            uniform_init(rng, fan_in, out_channels * fan_in),
            (out_channels, in_channels, 3, 3, 3),
            device,
        )?;
        let bias = Tensor::from_vec(uniform_init(rng, fan_in, out_channels), out_channels, device)?;
        Ok(Self {
            weight,
            bias,
            in_channels,
            out_channels,
        })
    }

    fn from_map(
        map: &TensorMap,
        prefix: &str,
        in_channels: usize,
        out_channels: usize,
    ) -> ModelResult<Self> {
        let weight = map.get(
            &format!("{prefix}.weight"),
            &[out_channels, in_channels, 3, 3, 3],
        )?;
        let bias = map.get(&format!("{prefix}.bias"), &[out_channels])?;
        Ok(Self {
            weight,
            bias,
            in_channels,
            out_channels,
        })
    }

    /// Apply to `[C_in, D, H, W]`, producing `[C_out, D, H, W]`.
    fn apply(&self, x: &Tensor) -> ModelResult<Tensor> {
        let (c_in, d, h, w) = x.dims4()?;
        if c_in != self.in_channels {
            return Err(ModelError::shape(
                "volumetric conv",
                format!("{} input channels", self.in_channels),
                format!("{c_in} input channels"),
            ));
        }

        let padded = x
            .pad_with_zeros(1, 1, 1)?
            .pad_with_zeros(2, 1, 1)?
            .pad_with_zeros(3, 1, 1)?;
        let n = d * h * w;
        let mut acc = Tensor::zeros((self.out_channels, n), DType::F32, x.device())?;
        for dz in 0..3 {
            for dy in 0..3 {
                for dx in 0..3 {
                    let shifted = padded
                        .narrow(1, dz, d)?
                        .narrow(2, dy, h)?
                        .narrow(3, dx, w)?
                        .contiguous()?
                        .reshape((c_in, n))?;
                    let tap = self
                        .weight
                        .narrow(2, dz, 1)?
                        .narrow(3, dy, 1)?
                        .narrow(4, dx, 1)?
                        .contiguous()?
                        .reshape((self.out_channels, c_in))?;
                    acc = (acc + tap.matmul(&shifted)?)?;
                }
            }
        }

        let acc = acc.broadcast_add(&self.bias.reshape((self.out_channels, 1))?)?;
        Ok(acc.reshape((self.out_channels, d, h, w))?)
    }
}

/// 2x max pooling along all three spatial axes.
fn max_pool2(x: &Tensor) -> ModelResult<Tensor> {
    let (c, d, h, w) = x.dims4()?;
    let pooled = x
        .reshape(vec![c, d / 2, 2, h / 2, 2, w / 2, 2])?
        .max(6)?
        .max(4)?
        .max(2)?;
    Ok(pooled)
}

/// Maps an occupancy grid to a fixed-length feature vector.
///
/// Two aggregation/pool stages halve each spatial axis twice, then two
/// affine stages project the flattened activations down to
/// [`VOLUME_FEATURES`]. The flatten width is derived from the resolution at
/// construction, so a mismatched affine chain cannot be built.
#[derive(Debug)]
pub struct VolumetricEncoder {
    conv1: Conv3,
    conv2: Conv3,
    fc1: Affine,
    fc2: Affine,
    resolution: usize,
    device: Device,
}

impl VolumetricEncoder {
    fn flatten_width(resolution: usize) -> ModelResult<usize> {
        if resolution < 8 || resolution % 4 != 0 {
            return Err(ModelError::shape(
                "volumetric encoder",
                "resolution divisible by 4 and >= 8",
                resolution,
            ));
        }
        let side = resolution / 4;
        Ok(STAGE2_CHANNELS * side * side * side)
    }

    /// Deterministic seeded initialization (init-then-serve mode).
    pub fn seeded(resolution: usize, seed: u64, device: &Device) -> ModelResult<Self> {
        let flat = Self::flatten_width(resolution)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let encoder = Self {
            conv1: Conv3::seeded(&mut rng, 1, STAGE1_CHANNELS, device)?,
            conv2: Conv3::seeded(&mut rng, STAGE1_CHANNELS, STAGE2_CHANNELS, device)?,
            fc1: Affine::seeded(&mut rng, flat, HIDDEN, device)?,
            fc2: Affine::seeded(&mut rng, HIDDEN, VOLUME_FEATURES, device)?,
            resolution,
            device: device.clone(),
        };
        info!("volumetric encoder initialized from seed {seed} at resolution {resolution}");
        Ok(encoder)
    }

    /// Load a trained checkpoint (load-then-serve mode).
    pub fn from_checkpoint(
        path: &std::path::Path,
        resolution: usize,
        device: &Device,
    ) -> ModelResult<Self> {
        let flat = Self::flatten_width(resolution)?;
        let map = TensorMap::load(path, device)?;
        let encoder = Self {
            conv1: Conv3::from_map(&map, "conv1", 1, STAGE1_CHANNELS)?,
            conv2: Conv3::from_map(&map, "conv2", STAGE1_CHANNELS, STAGE2_CHANNELS)?,
            fc1: Affine::from_map(&map, "fc1", flat, HIDDEN)?,
            fc2: Affine::from_map(&map, "fc2", HIDDEN, VOLUME_FEATURES)?,
            resolution,
            device: device.clone(),
        };
        info!("volumetric encoder loaded from {}", path.display());
        Ok(encoder)
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn output_len(&self) -> usize {
        self.fc2.out_dim()
    }

    /// Encode a single-channel grid into a [`VOLUME_FEATURES`]-length
    /// volume-origin feature vector.
    pub fn encode(&self, grid: &OccupancyGrid) -> ModelResult<FeatureVector> {
        if grid.resolution() != self.resolution {
            return Err(ModelError::shape(
                "volumetric encoder input",
                format!("{0}x{0}x{0} grid", self.resolution),
                format!("{0}x{0}x{0} grid", grid.resolution()),
            ));
        }

        let x = grid.to_tensor(&self.device)?;
        let x = max_pool2(&self.conv1.apply(&x)?.relu()?)?;
        let x = max_pool2(&self.conv2.apply(&x)?.relu()?)?;
        let flat = x.contiguous()?.reshape((1, self.fc1.in_dim()))?;
        let hidden = self.fc1.apply(&flat)?.relu()?;
        let features = self.fc2.apply(&hidden)?;
        let values: Vec<f32> = features.flatten_all()?.to_vec1()?;
        Ok(FeatureVector::new(Provenance::Volume, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_encoder() -> VolumetricEncoder {
        VolumetricEncoder::seeded(8, 11, &Device::Cpu).unwrap()
    }

    #[test]
    fn output_length_is_fixed() {
        let encoder = small_encoder();
        for grid in [
            OccupancyGrid::zeros(8),
            OccupancyGrid::filled(8, 1.0),
            OccupancyGrid::filled(8, 0.25),
        ] {
            let features = encoder.encode(&grid).unwrap();
            assert_eq!(features.len(), VOLUME_FEATURES);
            assert_eq!(features.provenance(), Provenance::Volume);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = small_encoder();
        let b = small_encoder();
        let grid = OccupancyGrid::filled(8, 0.5);
        assert_eq!(
            a.encode(&grid).unwrap().values(),
            b.encode(&grid).unwrap().values()
        );
    }

    #[test]
    fn rejects_wrong_resolution() {
        let encoder = small_encoder();
        let err = encoder.encode(&OccupancyGrid::zeros(16)).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn rejects_unpoolable_resolution() {
        let err = VolumetricEncoder::seeded(6, 1, &Device::Cpu).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }
}
