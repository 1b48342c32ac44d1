//! Feed-forward expansion from the joint representation to a dense cubic
//! occupancy prediction.

use candle_core::Device;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::error::{ModelError, ModelResult};
use crate::fusion::JointVector;
use crate::grid::OccupancyGrid;
use crate::weights::{Affine, TensorMap};

/// Side length of the decoded occupancy cube.
pub const OUTPUT_RESOLUTION: usize = 16;

/// Widths of the expansion stages after the joint input.
const STAGE_WIDTHS: [usize; 4] = [512, 1024, 2048, 4096];

/// Maps a joint vector through a widening affine chain to a `[0, 1]`
/// occupancy cube of side [`OUTPUT_RESOLUTION`].
///
/// The expected joint width is a construction parameter: decoding a vector
/// of any other width is an error, never a silent reinterpretation. The
/// final stage width must equal the cube of the output resolution, which is
/// checked once at construction.
#[derive(Debug)]
pub struct StructureDecoder {
    stages: Vec<Affine>,
    joint_width: usize,
    device: Device,
}

impl StructureDecoder {
    fn check_final_width() -> ModelResult<()> {
        let cube = OUTPUT_RESOLUTION * OUTPUT_RESOLUTION * OUTPUT_RESOLUTION;
        let last = STAGE_WIDTHS[STAGE_WIDTHS.len() - 1];
        if last != cube {
            return Err(ModelError::shape(
                "structure decoder",
                format!("final stage width {cube}"),
                last,
            ));
        }
        Ok(())
    }

    /// Deterministic seeded initialization (init-then-serve mode).
    pub fn seeded(joint_width: usize, seed: u64, device: &Device) -> ModelResult<Self> {
        Self::check_final_width()?;
        if joint_width == 0 {
            return Err(ModelError::shape("structure decoder", "joint width > 0", 0));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut stages = Vec::with_capacity(STAGE_WIDTHS.len());
        let mut in_dim = joint_width;
        for out_dim in STAGE_WIDTHS {
            stages.push(Affine::seeded(&mut rng, in_dim, out_dim, device)?);
            in_dim = out_dim;
        }
        info!("structure decoder initialized from seed {seed} for joint width {joint_width}");
        Ok(Self {
            stages,
            joint_width,
            device: device.clone(),
        })
    }

    /// Load a trained checkpoint (load-then-serve mode).
    pub fn from_checkpoint(
        path: &std::path::Path,
        joint_width: usize,
        device: &Device,
    ) -> ModelResult<Self> {
        Self::check_final_width()?;
        let map = TensorMap::load(path, device)?;
        let mut stages = Vec::with_capacity(STAGE_WIDTHS.len());
        let mut in_dim = joint_width;
        for (i, out_dim) in STAGE_WIDTHS.into_iter().enumerate() {
            stages.push(Affine::from_map(&map, &format!("fc{}", i + 1), in_dim, out_dim)?);
            in_dim = out_dim;
        }
        info!("structure decoder loaded from {}", path.display());
        Ok(Self {
            stages,
            joint_width,
            device: device.clone(),
        })
    }

    pub fn joint_width(&self) -> usize {
        self.joint_width
    }

    /// Decode the joint representation into a 16x16x16 occupancy cube with
    /// every cell squashed into `[0, 1]`.
    pub fn decode(&self, joint: &JointVector) -> ModelResult<OccupancyGrid> {
        if joint.width() != self.joint_width {
            return Err(ModelError::shape(
                "structure decoder input",
                format!("joint width {}", self.joint_width),
                format!("joint width {}", joint.width()),
            ));
        }

        let mut x = joint.to_tensor(&self.device)?;
        let last = self.stages.len() - 1;
        for (i, stage) in self.stages.iter().enumerate() {
            x = stage.apply(&x)?;
            if i < last {
                x = x.relu()?;
            }
        }
        let squashed = candle_nn::ops::sigmoid(&x)?;
        OccupancyGrid::from_tensor(&squashed, OUTPUT_RESOLUTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{fuse, FeatureVector, Provenance};

    fn joint(width_volume: usize, width_text: usize) -> JointVector {
        let volume = FeatureVector::new(Provenance::Volume, vec![0.5; width_volume]);
        let text = FeatureVector::new(Provenance::Text, vec![-0.5; width_text]);
        fuse(&volume, &text).unwrap()
    }

    #[test]
    fn output_cells_stay_in_unit_interval() {
        let decoder = StructureDecoder::seeded(24, 5, &Device::Cpu).unwrap();
        let grid = decoder.decode(&joint(16, 8)).unwrap();
        assert_eq!(grid.resolution(), OUTPUT_RESOLUTION);
        assert_eq!(grid.values().len(), 4096);
        assert!(grid.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn decoding_is_deterministic() {
        let a = StructureDecoder::seeded(24, 5, &Device::Cpu).unwrap();
        let b = StructureDecoder::seeded(24, 5, &Device::Cpu).unwrap();
        let input = joint(16, 8);
        assert_eq!(
            a.decode(&input).unwrap().values(),
            b.decode(&input).unwrap().values()
        );
    }

    #[test]
    fn rejects_mismatched_joint_width() {
        let decoder = StructureDecoder::seeded(24, 5, &Device::Cpu).unwrap();
        let err = decoder.decode(&joint(16, 16)).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn rejects_zero_joint_width() {
        let err = StructureDecoder::seeded(0, 5, &Device::Cpu).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }
}
