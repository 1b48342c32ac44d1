use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ModelError, ModelResult};

/// Cubic grid of scalar occupancy values.
///
/// Used both for the encoder input (default 32 per side) and for the decoded
/// output (16 per side). All three dimensions are equal by construction;
/// data of the wrong length is rejected, never reshaped.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    resolution: usize,
    values: Vec<f32>,
}

impl OccupancyGrid {
    /// Wrap raw cell values in x-major, then y, then z order.
    pub fn new(resolution: usize, values: Vec<f32>) -> ModelResult<Self> {
        let expected = resolution * resolution * resolution;
        if resolution == 0 || values.len() != expected {
            return Err(ModelError::shape(
                "occupancy grid",
                format!("{0}x{0}x{0} = {expected} cells", resolution),
                format!("{} cells", values.len()),
            ));
        }
        Ok(Self { resolution, values })
    }

    pub fn zeros(resolution: usize) -> Self {
        Self {
            resolution,
            values: vec![0.0; resolution * resolution * resolution],
        }
    }

    /// Uniform fill, used by tests and synthetic fixtures.
    pub fn filled(resolution: usize, value: f32) -> Self {
        Self {
            resolution,
            values: vec![value; resolution * resolution * resolution],
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.resolution + y) * self.resolution + z
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.values[self.index(x, y, z)]
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let idx = self.index(x, y, z);
        self.values[idx] = value;
    }

    /// View as a single-channel `[1, R, R, R]` tensor.
    pub fn to_tensor(&self, device: &Device) -> ModelResult<Tensor> {
        let r = self.resolution;
        Ok(Tensor::from_slice(&self.values, (1, r, r, r), device)?)
    }

    /// Rebuild a grid from a flat tensor of exactly `resolution^3` cells.
    pub fn from_tensor(tensor: &Tensor, resolution: usize) -> ModelResult<Self> {
        let flat = tensor.flatten_all()?;
        let values: Vec<f32> = flat.to_vec1()?;
        Self::new(resolution, values)
    }
}

/// Source of volumetric input for the generation pipeline.
///
/// The reference pipeline fed the encoder a synthetic grid; real geometry
/// arrives through this seam instead, so tests and callers can inject
/// deterministic grids.
pub trait VolumeSource: Send + Sync {
    fn sample(&self) -> ModelResult<OccupancyGrid>;
}

/// Seeded synthetic stand-in for a true geometric input.
///
/// Returns the same grid on every call so that repeated requests with
/// identical text stay byte-identical.
pub struct SyntheticVolumeSource {
    resolution: usize,
    seed: u64,
}

impl SyntheticVolumeSource {
    pub fn new(resolution: usize, seed: u64) -> Self {
        Self { resolution, seed }
    }
}

impl VolumeSource for SyntheticVolumeSource {
    fn sample(&self) -> ModelResult<OccupancyGrid> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n = self.resolution * self.resolution * self.resolution;
        let values: Vec<f32> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
        OccupancyGrid::new(self.resolution, values)
    }
}

/// Wraps a concrete grid, for injection in tests and batch tooling.
pub struct FixedVolumeSource {
    grid: OccupancyGrid,
}

impl FixedVolumeSource {
    pub fn new(grid: OccupancyGrid) -> Self {
        Self { grid }
    }
}

impl VolumeSource for FixedVolumeSource {
    fn sample(&self) -> ModelResult<OccupancyGrid> {
        Ok(self.grid.clone())
    }
}
