//! Dataset collaborator: fetches a StructureNet-style archive of 3D
//! assets, extracts it, and converts `.obj` meshes into occupancy grids
//! for the volumetric encoder.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use structure_model::OccupancyGrid;

mod voxel;

pub use voxel::{parse_obj, voxelize, voxelize_obj_file, Mesh, MeshVolumeSource};

/// Error types for the dataset loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download failed: {0}")]
    Http(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    #[error(transparent)]
    Model(#[from] structure_model::ModelError),
}

impl From<reqwest::Error> for LoaderError {
    fn from(err: reqwest::Error) -> Self {
        LoaderError::Http(err.to_string())
    }
}

/// Download a dataset archive and extract it under `output_dir`.
pub async fn fetch_dataset(url: &str, output_dir: &Path) -> Result<PathBuf, LoaderError> {
    std::fs::create_dir_all(output_dir)?;

    info!("downloading dataset archive from {url}");
    let response = reqwest::get(url).await?;
    if !response.status().is_success() {
        return Err(LoaderError::Http(format!(
            "{url} returned status {}",
            response.status()
        )));
    }
    let bytes = response.bytes().await?;

    let extracted = extract_archive(&bytes, output_dir)?;
    info!("extracted {extracted} files to {}", output_dir.display());
    Ok(output_dir.to_path_buf())
}

/// Extract a zip archive held in memory, skipping entries that escape the
/// output directory.
pub fn extract_archive(bytes: &[u8], output_dir: &Path) -> Result<usize, LoaderError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let dest = output_dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&dest)?;
        std::io::copy(&mut entry, &mut out)?;
        extracted += 1;
    }

    Ok(extracted)
}

/// Recursively collect `.obj` asset paths under a dataset directory,
/// sorted for reproducible iteration order.
pub fn scan_meshes(dir: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    if !dir.exists() {
        return Err(LoaderError::DatasetNotFound(format!(
            "directory {} does not exist",
            dir.display()
        )));
    }

    let mut meshes = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "obj") {
                meshes.push(path);
            }
        }
    }
    meshes.sort();
    Ok(meshes)
}

/// A voxelized asset with its source file name.
#[derive(Debug, Clone)]
pub struct VoxelSample {
    pub file_name: String,
    pub grid: OccupancyGrid,
}

/// Dataset iterator over voxelized assets, with batch loading and
/// train/val/test splitting for the training tooling around the pipeline.
pub struct VoxelDataset {
    samples: Vec<VoxelSample>,
    current_index: usize,
}

impl VoxelDataset {
    /// Voxelize every `.obj` under `dir` at the given grid resolution.
    pub fn from_dir(dir: &Path, resolution: usize) -> Result<Self, LoaderError> {
        let mut samples = Vec::new();
        for path in scan_meshes(dir)? {
            let grid = voxelize_obj_file(&path, resolution)?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            samples.push(VoxelSample { file_name, grid });
        }
        info!("voxelized {} assets from {}", samples.len(), dir.display());
        Ok(Self::from_samples(samples))
    }

    pub fn from_samples(samples: Vec<VoxelSample>) -> Self {
        Self {
            samples,
            current_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the next batch of samples.
    pub fn batch(&mut self, size: usize) -> Vec<VoxelSample> {
        let end = (self.current_index + size).min(self.samples.len());
        let batch = self.samples[self.current_index..end].to_vec();
        self.current_index = end;
        batch
    }

    /// Split into train/val/test sets by ratio.
    pub fn split(
        &self,
        train_ratio: f64,
        val_ratio: f64,
    ) -> (Vec<VoxelSample>, Vec<VoxelSample>, Vec<VoxelSample>) {
        let total = self.samples.len();
        let train_size = (total as f64 * train_ratio) as usize;
        let val_size = (total as f64 * val_ratio) as usize;

        let train = self.samples[..train_size].to_vec();
        let val = self.samples[train_size..train_size + val_size].to_vec();
        let test = self.samples[train_size + val_size..].to_vec();
        (train, val, test)
    }

    pub fn reset(&mut self) {
        self.current_index = 0;
    }

    pub fn all(&self) -> &[VoxelSample] {
        &self.samples
    }
}

impl Iterator for VoxelDataset {
    type Item = VoxelSample;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index < self.samples.len() {
            let item = self.samples[self.current_index].clone();
            self.current_index += 1;
            Some(item)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str) -> VoxelSample {
        VoxelSample {
            file_name: name.to_string(),
            grid: OccupancyGrid::zeros(4),
        }
    }

    #[test]
    fn dataset_split() {
        let samples: Vec<VoxelSample> = (0..10).map(|i| sample(&format!("{i}.obj"))).collect();
        let dataset = VoxelDataset::from_samples(samples);

        let (train, val, test) = dataset.split(0.8, 0.1);
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 1);
        assert_eq!(test.len(), 1);
    }

    #[test]
    fn batch_loading() {
        let samples: Vec<VoxelSample> = (0..10).map(|i| sample(&format!("{i}.obj"))).collect();
        let mut dataset = VoxelDataset::from_samples(samples);

        let batch1 = dataset.batch(3);
        assert_eq!(batch1.len(), 3);
        assert_eq!(batch1[0].file_name, "0.obj");

        let batch2 = dataset.batch(3);
        assert_eq!(batch2.len(), 3);
        assert_eq!(batch2[0].file_name, "3.obj");
    }

    #[test]
    fn iterator_walks_samples() {
        let samples: Vec<VoxelSample> = (0..5).map(|i| sample(&format!("{i}.obj"))).collect();
        let dataset = VoxelDataset::from_samples(samples);

        let collected: Vec<_> = dataset.take(3).collect();
        assert_eq!(collected.len(), 3);
        assert_eq!(collected[2].file_name, "2.obj");
    }

    #[test]
    fn extract_archive_round_trips() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("assets/chair.obj", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"v 0 0 0\n").unwrap();
            writer.finish().unwrap();
        }

        let dir = std::env::temp_dir().join("structurenet-loader-test-extract");
        let _ = std::fs::remove_dir_all(&dir);
        let count = extract_archive(buffer.get_ref(), &dir).unwrap();
        assert_eq!(count, 1);
        assert!(dir.join("assets/chair.obj").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn scan_meshes_missing_dir_errors() {
        let err = scan_meshes(Path::new("/nonexistent/structurenet")).unwrap_err();
        assert!(matches!(err, LoaderError::DatasetNotFound(_)));
    }
}
