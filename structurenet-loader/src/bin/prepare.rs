//! Dataset preparation utility: download a StructureNet-style archive,
//! extract it, and voxelize every `.obj` asset.
//!
//! Usage: `prepare <archive-url> <output-dir> [resolution]`

use std::path::PathBuf;

use anyhow::{bail, Context as _};
use structurenet_loader::{fetch_dataset, VoxelDataset};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("usage: prepare <archive-url> <output-dir> [resolution]");
    }
    let url = &args[1];
    let output_dir = PathBuf::from(&args[2]);
    let resolution: usize = args
        .get(3)
        .map(|raw| raw.parse())
        .transpose()
        .context("resolution must be an integer")?
        .unwrap_or(32);

    fetch_dataset(url, &output_dir)
        .await
        .context("fetching dataset")?;

    let dataset = VoxelDataset::from_dir(&output_dir, resolution).context("voxelizing assets")?;
    if dataset.is_empty() {
        bail!("no .obj assets found in {}", output_dir.display());
    }

    let (train, val, test) = dataset.split(0.8, 0.1);
    info!(
        "prepared {} samples at {resolution}^3 ({} train / {} val / {} test)",
        dataset.len(),
        train.len(),
        val.len(),
        test.len()
    );
    Ok(())
}
