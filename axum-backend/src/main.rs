use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use structure_model::{
    ModelConfig, ModelContext, SyntheticVolumeSource, VolumeSource, VOLUME_RESOLUTION,
};
use structurenet_loader::MeshVolumeSource;
use tracing::info;

use axum_backend::{create_app, generation::GenerationPipeline};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Structure Generation Server");

    let config = ModelConfig {
        grid_resolution: VOLUME_RESOLUTION,
        seed: env_or("MODEL_SEED", 42),
        weights_dir: std::env::var("MODEL_DIR").ok().map(PathBuf::from),
        text_model_dir: std::env::var("TEXT_MODEL_DIR").ok().map(PathBuf::from),
    };
    let context = Arc::new(ModelContext::new(&config).context("initializing model context")?);
    info!("models ready (joint width {})", context.joint_width());

    // Real geometry arrives via VOLUME_ASSET; without one a seeded
    // synthetic grid stands in.
    let volume_source: Box<dyn VolumeSource> = match std::env::var("VOLUME_ASSET") {
        Ok(path) => {
            info!("voxelizing volume asset {path}");
            Box::new(
                MeshVolumeSource::load(std::path::Path::new(&path), VOLUME_RESOLUTION)
                    .with_context(|| format!("voxelizing {path}"))?,
            )
        }
        Err(_) => Box::new(SyntheticVolumeSource::new(
            VOLUME_RESOLUTION,
            env_or("VOLUME_SEED", 7),
        )),
    };

    let pipeline = Arc::new(GenerationPipeline::new(context, volume_source));
    let app = create_app(pipeline);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    info!("Server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
