use std::sync::Arc;
use std::time::Instant;

use structure_model::{fuse, ModelContext, ModelResult, VolumeSource};
use tracing::info;

use crate::layout_extractor::{self, Layout};

/// One request→response pass through the generation pipeline.
///
/// Holds the frozen model context and the injected volumetric input
/// source; both are read-only, so one pipeline can serve concurrent
/// requests without locking.
pub struct GenerationPipeline {
    context: Arc<ModelContext>,
    volume_source: Box<dyn VolumeSource>,
}

impl GenerationPipeline {
    pub fn new(context: Arc<ModelContext>, volume_source: Box<dyn VolumeSource>) -> Self {
        Self {
            context,
            volume_source,
        }
    }

    /// Run encode → fuse → decode → extract for one text input.
    pub fn generate(&self, text: &str) -> ModelResult<Layout> {
        let started = Instant::now();

        let grid = self.volume_source.sample()?;
        let volume_features = self.context.volumetric.encode(&grid)?;
        let text_features = self.context.text.encode(text)?;
        let joint = fuse(&volume_features, &text_features)?;
        let occupancy = self.context.decoder.decode(&joint)?;
        let layout = layout_extractor::extract(&occupancy);

        info!(
            "generated layout with {} walls and {} features in {}ms",
            layout.walls.len(),
            layout.features.len(),
            started.elapsed().as_millis()
        );
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use structure_model::{FixedVolumeSource, ModelConfig, OccupancyGrid};

    fn test_pipeline() -> GenerationPipeline {
        let config = ModelConfig {
            grid_resolution: 8,
            seed: 99,
            ..ModelConfig::default()
        };
        let context = Arc::new(ModelContext::new(&config).unwrap());
        let source = FixedVolumeSource::new(OccupancyGrid::filled(8, 0.5));
        GenerationPipeline::new(context, Box::new(source))
    }

    #[test]
    fn identical_inputs_produce_identical_layouts() {
        let pipeline = test_pipeline();
        let a = pipeline.generate("a brick warehouse").unwrap();
        let b = pipeline.generate("a brick warehouse").unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn layout_always_carries_fixed_slabs() {
        let pipeline = test_pipeline();
        let layout = pipeline.generate("a glass pavilion").unwrap();
        assert_eq!(layout.floor.width, 16);
        assert_eq!(layout.floor.length, 16);
        assert_eq!(layout.ceiling.width, 16);
        assert_eq!(layout.ceiling.length, 16);
    }
}
