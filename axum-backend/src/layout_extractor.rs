use serde::{Deserialize, Serialize};
use structure_model::{OccupancyGrid, OUTPUT_RESOLUTION};
use tracing::info;

/// Occupancy above this reads as structure at the base layer.
pub const WALL_THRESHOLD: f32 = 0.5;
/// Occupancy above this reads as an opening on the upper layers.
pub const FEATURE_THRESHOLD: f32 = 0.8;

const WALL_HEIGHT: u32 = 3;
const OPENING_WIDTH: u32 = 1;
const OPENING_HEIGHT: u32 = 2;

/// One-cell wall segment at the base layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wall {
    pub start: [usize; 3],
    pub end: [usize; 3],
    pub height: u32,
}

/// Floor or ceiling plate, always emitted at the full output footprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slab {
    pub width: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpeningKind {
    Window,
    Door,
}

/// Window or door emitted on an upper layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening {
    #[serde(rename = "type")]
    pub kind: OpeningKind,
    pub position: [usize; 3],
    pub width: u32,
    pub height: u32,
}

/// Typed architectural layout decoded from an occupancy cube.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub walls: Vec<Wall>,
    pub floor: Slab,
    pub ceiling: Slab,
    pub features: Vec<Opening>,
}

/// Convert a dense occupancy cube into a typed layout by thresholding.
///
/// Rule order is load-bearing: the z == 0 check runs first and does not
/// consult [`FEATURE_THRESHOLD`], so a base-layer cell above 0.8 is still a
/// wall. Walls only form at z == 0; openings only form at z > 0 where the
/// occupancy clears the higher threshold. A window opens where y is even,
/// a door where y is odd.
pub fn extract(occupancy: &OccupancyGrid) -> Layout {
    let resolution = occupancy.resolution();
    let mut walls = Vec::new();
    let mut features = Vec::new();

    for x in 0..resolution {
        for y in 0..resolution {
            for z in 0..resolution {
                let value = occupancy.get(x, y, z);
                if value > WALL_THRESHOLD {
                    if z == 0 {
                        walls.push(Wall {
                            start: [x, y, z],
                            end: [x + 1, y + 1, z],
                            height: WALL_HEIGHT,
                        });
                    } else if value > FEATURE_THRESHOLD {
                        let kind = if y % 2 == 0 {
                            OpeningKind::Window
                        } else {
                            OpeningKind::Door
                        };
                        features.push(Opening {
                            kind,
                            position: [x, y, z],
                            width: OPENING_WIDTH,
                            height: OPENING_HEIGHT,
                        });
                    }
                }
            }
        }
    }

    info!(
        "extracted layout: {} walls, {} features",
        walls.len(),
        features.len()
    );

    // Floor and ceiling are fixed plates, not derived from the occupancy.
    Layout {
        walls,
        floor: Slab {
            width: OUTPUT_RESOLUTION,
            length: OUTPUT_RESOLUTION,
        },
        ceiling: Slab {
            width: OUTPUT_RESOLUTION,
            length: OUTPUT_RESOLUTION,
        },
        features,
    }
}
