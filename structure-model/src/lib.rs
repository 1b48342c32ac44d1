//! Neural pipeline for text-conditioned 3D structure generation.
//!
//! The pipeline fuses two fixed-length feature vectors — one from a
//! volumetric occupancy grid, one from free text — and decodes the joint
//! representation into a dense 16x16x16 occupancy prediction:
//!
//! ```text
//! text            → TextEncoder       → FeatureVector[768]  ┐
//!                                                            ├→ fuse → JointVector[1024]
//! occupancy 32³   → VolumetricEncoder → FeatureVector[256]  ┘
//!                                                                │
//!                                             StructureDecoder ──┘→ occupancy 16³
//! ```
//!
//! All weights are immutable after construction ([`ModelContext`]); every
//! operation is deterministic given identical weights and input.

mod context;
mod decoder;
mod error;
mod fusion;
mod grid;
mod pretrained;
mod text;
mod volumetric;
mod weights;

pub use context::{ModelConfig, ModelContext};
pub use decoder::{StructureDecoder, OUTPUT_RESOLUTION};
pub use error::{ModelError, ModelResult};
pub use fusion::{fuse, FeatureVector, JointVector, Provenance};
pub use grid::{FixedVolumeSource, OccupancyGrid, SyntheticVolumeSource, VolumeSource};
pub use pretrained::{EncoderConfig, PretrainedEncoder};
pub use text::{ByteSequenceModel, SequenceModel, TextEncoder, TEXT_FEATURES};
pub use volumetric::{VolumetricEncoder, VOLUME_FEATURES, VOLUME_RESOLUTION};
