//! IdePix: pixel identification for optical satellite sensors
//!
//! This library classifies every pixel of an optical scene into invalid,
//! cloud (sure/ambiguous), cloud buffer, cloud shadow, snow/ice, land,
//! coastline and sensor-specific classes, encoded as bits of a 32-bit flag
//! word. Scenes are processed tile by tile in parallel.

pub mod types;
pub mod raster;
pub mod flags;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{GeoCodingKind, IdepixError, IdepixResult, Rectangle, Sensor, SunViewGeometry};

pub use raster::{BitRaster, FlagTile, Raster, Tile, ValueTile};

pub use flags::{Flag, FlagCoding};

pub use crate::core::{
    CancelToken, ClassifierConfig, FeedForwardNet, ProcessingConfig, SceneOutput, SceneProcessor, SceneRasters,
};
