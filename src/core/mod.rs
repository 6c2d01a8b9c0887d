//! Core pixel identification processors

pub mod classify;
pub mod cloud_buffer;
pub mod cloud_shadow;
pub mod coastline;
pub mod neural_net;
pub mod pipeline;
pub mod terrain;

// Re-export main types
pub use classify::{ClassifierConfig, PixelClass, PixelClassifier, PixelSample, PixelTests};
pub use cloud_buffer::{CloudBuffer, CloudBufferAlgorithm, CloudBufferParams};
pub use cloud_shadow::{CloudShadow, CloudShadowParams};
pub use coastline::{PostProcessParams, PostProcessor};
pub use neural_net::{FeedForwardNet, NetDefinition, NetLayer};
pub use pipeline::{
    classify_tile, post_process_tile, CancelToken, ProcessingConfig, SceneOutput, SceneProcessor, SceneRasters,
};
pub use terrain::{compute_orientation, TerrainBands, TerrainParams, TerrainProcessor};
