use bevy::prelude::*;

pub use cloud::{PointBounds, PointBuffer, random_points};
pub use decoder::{DecoderConfig, DecoderManager, DecoderMode};
pub use error::{ConfigError, DecodeError, FetchError, LoadError};
pub use load::{CancelToken, LoadJob, load_tier};
pub use model::{CodecKind, ModelAsset, ModelConfig, ModelId, ModelList, ModelTransform};
pub use pipeline::{PipelineEvent, RenderRevision, StreamingPipeline};
pub use render::{PointCloudEntity, PointRenderPlugin};
pub use sample::sample;
pub use settings::{SchedulingMode, StreamingSettings, ViewerConfig};
pub use streaming::{
    FleetTargetAdvanced,
    ModelReady,
    PointCloudModels,
    PointStreamer,
    PointStreamingPlugin,
    TierFailed,
    TierLoaded,
};
pub use tier::{QualityTier, TierMap};

pub mod cloud;
pub mod decoder;
pub mod error;
pub mod fleet;
pub mod io;
pub mod load;
pub mod model;
pub mod pipeline;
pub mod quality;
pub mod render;
pub mod sample;
pub mod settings;
pub mod streaming;
pub mod tier;
pub mod utils;


/// Streaming and point rendering in one plugin.
#[derive(Default)]
pub struct ProgressivePointsPlugin {
    pub decoder: DecoderConfig,
}

impl Plugin for ProgressivePointsPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            PointStreamingPlugin {
                decoder: self.decoder.clone(),
            },
            PointRenderPlugin,
        ));
    }
}
