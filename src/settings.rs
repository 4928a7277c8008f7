use std::time::Duration;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    model::{ModelConfig, ModelList},
    tier::QualityTier,
};


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    Reflect,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// tier targets come from the fleet scheduler, advancing in lock-step
    #[default]
    Fleet,
    /// each model walks its own fixed tier sequence
    Independent,
}


/// Global streaming controls, honored on the next frame without reloading cached tiers.
#[derive(Resource, Clone, Debug, PartialEq, Reflect, Serialize, Deserialize)]
#[reflect(Resource)]
#[serde(default)]
pub struct StreamingSettings {
    pub resolution: f32,
    pub progressive_loading: bool,
    pub scheduling: SchedulingMode,
    pub max_tier: QualityTier,
    pub max_attempts: u32,
    pub stall_timeout_secs: Option<f32>,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            progressive_loading: true,
            scheduling: SchedulingMode::Fleet,
            max_tier: QualityTier::High,
            max_attempts: 1,
            stall_timeout_secs: Some(30.0),
        }
    }
}

impl StreamingSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(ConfigError::InvalidResolution(self.resolution));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidAttempts);
        }

        if let Some(timeout) = self.stall_timeout_secs {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(ConfigError::InvalidStallTimeout(timeout));
            }
        }

        Ok(())
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f32)
    }
}


/// Viewer configuration file, `{ "models": [...], "resolution": 0.5, "progressiveLoading": true }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub resolution: Option<f32>,
    #[serde(default)]
    pub progressive_loading: Option<bool>,
}

impl ViewerConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn model_list(&self) -> Result<ModelList, ConfigError> {
        ModelList::from_configs(self.models.clone())
    }

    /// Applies the file's global controls over `settings` and validates the result.
    pub fn apply(&self, settings: &mut StreamingSettings) -> Result<(), ConfigError> {
        if let Some(resolution) = self.resolution {
            settings.resolution = resolution;
        }

        if let Some(progressive_loading) = self.progressive_loading {
            settings.progressive_loading = progressive_loading;
        }

        settings.validate()
    }
}
