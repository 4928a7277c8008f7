use std::{collections::HashSet, fmt, sync::Arc};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    tier::{QualityTier, TierMap, generate_draco_tier_urls, generate_ply_tier_urls},
};


/// Stable key of a model for its whole lifetime in the model list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(Arc<str>);

impl ModelId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        ModelId::new(id)
    }
}


/// Decoder family of a model's payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// text or binary ply, optionally gzip wrapped
    #[default]
    Ply,
    /// geometry-codec compressed payload, decoded by the shared decoder
    Draco,
}


/// Placement and styling consumed by the renderer, never touched by the loaders.
#[derive(Clone, Debug, PartialEq, Reflect)]
pub struct ModelTransform {
    pub position: Vec3,
    /// euler xyz, radians
    pub rotation: Vec3,
    pub scale: Vec3,
    pub point_size: f32,
    pub color: Srgba,
    pub visible: bool,
}

impl Default for ModelTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            point_size: 0.01,
            color: Srgba::WHITE,
            visible: true,
        }
    }
}

impl ModelTransform {
    pub fn to_transform(&self) -> Transform {
        Transform {
            translation: self.position,
            rotation: Quat::from_euler(
                EulerRot::XYZ,
                self.rotation.x,
                self.rotation.y,
                self.rotation.z,
            ),
            scale: self.scale,
        }
    }
}


/// A validated, loadable point cloud.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelAsset {
    pub id: ModelId,
    pub name: String,
    urls: TierMap<String>,
    codec: CodecKind,
    pub transform: ModelTransform,
}

impl ModelAsset {
    pub fn new(
        id: impl AsRef<str>,
        urls: TierMap<String>,
        codec: CodecKind,
    ) -> Result<Self, ConfigError> {
        let id = id.as_ref();
        if id.trim().is_empty() {
            return Err(ConfigError::EmptyId);
        }

        if let Some((tier, _)) = urls.iter().find(|(_, url)| url.trim().is_empty()) {
            return Err(ConfigError::MissingTierUrl {
                id: id.to_string(),
                tier,
            });
        }

        Ok(Self {
            id: ModelId::new(id),
            name: id.to_string(),
            urls,
            codec,
            transform: ModelTransform::default(),
        })
    }

    pub fn with_transform(mut self, transform: ModelTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn url(&self, tier: QualityTier) -> &str {
        &self.urls[tier]
    }

    pub fn urls(&self) -> &TierMap<String> {
        &self.urls
    }

    pub fn codec(&self) -> CodecKind {
        self.codec
    }

    pub fn is_visible(&self) -> bool {
        self.transform.visible
    }

    /// True when both assets fetch the same payloads, so cached tiers stay valid.
    pub fn same_source(&self, other: &ModelAsset) -> bool {
        self.codec == other.codec && self.urls == other.urls
    }
}


fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_point_size() -> f32 {
    0.01
}

fn default_color() -> String {
    "#ffffff".to_string()
}

fn default_visible() -> bool {
    true
}

/// Model entry as written in viewer config files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub urls: Option<TierMap<String>>,
    #[serde(default)]
    pub draco_urls: Option<TierMap<String>>,
    #[serde(default)]
    pub use_draco: bool,
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    #[serde(default = "default_point_size")]
    pub point_size: f32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl TryFrom<ModelConfig> for ModelAsset {
    type Error = ConfigError;

    fn try_from(config: ModelConfig) -> Result<Self, Self::Error> {
        let (codec, explicit, derive): (_, _, fn(&str) -> TierMap<String>) = if config.use_draco {
            (CodecKind::Draco, config.draco_urls, generate_draco_tier_urls)
        } else {
            (CodecKind::Ply, config.urls, generate_ply_tier_urls)
        };

        let urls = match (explicit, config.url.as_deref()) {
            (Some(urls), _) => urls,
            (None, Some(url)) if !url.trim().is_empty() => derive(url),
            _ => return Err(ConfigError::MissingUrls(config.id)),
        };

        let color = Srgba::hex(&config.color).map_err(|_| ConfigError::InvalidColor {
            id: config.id.clone(),
            color: config.color.clone(),
        })?;

        if !config.point_size.is_finite() || config.point_size <= 0.0 {
            return Err(ConfigError::InvalidPointSize {
                id: config.id,
                size: config.point_size,
            });
        }

        let transform = ModelTransform {
            position: Vec3::from_array(config.position),
            rotation: Vec3::from_array(config.rotation),
            scale: Vec3::from_array(config.scale),
            point_size: config.point_size,
            color,
            visible: config.visible,
        };

        let name = if config.name.is_empty() {
            config.id.clone()
        } else {
            config.name
        };

        Ok(ModelAsset::new(&config.id, urls, codec)?
            .with_name(name)
            .with_transform(transform))
    }
}


/// Ordered, validated model list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelList(pub Vec<ModelAsset>);

impl ModelList {
    pub fn from_configs(configs: Vec<ModelConfig>) -> Result<Self, ConfigError> {
        let models = configs
            .into_iter()
            .map(ModelAsset::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(models)
    }

    pub fn new(models: Vec<ModelAsset>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.id.clone()) {
                return Err(ConfigError::DuplicateId(model.id.to_string()));
            }
        }

        Ok(Self(models))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelAsset> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
