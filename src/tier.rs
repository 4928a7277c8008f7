use std::{
    fmt,
    ops::{Index, IndexMut},
    str::FromStr,
};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};


/// Quality tiers in ascending detail and cost.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Reflect,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    #[default]
    UltraLow,
    Low,
    Medium,
    High,
}

impl QualityTier {
    pub const ALL: [QualityTier; 4] = [
        QualityTier::UltraLow,
        QualityTier::Low,
        QualityTier::Medium,
        QualityTier::High,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Next tier in ascending order, `None` past [`QualityTier::High`].
    pub fn next(self) -> Option<QualityTier> {
        QualityTier::ALL.get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::UltraLow => "ultra_low",
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }

    /// Fraction of source points kept when this tier is generated.
    pub fn source_ratio(self) -> f32 {
        match self {
            QualityTier::UltraLow => 0.1,
            QualityTier::Low => 0.25,
            QualityTier::Medium => 0.5,
            QualityTier::High => 1.0,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QualityTier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| format!("unknown quality tier `{s}`"))
    }
}


/// Total mapping from [`QualityTier`] to `T`.
///
/// Every tier always has a value, so lookups cannot miss. The serde shape is
/// `{ "ultra_low": .., "low": .., "medium": .., "high": .. }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierMap<T> {
    pub ultra_low: T,
    pub low: T,
    pub medium: T,
    pub high: T,
}

impl<T> TierMap<T> {
    pub fn from_fn(mut f: impl FnMut(QualityTier) -> T) -> Self {
        Self {
            ultra_low: f(QualityTier::UltraLow),
            low: f(QualityTier::Low),
            medium: f(QualityTier::Medium),
            high: f(QualityTier::High),
        }
    }

    pub fn get(&self, tier: QualityTier) -> &T {
        match tier {
            QualityTier::UltraLow => &self.ultra_low,
            QualityTier::Low => &self.low,
            QualityTier::Medium => &self.medium,
            QualityTier::High => &self.high,
        }
    }

    pub fn get_mut(&mut self, tier: QualityTier) -> &mut T {
        match tier {
            QualityTier::UltraLow => &mut self.ultra_low,
            QualityTier::Low => &mut self.low,
            QualityTier::Medium => &mut self.medium,
            QualityTier::High => &mut self.high,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (QualityTier, &T)> {
        QualityTier::ALL.into_iter().map(move |tier| (tier, self.get(tier)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(QualityTier, &T) -> U) -> TierMap<U> {
        TierMap::from_fn(|tier| f(tier, self.get(tier)))
    }
}

impl<T> Index<QualityTier> for TierMap<T> {
    type Output = T;

    fn index(&self, tier: QualityTier) -> &T {
        self.get(tier)
    }
}

impl<T> IndexMut<QualityTier> for TierMap<T> {
    fn index_mut(&mut self, tier: QualityTier) -> &mut T {
        self.get_mut(tier)
    }
}


fn strip_ply_extension(url: &str) -> &str {
    url.strip_suffix(".ply.gz")
        .or_else(|| url.strip_suffix(".ply"))
        .unwrap_or(url)
}

/// Derives gzip ply tier urls from a single model url.
///
/// `/models/scan.ply` becomes `/models/compressed/scan_<tier>.ply.gz`; urls
/// already carrying a `_<tier>.ply.gz` suffix keep their base.
pub fn generate_ply_tier_urls(url: &str) -> TierMap<String> {
    let tier_suffixed = QualityTier::ALL.into_iter().find_map(|tier| {
        url.strip_suffix(".ply.gz")
            .and_then(|stem| stem.strip_suffix(tier.as_str()))
            .and_then(|stem| stem.strip_suffix('_'))
    });

    let base = match tier_suffixed {
        Some(base) => base.to_string(),
        None if url.contains("/models/compressed/") => strip_ply_extension(url).to_string(),
        None => {
            let relocated = url.replacen("/models/", "/models/compressed/", 1);
            relocated
                .strip_suffix(".ply")
                .map(str::to_string)
                .unwrap_or(relocated)
        }
    };

    TierMap::from_fn(|tier| format!("{base}_{tier}.ply.gz"))
}

/// Derives draco tier urls, `/models/x/scan.ply` -> `/models/draco/scan_<tier>.drc`.
pub fn generate_draco_tier_urls(url: &str) -> TierMap<String> {
    let base = if url.contains("/models/") {
        let filename = url.rsplit('/').next().unwrap_or_default();
        format!("/models/draco/{}", strip_ply_extension(filename))
    } else {
        strip_ply_extension(url).to_string()
    };

    TierMap::from_fn(|tier| format!("{base}_{tier}.drc"))
}
