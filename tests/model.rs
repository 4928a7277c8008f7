use bevy::color::Srgba;

use bevy_progressive_points::{
    CodecKind,
    ConfigError,
    ModelAsset,
    ModelList,
    QualityTier,
    StreamingSettings,
    TierMap,
    ViewerConfig,
    tier::{generate_draco_tier_urls, generate_ply_tier_urls},
};


#[test]
fn test_tier_order() {
    assert!(QualityTier::UltraLow < QualityTier::Low);
    assert!(QualityTier::Medium < QualityTier::High);
    assert_eq!(QualityTier::UltraLow.next(), Some(QualityTier::Low));
    assert_eq!(QualityTier::High.next(), None);
    assert_eq!("ultra_low".parse::<QualityTier>(), Ok(QualityTier::UltraLow));
    assert!("ultra".parse::<QualityTier>().is_err());
}

#[test]
fn test_ply_tier_urls() {
    let urls = generate_ply_tier_urls("/models/site/scan.ply");

    assert_eq!(urls.ultra_low, "/models/compressed/site/scan_ultra_low.ply.gz");
    assert_eq!(urls.high, "/models/compressed/site/scan_high.ply.gz");
}

#[test]
fn test_tier_suffixed_url_keeps_base() {
    let urls = generate_ply_tier_urls("/models/compressed/scan_medium.ply.gz");

    assert_eq!(urls.low, "/models/compressed/scan_low.ply.gz");
    assert_eq!(urls.medium, "/models/compressed/scan_medium.ply.gz");
}

#[test]
fn test_draco_tier_urls() {
    let urls = generate_draco_tier_urls("/models/site/scan.ply");

    assert_eq!(urls.ultra_low, "/models/draco/scan_ultra_low.drc");
    assert_eq!(urls[QualityTier::High], "/models/draco/scan_high.drc");
}

#[test]
fn test_model_requires_id() {
    let urls = TierMap::from_fn(|tier| format!("/{tier}.ply"));

    assert_eq!(
        ModelAsset::new(" ", urls, CodecKind::Ply).unwrap_err(),
        ConfigError::EmptyId,
    );
}

#[test]
fn test_model_requires_every_tier_url() {
    let mut urls = TierMap::from_fn(|tier| format!("/{tier}.ply"));
    urls.medium = String::new();

    assert_eq!(
        ModelAsset::new("scan", urls, CodecKind::Ply).unwrap_err(),
        ConfigError::MissingTierUrl {
            id: "scan".to_string(),
            tier: QualityTier::Medium,
        },
    );
}

#[test]
fn test_viewer_config() {
    let json = br##"{
        "resolution": 0.5,
        "progressiveLoading": false,
        "models": [
            {
                "id": "terrain",
                "url": "/models/terrain.ply",
                "position": [1, 2, 3],
                "color": "#ff0000",
                "pointSize": 0.02
            },
            {
                "id": "tower",
                "name": "Tower",
                "useDraco": true,
                "dracoUrls": {
                    "ultra_low": "/d/t_ultra_low.drc",
                    "low": "/d/t_low.drc",
                    "medium": "/d/t_medium.drc",
                    "high": "/d/t_high.drc"
                },
                "visible": false
            }
        ]
    }"##;

    let config = ViewerConfig::from_json(json).unwrap();
    let models = config.model_list().unwrap();

    assert_eq!(models.len(), 2);

    let terrain = &models.0[0];
    assert_eq!(terrain.codec(), CodecKind::Ply);
    assert_eq!(terrain.name, "terrain");
    assert_eq!(
        terrain.url(QualityTier::Low),
        "/models/compressed/terrain_low.ply.gz",
    );
    assert_eq!(terrain.transform.position.to_array(), [1.0, 2.0, 3.0]);
    assert_eq!(terrain.transform.color, Srgba::rgb(1.0, 0.0, 0.0));
    assert_eq!(terrain.transform.point_size, 0.02);
    assert!(terrain.is_visible());

    let tower = &models.0[1];
    assert_eq!(tower.codec(), CodecKind::Draco);
    assert_eq!(tower.name, "Tower");
    assert_eq!(tower.url(QualityTier::Medium), "/d/t_medium.drc");
    assert!(!tower.is_visible());

    let mut settings = StreamingSettings::default();
    config.apply(&mut settings).unwrap();

    assert_eq!(settings.resolution, 0.5);
    assert!(!settings.progressive_loading);
}

#[test]
fn test_config_without_urls() {
    let config = ViewerConfig::from_json(br#"{ "models": [{ "id": "lost" }] }"#).unwrap();

    assert_eq!(
        config.model_list().unwrap_err(),
        ConfigError::MissingUrls("lost".to_string()),
    );
}

#[test]
fn test_config_invalid_color() {
    let config = ViewerConfig::from_json(
        br#"{ "models": [{ "id": "a", "url": "/a.ply", "color": "purple-ish" }] }"#,
    )
    .unwrap();

    assert!(matches!(
        config.model_list(),
        Err(ConfigError::InvalidColor { .. }),
    ));
}

#[test]
fn test_duplicate_ids() {
    let config = ViewerConfig::from_json(
        br#"{ "models": [{ "id": "a", "url": "/a.ply" }, { "id": "a", "url": "/b.ply" }] }"#,
    )
    .unwrap();

    assert_eq!(
        config.model_list(),
        Err(ConfigError::DuplicateId("a".to_string())),
    );
}

#[test]
fn test_invalid_json() {
    assert!(matches!(
        ViewerConfig::from_json(b"{ models: "),
        Err(ConfigError::Json(_)),
    ));
}

#[test]
fn test_settings_validation() {
    let mut settings = StreamingSettings::default();
    assert!(settings.validate().is_ok());

    settings.resolution = 0.0;
    assert_eq!(settings.validate(), Err(ConfigError::InvalidResolution(0.0)));

    let settings = StreamingSettings {
        max_attempts: 0,
        ..Default::default()
    };
    assert_eq!(settings.validate(), Err(ConfigError::InvalidAttempts));

    let settings = StreamingSettings {
        stall_timeout_secs: None,
        ..Default::default()
    };
    assert!(settings.validate().is_ok());
    assert!(settings.stall_timeout().is_none());

    let config = ViewerConfig {
        resolution: Some(-1.0),
        ..Default::default()
    };
    assert!(config.apply(&mut StreamingSettings::default()).is_err());
}

#[test]
fn test_same_source() {
    let urls = TierMap::from_fn(|tier| format!("/{tier}.ply"));
    let a = ModelAsset::new("a", urls.clone(), CodecKind::Ply).unwrap();
    let moved = a.clone().with_name("renamed");
    let other = ModelAsset::new("a", urls.map(|_, url| format!("{url}.gz")), CodecKind::Ply).unwrap();

    assert!(a.same_source(&moved));
    assert!(!a.same_source(&other));
}
