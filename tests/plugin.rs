use std::{sync::Arc, time::Duration};

use bevy::prelude::*;

use bevy_progressive_points::{
    CodecKind,
    DecoderConfig,
    DecoderManager,
    FleetTargetAdvanced,
    ModelAsset,
    ModelReady,
    ModelTransform,
    PointCloudEntity,
    PointCloudModels,
    PointRenderPlugin,
    PointStreamer,
    PointStreamingPlugin,
    QualityTier,
    StreamingSettings,
    TierMap,
    io::{
        ply::{gzip, write_ascii_ply},
        source::MemorySource,
    },
    random_points,
    sample,
};


#[derive(Resource, Default)]
struct Seen {
    ready: Vec<ModelReady>,
    targets: Vec<QualityTier>,
}

fn record(
    mut ready: EventReader<ModelReady>,
    mut advanced: EventReader<FleetTargetAdvanced>,
    mut seen: ResMut<Seen>,
) {
    seen.ready.extend(ready.read().cloned());
    seen.targets.extend(advanced.read().map(|event| event.0));
}

fn store_tiers(source: &MemorySource, prefix: &str, points: usize) -> TierMap<String> {
    let cloud = random_points(points, 3);
    let urls = TierMap::from_fn(|tier: QualityTier| format!("/{prefix}_{tier}.ply.gz"));

    for (tier, url) in urls.iter() {
        let payload = gzip(write_ascii_ply(&sample(&cloud, tier.source_ratio())).as_bytes()).unwrap();
        source.insert(url.clone(), payload);
    }

    urls
}

fn streaming_app(settings: StreamingSettings) -> App {
    let source = Arc::new(MemorySource::new());
    let urls = store_tiers(&source, "scan", 400);

    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    insert_streamer(&mut app, settings, source);
    app.insert_resource(PointCloudModels(vec![
        ModelAsset::new("scan", urls, CodecKind::Ply).unwrap(),
    ]));
    app.add_plugins(PointStreamingPlugin::default());
    app.init_resource::<Seen>();
    app.add_systems(PostUpdate, record);

    app
}

fn insert_streamer(app: &mut App, settings: StreamingSettings, source: Arc<MemorySource>) {
    let streamer = PointStreamer::new(
        settings.clone(),
        source,
        Arc::new(DecoderManager::unavailable(DecoderConfig::default())),
    )
    .unwrap();

    app.insert_resource(settings);
    app.insert_resource(streamer);
}

fn render_app(source: Arc<MemorySource>, models: Vec<ModelAsset>) -> App {
    let settings = StreamingSettings {
        progressive_loading: false,
        ..Default::default()
    };

    let mut app = App::new();
    app.add_plugins((MinimalPlugins, AssetPlugin::default()));
    app.init_asset::<Mesh>();
    app.init_asset::<StandardMaterial>();
    insert_streamer(&mut app, settings, source);
    app.insert_resource(PointCloudModels(models));
    app.add_plugins((PointStreamingPlugin::default(), PointRenderPlugin));

    app
}

fn mesh_points(world: &mut World) -> Option<usize> {
    let mut clouds = world.query::<(&PointCloudEntity, &Mesh3d)>();
    let handle = clouds.iter(world).next()?.1.0.clone();

    world
        .resource::<Assets<Mesh>>()
        .get(&handle)
        .map(Mesh::count_vertices)
}

fn cloud_material(world: &mut World) -> Handle<StandardMaterial> {
    let mut clouds = world.query::<(&PointCloudEntity, &MeshMaterial3d<StandardMaterial>)>();
    clouds.single(world).unwrap().1.0.clone()
}

fn run_until(app: &mut App, mut done: impl FnMut(&mut World) -> bool) {
    for _ in 0..500 {
        app.update();
        if done(app.world_mut()) {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }

    panic!("streaming did not settle");
}


#[test]
fn test_plugin_streams_every_tier() {
    let mut app = streaming_app(StreamingSettings::default());

    run_until(&mut app, |world| {
        world.resource::<PointStreamer>().pipeline().target_tier() == QualityTier::High
            && world
                .resource::<PointStreamer>()
                .pipeline()
                .fleet()
                .completed_count(QualityTier::High)
                == 1
    });
    app.update();

    let seen = app.world().resource::<Seen>();
    assert_eq!(
        seen.ready,
        vec![ModelReady {
            model: "scan".into(),
            tier: QualityTier::UltraLow,
        }],
    );
    assert_eq!(
        seen.targets,
        vec![QualityTier::Low, QualityTier::Medium, QualityTier::High],
    );

    let pipeline = app.world().resource::<PointStreamer>().pipeline();
    assert_eq!(pipeline.renderable(&"scan".into()).unwrap().vertex_count(), 400);
}

#[test]
fn test_settings_resource_drives_resolution() {
    let settings = StreamingSettings {
        progressive_loading: false,
        ..Default::default()
    };
    let mut app = streaming_app(settings);

    run_until(&mut app, |world| {
        world
            .resource::<PointStreamer>()
            .pipeline()
            .renderable(&"scan".into())
            .is_some()
    });

    app.world_mut().resource_mut::<StreamingSettings>().resolution = 0.25;
    app.update();

    let pipeline = app.world().resource::<PointStreamer>().pipeline();
    assert_eq!(pipeline.settings().resolution, 0.25);
    assert_eq!(pipeline.renderable(&"scan".into()).unwrap().vertex_count(), 100);
    assert!(app.world().resource::<Seen>().targets.is_empty());
}

#[test]
fn test_app_exit_shuts_down_decoder() {
    let mut app = streaming_app(StreamingSettings::default());
    app.update();

    app.world_mut().send_event(AppExit::Success);
    app.update();

    assert!(app.world().resource::<PointStreamer>().decoders().is_shut_down());
}

#[test]
fn test_reloaded_model_replaces_rendered_mesh() {
    let source = Arc::new(MemorySource::new());
    let old_urls = store_tiers(&source, "old", 400);
    let new_urls = store_tiers(&source, "new", 120);

    let mut app = render_app(
        source,
        vec![ModelAsset::new("scan", old_urls, CodecKind::Ply).unwrap()],
    );
    run_until(&mut app, |world| mesh_points(world) == Some(400));

    app.insert_resource(PointCloudModels(vec![
        ModelAsset::new("scan", new_urls, CodecKind::Ply).unwrap(),
    ]));
    run_until(&mut app, |world| mesh_points(world) == Some(120));

    let mut clouds = app.world_mut().query::<&PointCloudEntity>();
    assert_eq!(clouds.iter(app.world()).count(), 1);
}

#[test]
fn test_transform_change_reuses_material() {
    let source = Arc::new(MemorySource::new());
    let urls = store_tiers(&source, "scan", 400);
    let model = ModelAsset::new("scan", urls, CodecKind::Ply).unwrap();

    let mut app = render_app(source, vec![model.clone()]);
    run_until(&mut app, |world| mesh_points(world).is_some());

    let material = cloud_material(app.world_mut());
    let materials = app.world().resource::<Assets<StandardMaterial>>().len();

    let tinted = model.with_transform(ModelTransform {
        color: Srgba::RED,
        ..Default::default()
    });
    app.insert_resource(PointCloudModels(vec![tinted]));
    app.update();

    assert_eq!(cloud_material(app.world_mut()), material);

    let assets = app.world().resource::<Assets<StandardMaterial>>();
    assert_eq!(assets.len(), materials);
    assert_eq!(assets.get(&material).unwrap().base_color, Color::from(Srgba::RED));
    assert_eq!(mesh_points(app.world_mut()), Some(400));
}
