use std::sync::Arc;

use bevy::{
    app::AppExit,
    core_pipeline::tonemapping::Tonemapping,
    diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin},
    prelude::*,
    tasks::{IoTaskPool, Task, block_on, futures_lite::future},
};
use bevy_args::{BevyArgsPlugin, parse_args};
use bevy_inspector_egui::{bevy_egui::EguiPlugin, quick::WorldInspectorPlugin};
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};

use bevy_progressive_points::{
    CodecKind, DecoderConfig, DecoderManager, FetchError, FleetTargetAdvanced, ModelAsset,
    ModelReady, PointCloudModels, PointStreamer, ProgressivePointsPlugin, QualityTier,
    StreamingSettings, TierFailed, TierMap, ViewerConfig,
    io::{
        ply::{gzip, write_ascii_ply},
        source::{AssetReaderSource, MemorySource, PayloadSource},
    },
    random_points, sample,
    utils::{PointCloudViewer, setup_hooks},
};


#[derive(Resource)]
struct PendingConfig(Task<Result<Vec<u8>, FetchError>>);


fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Transform::from_translation(Vec3::new(0.0, 1.5, 25.0)),
        Camera3d::default(),
        Tonemapping::None,
        PanOrbitCamera {
            allow_upside_down: true,
            ..default()
        },
    ));
}

fn request_config(mut commands: Commands, viewer: Res<PointCloudViewer>) {
    if viewer.config.is_empty() {
        return;
    }

    info!("loading viewer config {}", viewer.config);

    let location = viewer.config.clone();
    let task = IoTaskPool::get().spawn(async move {
        AssetReaderSource::platform_default().fetch(&location).await
    });
    commands.insert_resource(PendingConfig(task));
}

fn apply_config(
    mut commands: Commands,
    pending: Option<ResMut<PendingConfig>>,
    viewer: Res<PointCloudViewer>,
    mut settings: ResMut<StreamingSettings>,
    mut models: ResMut<PointCloudModels>,
) {
    let Some(mut pending) = pending else {
        return;
    };

    let Some(result) = block_on(future::poll_once(&mut pending.0)) else {
        return;
    };
    commands.remove_resource::<PendingConfig>();

    let config = match result
        .map_err(|err| err.to_string())
        .and_then(|bytes| ViewerConfig::from_json(&bytes).map_err(|err| err.to_string()))
    {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load viewer config {}: {}", viewer.config, err);
            return;
        }
    };

    let mut next = settings.clone();
    if let Err(err) = config.apply(&mut next) {
        error!("invalid viewer settings: {}", err);
        return;
    }
    apply_overrides(&viewer, &mut next);

    match config.model_list() {
        Ok(list) => {
            info!("loaded {} models", list.len());
            *settings = next;
            models.0 = list.0;
        }
        Err(err) => error!("invalid model list: {}", err),
    }
}

fn apply_overrides(viewer: &PointCloudViewer, settings: &mut StreamingSettings) {
    if let Some(resolution) = viewer.resolution {
        settings.resolution = resolution;
    }

    if let Some(progressive_loading) = viewer.progressive_loading {
        settings.progressive_loading = progressive_loading;
    }
}


// every tier of a random cloud, served from memory
fn random_cloud_streamer(
    count: usize,
    settings: StreamingSettings,
) -> (PointStreamer, ModelAsset) {
    let cloud = random_points(count, 42);
    let source = MemorySource::new();

    let urls = TierMap::from_fn(|tier: QualityTier| format!("/random/cloud_{tier}.ply.gz"));
    for (tier, url) in urls.iter() {
        let tier_cloud = sample(&cloud, tier.source_ratio());
        let payload = gzip(write_ascii_ply(&tier_cloud).as_bytes())
            .expect("in-memory gzip failed");
        source.insert(url.clone(), payload);
    }

    let model = ModelAsset::new("random", urls, CodecKind::Ply)
        .expect("generated tier urls are valid")
        .with_name(format!("random_{count}"));

    let streamer = PointStreamer::new(
        settings,
        Arc::new(source),
        Arc::new(DecoderManager::platform_default(DecoderConfig::default())),
    )
    .expect("invalid streaming settings");

    (streamer, model)
}


fn log_ready(mut ready: EventReader<ModelReady>) {
    for event in ready.read() {
        info!("model {} ready at {}", event.model, event.tier);
    }
}

fn log_failures(mut failed: EventReader<TierFailed>) {
    for event in failed.read() {
        warn!("model {} failed {}: {}", event.model, event.tier, event.error);
    }
}

fn log_target(mut advanced: EventReader<FleetTargetAdvanced>) {
    for event in advanced.read() {
        info!("fleet target {}", event.0);
    }
}


fn viewer_app() {
    let config = parse_args::<PointCloudViewer>();
    let mut app = App::new();

    #[cfg(target_arch = "wasm32")]
    let primary_window = Some(Window {
        fit_canvas_to_parent: true,
        mode: bevy::window::WindowMode::Windowed,
        present_mode: bevy::window::PresentMode::AutoVsync,
        prevent_default_event_handling: true,
        title: config.name.clone(),
        ..default()
    });

    #[cfg(not(target_arch = "wasm32"))]
    let primary_window = Some(Window {
        mode: bevy::window::WindowMode::Windowed,
        present_mode: bevy::window::PresentMode::AutoVsync,
        prevent_default_event_handling: false,
        resolution: (config.width, config.height).into(),
        title: config.name.clone(),
        ..default()
    });

    app.insert_resource(ClearColor(Color::srgb_u8(0, 0, 0)));
    app.add_plugins(
        DefaultPlugins
            .set(ImagePlugin::default_nearest())
            .set(WindowPlugin {
                primary_window,
                ..default()
            }),
    );
    app.add_plugins(BevyArgsPlugin::<PointCloudViewer>::default());
    app.add_plugins(PanOrbitCameraPlugin);

    if config.editor {
        app.add_plugins(EguiPlugin {
            enable_multipass_for_primary_context: true,
        });
        app.add_plugins(WorldInspectorPlugin::new());
    }

    if config.press_esc_close {
        app.add_systems(Update, esc_close);
    }

    if config.show_fps {
        app.add_plugins(FrameTimeDiagnosticsPlugin::default());
        app.add_systems(Startup, fps_display_setup);
        app.add_systems(Update, fps_update_system);
    }

    let mut settings = StreamingSettings::default();
    apply_overrides(&config, &mut settings);

    if config.config.is_empty() && config.point_count > 0 {
        println!("generating {} points", config.point_count);

        let (streamer, model) = random_cloud_streamer(config.point_count, settings.clone());
        app.insert_resource(streamer);
        app.insert_resource(PointCloudModels(vec![model]));
    }
    app.insert_resource(settings);

    app.add_plugins(ProgressivePointsPlugin::default());
    app.add_systems(Startup, (setup_camera, request_config));
    app.add_systems(Update, (apply_config, log_ready, log_failures, log_target));

    app.run();
}


pub fn esc_close(keys: Res<ButtonInput<KeyCode>>, mut exit: EventWriter<AppExit>) {
    if keys.just_pressed(KeyCode::Escape) {
        exit.write(AppExit::Success);
    }
}

fn fps_display_setup(mut commands: Commands) {
    commands.spawn((
        Text::new("fps: "),
        TextFont {
            font_size: 32.0,
            ..default()
        },
        TextColor(Color::WHITE),
        Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(5.0),
            left: Val::Px(15.0),
            ..default()
        },
        FpsText,
    ));
}

#[derive(Component)]
struct FpsText;

fn fps_update_system(
    diagnostics: Res<DiagnosticsStore>,
    mut query: Query<&mut Text, With<FpsText>>,
) {
    for mut text in &mut query {
        if let Some(fps) = diagnostics.get(&FrameTimeDiagnosticsPlugin::FPS) {
            if let Some(value) = fps.smoothed() {
                **text = format!("fps: {value:.2}");
            }
        }
    }
}


pub fn main() {
    setup_hooks();
    viewer_app();
}
