use std::sync::Arc;

use bevy::{
    app::AppExit,
    prelude::*,
    tasks::{IoTaskPool, Task, block_on, futures_lite::future},
};

use crate::{
    cloud::PointBuffer,
    decoder::{DecoderConfig, DecoderManager},
    error::{ConfigError, LoadError},
    io::source::{AssetReaderSource, PayloadSource},
    load::{LoadJob, load_tier},
    model::{ModelAsset, ModelId},
    pipeline::{PipelineEvent, StreamingPipeline},
    settings::StreamingSettings,
    tier::QualityTier,
};


/// Ordered model list owned by the embedding application.
#[derive(Resource, Clone, Debug, Default)]
pub struct PointCloudModels(pub Vec<ModelAsset>);


#[derive(Event, Clone, Debug, PartialEq)]
pub struct ModelReady {
    pub model: ModelId,
    pub tier: QualityTier,
}

#[derive(Event, Clone, Debug, PartialEq)]
pub struct TierLoaded {
    pub model: ModelId,
    pub tier: QualityTier,
}

#[derive(Event, Clone, Debug, PartialEq)]
pub struct TierFailed {
    pub model: ModelId,
    pub tier: QualityTier,
    pub error: LoadError,
}

#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct FleetTargetAdvanced(pub QualityTier);


/// Pipeline plus the shared io collaborators its jobs run against.
#[derive(Resource)]
pub struct PointStreamer {
    pipeline: StreamingPipeline,
    source: Arc<dyn PayloadSource>,
    decoders: Arc<DecoderManager>,
}

impl PointStreamer {
    pub fn new(
        settings: StreamingSettings,
        source: Arc<dyn PayloadSource>,
        decoders: Arc<DecoderManager>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            pipeline: StreamingPipeline::new(settings)?,
            source,
            decoders,
        })
    }

    /// Asset directory reader and the platform geometry decoder.
    pub fn platform_default(
        settings: StreamingSettings,
        decoder: DecoderConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(
            settings,
            Arc::new(AssetReaderSource::platform_default()),
            Arc::new(DecoderManager::platform_default(decoder)),
        )
    }

    pub fn pipeline(&self) -> &StreamingPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut StreamingPipeline {
        &mut self.pipeline
    }

    pub fn decoders(&self) -> &Arc<DecoderManager> {
        &self.decoders
    }

    fn spawn(&self, job: LoadJob) -> PendingLoad {
        let source = self.source.clone();
        let decoders = self.decoders.clone();
        let task_job = job.clone();

        let task = IoTaskPool::get().spawn(async move {
            load_tier(&task_job, source.as_ref(), decoders.as_ref()).await
        });

        PendingLoad { job, task }
    }
}


struct PendingLoad {
    job: LoadJob,
    task: Task<Result<PointBuffer, LoadError>>,
}

#[derive(Resource, Default)]
pub struct InFlightLoads(Vec<PendingLoad>);

impl InFlightLoads {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}


#[derive(Default)]
pub struct PointStreamingPlugin {
    pub decoder: DecoderConfig,
}

impl Plugin for PointStreamingPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<StreamingSettings>();

        app.init_resource::<StreamingSettings>();
        app.init_resource::<PointCloudModels>();
        app.init_resource::<InFlightLoads>();

        if !app.world().contains_resource::<PointStreamer>() {
            let settings = app.world().resource::<StreamingSettings>().clone();
            let streamer = PointStreamer::platform_default(settings, self.decoder.clone())
                .or_else(|err| {
                    error!(%err, "invalid streaming settings, using defaults");
                    PointStreamer::platform_default(
                        StreamingSettings::default(),
                        self.decoder.clone(),
                    )
                });

            match streamer {
                Ok(streamer) => {
                    app.insert_resource(streamer);
                }
                Err(err) => error!(%err, "point streaming disabled"),
            }
        }

        app.add_event::<ModelReady>();
        app.add_event::<TierLoaded>();
        app.add_event::<TierFailed>();
        app.add_event::<FleetTargetAdvanced>();

        app.add_systems(
            Update,
            (
                sync_models,
                apply_settings,
                dispatch_loads,
                poll_loads,
                emit_events,
            )
                .chain()
                .run_if(resource_exists::<PointStreamer>),
        );

        app.add_systems(
            Last,
            shutdown_decoder.run_if(resource_exists::<PointStreamer>),
        );
    }
}


fn sync_models(
    models: Res<PointCloudModels>,
    mut streamer: ResMut<PointStreamer>,
    time: Res<Time>,
) {
    if !models.is_changed() {
        return;
    }

    streamer.pipeline.sync_models(&models.0, time.elapsed());
}

fn apply_settings(
    settings: Res<StreamingSettings>,
    mut streamer: ResMut<PointStreamer>,
    time: Res<Time>,
) {
    if !settings.is_changed() || streamer.pipeline.settings() == settings.as_ref() {
        return;
    }

    if let Err(err) = streamer.pipeline.apply_settings(&settings, time.elapsed()) {
        error!(%err, "rejected streaming settings");
    }
}

fn dispatch_loads(
    mut streamer: ResMut<PointStreamer>,
    mut loads: ResMut<InFlightLoads>,
    time: Res<Time>,
) {
    let jobs = streamer.pipeline.poll(time.elapsed());
    for job in jobs {
        let pending = streamer.spawn(job);
        loads.0.push(pending);
    }
}

fn poll_loads(
    mut streamer: ResMut<PointStreamer>,
    mut loads: ResMut<InFlightLoads>,
    time: Res<Time>,
) {
    let mut finished = Vec::new();
    loads.0.retain_mut(|pending| {
        match block_on(future::poll_once(&mut pending.task)) {
            Some(result) => {
                finished.push((pending.job.clone(), result));
                false
            }
            None => true,
        }
    });

    let now = time.elapsed();
    for (job, result) in finished {
        streamer.pipeline.complete(job, result, now);
    }
}

fn emit_events(
    mut streamer: ResMut<PointStreamer>,
    mut ready: EventWriter<ModelReady>,
    mut loaded: EventWriter<TierLoaded>,
    mut failed: EventWriter<TierFailed>,
    mut advanced: EventWriter<FleetTargetAdvanced>,
) {
    for event in streamer.pipeline.drain_events() {
        match event {
            PipelineEvent::ModelReady { model, tier } => {
                ready.write(ModelReady { model, tier });
            }
            PipelineEvent::TierLoaded { model, tier } => {
                loaded.write(TierLoaded { model, tier });
            }
            PipelineEvent::TierFailed { model, tier, error } => {
                failed.write(TierFailed { model, tier, error });
            }
            PipelineEvent::TargetAdvanced(tier) => {
                advanced.write(FleetTargetAdvanced(tier));
            }
        }
    }
}

fn shutdown_decoder(mut exit: EventReader<AppExit>, streamer: Res<PointStreamer>) {
    if exit.read().next().is_some() {
        streamer.decoders.shutdown();
    }
}
