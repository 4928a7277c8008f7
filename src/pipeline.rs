use std::{borrow::Cow, collections::HashMap, time::Duration};

use bevy::log::debug;

use crate::{
    cloud::PointBuffer,
    error::{ConfigError, LoadError},
    fleet::FleetScheduler,
    load::LoadJob,
    model::{ModelAsset, ModelId},
    quality::{ModelEvent, ModelLoadState, TierRequest},
    settings::{SchedulingMode, StreamingSettings},
    tier::QualityTier,
};


#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    /// first tier of a model finished loading, emitted once per model state
    ModelReady {
        model: ModelId,
        tier: QualityTier,
    },
    TierLoaded {
        model: ModelId,
        tier: QualityTier,
    },
    TierFailed {
        model: ModelId,
        tier: QualityTier,
        error: LoadError,
    },
    TargetAdvanced(QualityTier),
}


/// Identifies the renderable buffer of one model.
///
/// Each model state gets a fresh generation, so a reloaded model never
/// repeats a revision the renderer has already seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderRevision {
    pub generation: u64,
    pub state: u64,
    pub settings: u64,
}


/// Tier sequence walked by a model when no scheduler directs it.
pub fn fallback_sequence(progressive: bool, final_tier: QualityTier) -> Vec<QualityTier> {
    if progressive {
        [QualityTier::UltraLow, QualityTier::Low]
            .into_iter()
            .filter(|tier| *tier <= final_tier)
            .collect()
    } else {
        vec![final_tier]
    }
}


/// Sans-io streaming orchestrator.
///
/// The pipeline never performs io itself: [`StreamingPipeline::poll`] hands
/// out [`LoadJob`]s, the caller runs them (see [`crate::load::load_tier`]) and
/// reports each outcome through [`StreamingPipeline::complete`]. Time is
/// supplied by the caller as the elapsed duration since startup.
#[derive(Debug)]
pub struct StreamingPipeline {
    settings: StreamingSettings,
    models: Vec<ModelAsset>,
    states: HashMap<ModelId, ModelLoadState>,
    generations: HashMap<ModelId, u64>,
    next_generation: u64,
    fleet: FleetScheduler,
    settings_revision: u64,
    events: Vec<PipelineEvent>,
}

impl StreamingPipeline {
    pub fn new(settings: StreamingSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let fleet = FleetScheduler::new(
            settings.progressive_loading,
            settings.max_tier,
            settings.max_attempts,
            settings.stall_timeout(),
        );

        Ok(Self {
            settings,
            models: Vec::new(),
            states: HashMap::new(),
            generations: HashMap::new(),
            next_generation: 0,
            fleet,
            settings_revision: 0,
            events: Vec::new(),
        })
    }

    pub fn settings(&self) -> &StreamingSettings {
        &self.settings
    }

    pub fn models(&self) -> &[ModelAsset] {
        &self.models
    }

    pub fn fleet(&self) -> &FleetScheduler {
        &self.fleet
    }

    pub fn target_tier(&self) -> QualityTier {
        self.fleet.target_tier()
    }

    pub fn state(&self, id: &ModelId) -> Option<&ModelLoadState> {
        self.states.get(id)
    }

    fn visible_ids(&self) -> Vec<ModelId> {
        self.models
            .iter()
            .filter(|model| model.is_visible())
            .map(|model| model.id.clone())
            .collect()
    }

    fn new_state(&self, asset: &ModelAsset, now: Duration) -> ModelLoadState {
        let mut state = ModelLoadState::new(asset);
        if self.settings.scheduling == SchedulingMode::Independent {
            state.start_sequence(
                fallback_sequence(self.settings.progressive_loading, self.settings.max_tier),
                now,
            );
        }
        state
    }

    fn teardown(&mut self, id: &ModelId) {
        if let Some(mut state) = self.states.remove(id) {
            state.teardown();
        }
        self.generations.remove(id);
        self.fleet.remove_model(id);
    }

    /// Replaces the model list.
    ///
    /// Removed models and models whose payload locations changed are torn down,
    /// cancelling their loads; transform and visibility changes keep every
    /// cached tier.
    pub fn sync_models(&mut self, models: &[ModelAsset], now: Duration) {
        let removed = self
            .states
            .keys()
            .filter(|id| !models.iter().any(|model| &model.id == *id))
            .cloned()
            .collect::<Vec<_>>();

        for id in removed {
            debug!(model = %id, "model removed, tearing down");
            self.teardown(&id);
        }

        for model in models {
            let source_changed = self
                .models
                .iter()
                .find(|existing| existing.id == model.id)
                .is_some_and(|existing| !existing.same_source(model));

            if source_changed {
                debug!(model = %model.id, "model source changed, reloading");
                self.teardown(&model.id);
            }

            if !self.states.contains_key(&model.id) {
                let state = self.new_state(model, now);
                self.states.insert(model.id.clone(), state);

                self.next_generation += 1;
                self.generations.insert(model.id.clone(), self.next_generation);
            }
        }

        self.models = models.to_vec();
    }

    /// Applies changed global controls; cached tiers are never reloaded.
    pub fn apply_settings(
        &mut self,
        settings: &StreamingSettings,
        now: Duration,
    ) -> Result<(), ConfigError> {
        settings.validate()?;

        if settings.resolution != self.settings.resolution {
            self.settings_revision += 1;
        }

        if settings.max_tier != self.settings.max_tier {
            if let Some(tier) = self.fleet.set_final_tier(settings.max_tier) {
                self.events.push(PipelineEvent::TargetAdvanced(tier));
            }
        }

        if settings.progressive_loading != self.settings.progressive_loading {
            if let Some(tier) = self.fleet.set_progressive(settings.progressive_loading) {
                self.events.push(PipelineEvent::TargetAdvanced(tier));
            }
        }

        self.fleet.set_max_attempts(settings.max_attempts);
        self.fleet.set_stall_timeout(settings.stall_timeout());

        let scheduling_changed = settings.scheduling != self.settings.scheduling;
        self.settings = settings.clone();

        if scheduling_changed {
            let sequence =
                fallback_sequence(self.settings.progressive_loading, self.settings.max_tier);
            for state in self.states.values_mut() {
                match self.settings.scheduling {
                    SchedulingMode::Independent => state.start_sequence(sequence.clone(), now),
                    SchedulingMode::Fleet => state.stop_sequence(),
                }
            }
        }

        Ok(())
    }

    pub fn set_resolution(&mut self, resolution: f32) -> Result<(), ConfigError> {
        let settings = StreamingSettings {
            resolution,
            ..self.settings.clone()
        };
        settings.validate()?;

        if resolution != self.settings.resolution {
            self.settings.resolution = resolution;
            self.settings_revision += 1;
        }

        Ok(())
    }

    pub fn set_progressive(&mut self, progressive: bool) {
        if progressive == self.settings.progressive_loading {
            return;
        }

        self.settings.progressive_loading = progressive;
        if let Some(tier) = self.fleet.set_progressive(progressive) {
            self.events.push(PipelineEvent::TargetAdvanced(tier));
        }
    }

    fn advance_fleet(&mut self) {
        if self.settings.scheduling != SchedulingMode::Fleet {
            return;
        }

        let visible = self.visible_ids();
        for tier in self.fleet.advance(&visible) {
            self.events.push(PipelineEvent::TargetAdvanced(tier));
        }
    }

    /// Jobs to start this frame.
    pub fn poll(&mut self, now: Duration) -> Vec<LoadJob> {
        let mut jobs = Vec::new();

        for state in self.states.values_mut() {
            if let Some(TierRequest::Dispatch(job)) = state.poll_queue() {
                jobs.push(job);
            }
        }

        match self.settings.scheduling {
            SchedulingMode::Fleet => {
                self.fleet.expire_stalled(now);
                self.advance_fleet();

                let visible = self.visible_ids();
                let states = &self.states;
                let dispatches = self.fleet.next_dispatch(
                    &visible,
                    |id| states.get(id).is_none_or(ModelLoadState::is_loading),
                    now,
                );

                for (id, tier) in dispatches {
                    let Some(state) = self.states.get_mut(&id) else {
                        self.fleet.release(&id);
                        continue;
                    };

                    match state.request(tier) {
                        TierRequest::Dispatch(job) => {
                            debug!(model = %id, %tier, "dispatching tier");
                            jobs.push(job);
                        }
                        TierRequest::Switched | TierRequest::AlreadyCurrent => {
                            self.fleet.on_tier_loaded(&id, tier);
                        }
                        _ => self.fleet.release(&id),
                    }
                }
            }
            SchedulingMode::Independent => {
                for model in &self.models {
                    if !model.is_visible() {
                        continue;
                    }

                    if let Some(job) = self
                        .states
                        .get_mut(&model.id)
                        .and_then(|state| state.poll_sequence(now))
                    {
                        jobs.push(job);
                    }
                }
            }
        }

        jobs
    }

    /// Applies the outcome of a job returned by [`StreamingPipeline::poll`].
    ///
    /// Results for removed or reloaded models are discarded.
    pub fn complete(&mut self, job: LoadJob, result: Result<PointBuffer, LoadError>, now: Duration) {
        let Some(state) = self.states.get_mut(&job.model) else {
            debug!(model = %job.model, tier = %job.tier, "discarding result of removed model");
            return;
        };

        let events = state.complete(&job, result, now);

        for event in events {
            match event {
                ModelEvent::Ready(tier) => self.events.push(PipelineEvent::ModelReady {
                    model: job.model.clone(),
                    tier,
                }),
                ModelEvent::TierLoaded(tier) => {
                    self.fleet.on_tier_loaded(&job.model, tier);
                    self.events.push(PipelineEvent::TierLoaded {
                        model: job.model.clone(),
                        tier,
                    });
                }
                ModelEvent::TierFailed { tier, error } => {
                    self.fleet.on_tier_failed(&job.model, tier);
                    self.events.push(PipelineEvent::TierFailed {
                        model: job.model.clone(),
                        tier,
                        error,
                    });
                }
            }
        }

        // a result that produced no outcome must not keep the scheduler slot
        let slot_held = self
            .fleet
            .in_flight()
            .any(|(id, tier)| id == &job.model && tier == job.tier);
        let state_idle = self
            .states
            .get(&job.model)
            .is_none_or(|state| !state.is_loading());
        if slot_held && state_idle {
            self.fleet.release(&job.model);
        }

        self.advance_fleet();
    }

    pub fn drain_events(&mut self) -> Vec<PipelineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Current tier of `id` sampled at the configured resolution.
    pub fn renderable(&self, id: &ModelId) -> Option<Cow<'_, PointBuffer>> {
        self.states
            .get(id)?
            .renderable(self.settings.resolution)
    }

    /// Changes whenever the renderable buffer of `id` changes.
    pub fn render_revision(&self, id: &ModelId) -> Option<RenderRevision> {
        let state = self.states.get(id)?;

        Some(RenderRevision {
            generation: self.generations.get(id).copied().unwrap_or_default(),
            state: state.revision(),
            settings: self.settings_revision,
        })
    }

    /// Tears down every model state.
    pub fn clear(&mut self) {
        let ids = self.states.keys().cloned().collect::<Vec<_>>();
        for id in ids {
            self.teardown(&id);
        }
        self.models.clear();
    }
}
