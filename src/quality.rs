use std::{borrow::Cow, sync::Arc, time::Duration};

use bevy::log::{debug, info, warn};

use crate::{
    cloud::PointBuffer,
    error::LoadError,
    load::{CancelToken, LoadJob},
    model::{CodecKind, ModelAsset, ModelId},
    sample::sample,
    tier::{QualityTier, TierMap},
};


pub const ULTRA_LOW_SETTLE: Duration = Duration::from_millis(500);
pub const TIER_SETTLE: Duration = Duration::from_millis(1000);

/// Pause after `tier` before the sequential walk requests the next tier.
pub fn settle_delay(tier: QualityTier) -> Duration {
    match tier {
        QualityTier::UltraLow => ULTRA_LOW_SETTLE,
        _ => TIER_SETTLE,
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading(QualityTier),
    Ready(QualityTier),
}

#[derive(Debug)]
pub enum TierRequest {
    /// the tier is already exposed for rendering
    AlreadyCurrent,
    /// the tier was cached, exposed without a fetch
    Switched,
    /// the tier is the one in flight
    AlreadyLoading,
    /// another tier is in flight, this one replaces any earlier queued request
    Queued,
    /// the caller must run this job and report it through [`ModelLoadState::complete`]
    Dispatch(LoadJob),
    /// the state was torn down
    Ignored,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelEvent {
    Ready(QualityTier),
    TierLoaded(QualityTier),
    TierFailed {
        tier: QualityTier,
        error: LoadError,
    },
}


#[derive(Clone, Debug)]
struct TierSequence {
    tiers: Vec<QualityTier>,
    next: usize,
    resume_at: Duration,
}


/// Per-model quality state machine.
///
/// Tier buffers are cached append-only for the lifetime of the state. At most
/// one tier load is in flight; results of loads the state no longer expects are
/// dropped without touching the cache.
#[derive(Debug)]
pub struct ModelLoadState {
    id: ModelId,
    urls: TierMap<String>,
    codec: CodecKind,
    cache: TierMap<Option<Arc<PointBuffer>>>,
    current: Option<QualityTier>,
    in_flight: Option<QualityTier>,
    queued: Option<QualityTier>,
    token: CancelToken,
    ready_notified: bool,
    failures: TierMap<u32>,
    sequence: Option<TierSequence>,
    revision: u64,
    torn_down: bool,
}

impl ModelLoadState {
    pub fn new(asset: &ModelAsset) -> Self {
        Self {
            id: asset.id.clone(),
            urls: asset.urls().clone(),
            codec: asset.codec(),
            cache: TierMap::default(),
            current: None,
            in_flight: None,
            queued: None,
            token: CancelToken::new(),
            ready_notified: false,
            failures: TierMap::default(),
            sequence: None,
            revision: 0,
            torn_down: false,
        }
    }

    pub fn id(&self) -> &ModelId {
        &self.id
    }

    pub fn phase(&self) -> LoadPhase {
        match (self.in_flight, self.current) {
            (Some(tier), _) => LoadPhase::Loading(tier),
            (None, Some(tier)) => LoadPhase::Ready(tier),
            (None, None) => LoadPhase::Idle,
        }
    }

    pub fn current_tier(&self) -> Option<QualityTier> {
        self.current
    }

    pub fn in_flight(&self) -> Option<QualityTier> {
        self.in_flight
    }

    pub fn queued(&self) -> Option<QualityTier> {
        self.queued
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn has_tier(&self, tier: QualityTier) -> bool {
        self.cache[tier].is_some()
    }

    pub fn loaded_tiers(&self) -> impl Iterator<Item = QualityTier> + '_ {
        self.cache
            .iter()
            .filter(|(_, buffer)| buffer.is_some())
            .map(|(tier, _)| tier)
    }

    pub fn failures(&self, tier: QualityTier) -> u32 {
        self.failures[tier]
    }

    /// Bumped whenever the exposed buffer changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Full resolution buffer of the current tier.
    pub fn current_buffer(&self) -> Option<&Arc<PointBuffer>> {
        self.current.and_then(|tier| self.cache[tier].as_ref())
    }

    /// Current buffer sampled at `resolution`, recomputed on every call.
    pub fn renderable(&self, resolution: f32) -> Option<Cow<'_, PointBuffer>> {
        self.current_buffer()
            .map(|buffer| sample(buffer.as_ref(), resolution))
    }

    fn job(&self, tier: QualityTier) -> LoadJob {
        LoadJob {
            model: self.id.clone(),
            tier,
            location: self.urls[tier].clone(),
            codec: self.codec,
            token: self.token.clone(),
        }
    }

    fn expose(&mut self, tier: QualityTier) {
        if self.current != Some(tier) {
            self.current = Some(tier);
            self.revision += 1;
        }
    }

    /// Asks for `tier` to become the exposed tier.
    pub fn request(&mut self, tier: QualityTier) -> TierRequest {
        if self.torn_down {
            return TierRequest::Ignored;
        }

        if let Some(loading) = self.in_flight {
            if loading == tier {
                self.queued = None;
                return TierRequest::AlreadyLoading;
            }

            self.queued = Some(tier);
            return TierRequest::Queued;
        }

        if self.current == Some(tier) {
            return TierRequest::AlreadyCurrent;
        }

        if self.has_tier(tier) {
            self.expose(tier);
            debug!(model = %self.id, %tier, "switched to cached tier");
            return TierRequest::Switched;
        }

        self.in_flight = Some(tier);
        TierRequest::Dispatch(self.job(tier))
    }

    /// Re-issues a request queued behind a finished load.
    pub fn poll_queue(&mut self) -> Option<TierRequest> {
        if self.in_flight.is_some() {
            return None;
        }

        let tier = self.queued.take()?;
        Some(self.request(tier))
    }

    fn expects(&self, job: &LoadJob) -> bool {
        !self.torn_down
            && !job.token.is_cancelled()
            && job.token.same_as(&self.token)
            && job.model == self.id
            && self.in_flight == Some(job.tier)
    }

    /// Applies the outcome of a dispatched job.
    pub fn complete(
        &mut self,
        job: &LoadJob,
        result: Result<PointBuffer, LoadError>,
        now: Duration,
    ) -> Vec<ModelEvent> {
        if !self.expects(job) {
            debug!(model = %job.model, tier = %job.tier, "discarding late tier result");
            return Vec::new();
        }

        self.in_flight = None;

        if let Some(sequence) = self.sequence.as_mut() {
            sequence.resume_at = now + settle_delay(job.tier);
        }

        let mut events = Vec::new();
        match result {
            Ok(buffer) => {
                info!(
                    model = %self.id,
                    tier = %job.tier,
                    points = buffer.vertex_count(),
                    "tier loaded"
                );

                if self.cache[job.tier].is_none() {
                    self.cache[job.tier] = Some(Arc::new(buffer));
                }
                self.expose(job.tier);

                if !self.ready_notified {
                    self.ready_notified = true;
                    events.push(ModelEvent::Ready(job.tier));
                }
                events.push(ModelEvent::TierLoaded(job.tier));
            }
            Err(LoadError::Cancelled) => {
                debug!(model = %self.id, tier = %job.tier, "tier load cancelled");
            }
            Err(error) => {
                self.failures[job.tier] += 1;
                warn!(
                    model = %self.id,
                    tier = %job.tier,
                    location = %job.location,
                    %error,
                    "tier load failed"
                );
                events.push(ModelEvent::TierFailed {
                    tier: job.tier,
                    error,
                });
            }
        }

        events
    }

    /// Starts the fallback walk over `tiers`, one tier at a time.
    pub fn start_sequence(&mut self, tiers: Vec<QualityTier>, now: Duration) {
        self.sequence = Some(TierSequence {
            tiers,
            next: 0,
            resume_at: now,
        });
    }

    pub fn stop_sequence(&mut self) {
        self.sequence = None;
    }

    pub fn sequence_finished(&self) -> bool {
        self.sequence
            .as_ref()
            .is_none_or(|sequence| sequence.next >= sequence.tiers.len() && self.in_flight.is_none())
    }

    /// Advances the fallback walk once its settle delay has elapsed.
    pub fn poll_sequence(&mut self, now: Duration) -> Option<LoadJob> {
        if self.torn_down || self.in_flight.is_some() {
            return None;
        }

        let sequence = self.sequence.as_mut()?;
        if now < sequence.resume_at {
            return None;
        }

        let tier = *sequence.tiers.get(sequence.next)?;
        sequence.next += 1;

        match self.request(tier) {
            TierRequest::Dispatch(job) => Some(job),
            _ => {
                if let Some(sequence) = self.sequence.as_mut() {
                    sequence.resume_at = now + settle_delay(tier);
                }
                None
            }
        }
    }

    /// Cancels the running load and stops accepting requests; any late result is discarded.
    pub fn teardown(&mut self) {
        self.token.cancel();
        self.torn_down = true;
        self.in_flight = None;
        self.queued = None;
        self.sequence = None;
    }
}
