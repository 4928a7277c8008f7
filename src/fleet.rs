use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use bevy::log::{info, warn};

use crate::{
    model::ModelId,
    tier::{QualityTier, TierMap},
};


#[derive(Clone, Debug, PartialEq, Eq)]
struct Outstanding {
    tier: QualityTier,
    started: Duration,
}


/// Lock-step tier advancement across the visible models.
///
/// In progressive mode one model loads at a time; the target advances once
/// every visible model has loaded it or been parked for it. A model is parked
/// for a tier after `max_attempts` failed or stalled attempts and no longer
/// blocks advancement. Without progressive loading the target is the final
/// tier from the start and every visible model is dispatched at once.
#[derive(Clone, Debug)]
pub struct FleetScheduler {
    target: QualityTier,
    final_tier: QualityTier,
    progressive: bool,
    completed: TierMap<HashSet<ModelId>>,
    parked: TierMap<HashSet<ModelId>>,
    attempts: TierMap<HashMap<ModelId, u32>>,
    outstanding: HashMap<ModelId, Outstanding>,
    max_attempts: u32,
    stall_timeout: Option<Duration>,
}

impl FleetScheduler {
    pub fn new(
        progressive: bool,
        final_tier: QualityTier,
        max_attempts: u32,
        stall_timeout: Option<Duration>,
    ) -> Self {
        Self {
            target: if progressive {
                QualityTier::UltraLow
            } else {
                final_tier
            },
            final_tier,
            progressive,
            completed: TierMap::default(),
            parked: TierMap::default(),
            attempts: TierMap::default(),
            outstanding: HashMap::new(),
            max_attempts: max_attempts.max(1),
            stall_timeout,
        }
    }

    pub fn target_tier(&self) -> QualityTier {
        self.target
    }

    pub fn final_tier(&self) -> QualityTier {
        self.final_tier
    }

    pub fn is_progressive(&self) -> bool {
        self.progressive
    }

    pub fn completed_count(&self, tier: QualityTier) -> usize {
        self.completed[tier].len()
    }

    pub fn has_completed(&self, id: &ModelId, tier: QualityTier) -> bool {
        self.completed[tier].contains(id)
    }

    pub fn is_parked(&self, id: &ModelId, tier: QualityTier) -> bool {
        self.parked[tier].contains(id)
    }

    pub fn attempts(&self, id: &ModelId, tier: QualityTier) -> u32 {
        self.attempts[tier].get(id).copied().unwrap_or(0)
    }

    pub fn in_flight(&self) -> impl Iterator<Item = (&ModelId, QualityTier)> {
        self.outstanding.iter().map(|(id, slot)| (id, slot.tier))
    }

    pub fn is_outstanding(&self, id: &ModelId) -> bool {
        self.outstanding.contains_key(id)
    }

    pub fn set_max_attempts(&mut self, max_attempts: u32) {
        self.max_attempts = max_attempts.max(1);
    }

    pub fn set_stall_timeout(&mut self, stall_timeout: Option<Duration>) {
        self.stall_timeout = stall_timeout;
    }

    /// Switching progressive loading off jumps straight to the final tier;
    /// switching it on keeps the current target.
    pub fn set_progressive(&mut self, progressive: bool) -> Option<QualityTier> {
        self.progressive = progressive;
        if !progressive {
            return self.raise_target(self.final_tier);
        }

        None
    }

    /// Raising the final tier lets advancement continue; it is never lowered below the target.
    pub fn set_final_tier(&mut self, final_tier: QualityTier) -> Option<QualityTier> {
        self.final_tier = final_tier.max(self.target);
        if !self.progressive {
            return self.raise_target(self.final_tier);
        }

        None
    }

    fn raise_target(&mut self, tier: QualityTier) -> Option<QualityTier> {
        if tier > self.target {
            self.target = tier;
            info!(target_tier = %tier, "fleet target advanced");
            return Some(tier);
        }

        None
    }

    fn settled(&self, id: &ModelId, tier: QualityTier) -> bool {
        self.completed[tier].contains(id) || self.parked[tier].contains(id)
    }

    /// Models to request next, each paired with the tier to load.
    ///
    /// `loading` reports models whose own state already has a load in flight.
    pub fn next_dispatch(
        &mut self,
        visible: &[ModelId],
        loading: impl Fn(&ModelId) -> bool,
        now: Duration,
    ) -> Vec<(ModelId, QualityTier)> {
        let target = self.target;
        let mut candidates = visible
            .iter()
            .filter(|id| !self.settled(id, target))
            .filter(|id| !self.outstanding.contains_key(*id) && !loading(*id));

        let picked: Vec<ModelId> = if self.progressive {
            if !self.outstanding.is_empty() {
                return Vec::new();
            }
            candidates.next().cloned().into_iter().collect()
        } else {
            candidates.cloned().collect()
        };

        picked
            .into_iter()
            .map(|id| {
                self.outstanding.insert(
                    id.clone(),
                    Outstanding {
                        tier: target,
                        started: now,
                    },
                );
                (id, target)
            })
            .collect()
    }

    /// Frees a slot without recording an outcome.
    pub fn release(&mut self, id: &ModelId) {
        self.outstanding.remove(id);
    }

    pub fn on_tier_loaded(&mut self, id: &ModelId, tier: QualityTier) {
        if self
            .outstanding
            .get(id)
            .is_some_and(|slot| slot.tier == tier)
        {
            self.outstanding.remove(id);
        }

        self.parked[tier].remove(id);
        self.completed[tier].insert(id.clone());
    }

    pub fn on_tier_failed(&mut self, id: &ModelId, tier: QualityTier) {
        if self
            .outstanding
            .get(id)
            .is_some_and(|slot| slot.tier == tier)
        {
            self.outstanding.remove(id);
        }

        self.record_attempt(id, tier);
    }

    fn record_attempt(&mut self, id: &ModelId, tier: QualityTier) {
        let attempts = self.attempts[tier].entry(id.clone()).or_insert(0);
        *attempts += 1;

        if *attempts >= self.max_attempts && !self.completed[tier].contains(id) {
            let attempts = *attempts;
            if self.parked[tier].insert(id.clone()) {
                warn!(model = %id, %tier, attempts, "model parked for tier");
            }
        }
    }

    /// Releases slots held longer than the stall timeout, counting each as a failed attempt.
    pub fn expire_stalled(&mut self, now: Duration) -> Vec<(ModelId, QualityTier)> {
        let Some(timeout) = self.stall_timeout else {
            return Vec::new();
        };

        let stalled: Vec<(ModelId, QualityTier)> = self
            .outstanding
            .iter()
            .filter(|(_, slot)| now.saturating_sub(slot.started) >= timeout)
            .map(|(id, slot)| (id.clone(), slot.tier))
            .collect();

        for (id, tier) in &stalled {
            warn!(model = %id, %tier, ?timeout, "releasing stalled load slot");
            self.outstanding.remove(id);
            self.record_attempt(id, *tier);
        }

        stalled
    }

    /// Advances the target while every visible model has settled it. Returns each tier reached.
    pub fn advance(&mut self, visible: &[ModelId]) -> Vec<QualityTier> {
        let mut reached = Vec::new();
        if visible.is_empty() {
            return reached;
        }

        while self.target < self.final_tier
            && visible.iter().all(|id| self.settled(id, self.target))
        {
            let Some(next) = self.target.next() else {
                break;
            };

            self.target = next;
            info!(
                target_tier = %next,
                completed = self.completed_count(next),
                "fleet target advanced"
            );
            reached.push(next);
        }

        reached
    }

    /// Forgets every record of `id`; later reports for it still count from scratch.
    pub fn remove_model(&mut self, id: &ModelId) {
        self.outstanding.remove(id);
        for tier in QualityTier::ALL {
            self.completed[tier].remove(id);
            self.parked[tier].remove(id);
            self.attempts[tier].remove(id);
        }
    }
}
