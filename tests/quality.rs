use std::time::Duration;

use bevy_progressive_points::{
    CodecKind,
    FetchError,
    LoadError,
    LoadJob,
    ModelAsset,
    PointBuffer,
    QualityTier,
    TierMap,
    quality::{LoadPhase, ModelEvent, ModelLoadState, TierRequest, settle_delay},
    random_points,
};


fn asset() -> ModelAsset {
    ModelAsset::new(
        "scan",
        TierMap::from_fn(|tier| format!("/models/compressed/scan_{tier}.ply.gz")),
        CodecKind::Ply,
    )
    .unwrap()
}

fn dispatch(state: &mut ModelLoadState, tier: QualityTier) -> LoadJob {
    match state.request(tier) {
        TierRequest::Dispatch(job) => job,
        other => panic!("expected dispatch of {tier}, got {other:?}"),
    }
}

fn points(count: usize) -> Result<PointBuffer, LoadError> {
    Ok(random_points(count, count as u64))
}

fn not_found() -> Result<PointBuffer, LoadError> {
    Err(LoadError::Fetch(FetchError::NotFound("gone".to_string())))
}

const T0: Duration = Duration::ZERO;


#[test]
fn test_first_load_emits_ready_once() {
    let mut state = ModelLoadState::new(&asset());
    assert_eq!(state.phase(), LoadPhase::Idle);

    let job = dispatch(&mut state, QualityTier::UltraLow);
    assert_eq!(job.location, "/models/compressed/scan_ultra_low.ply.gz");
    assert_eq!(state.phase(), LoadPhase::Loading(QualityTier::UltraLow));

    let events = state.complete(&job, points(10), T0);
    assert_eq!(
        events,
        vec![
            ModelEvent::Ready(QualityTier::UltraLow),
            ModelEvent::TierLoaded(QualityTier::UltraLow),
        ],
    );
    assert_eq!(state.phase(), LoadPhase::Ready(QualityTier::UltraLow));

    let job = dispatch(&mut state, QualityTier::Low);
    let events = state.complete(&job, points(20), T0);
    assert_eq!(events, vec![ModelEvent::TierLoaded(QualityTier::Low)]);
    assert_eq!(state.current_tier(), Some(QualityTier::Low));
}

#[test]
fn test_duplicate_request_is_deduplicated() {
    let mut state = ModelLoadState::new(&asset());

    let _job = dispatch(&mut state, QualityTier::Low);

    assert!(matches!(state.request(QualityTier::Low), TierRequest::AlreadyLoading));
    assert_eq!(state.queued(), None);
}

#[test]
fn test_latest_queued_request_wins() {
    let mut state = ModelLoadState::new(&asset());
    let job = dispatch(&mut state, QualityTier::UltraLow);

    assert!(matches!(state.request(QualityTier::Low), TierRequest::Queued));
    assert!(matches!(state.request(QualityTier::High), TierRequest::Queued));
    assert_eq!(state.queued(), Some(QualityTier::High));

    assert!(state.poll_queue().is_none());

    state.complete(&job, points(5), T0);

    match state.poll_queue() {
        Some(TierRequest::Dispatch(job)) => assert_eq!(job.tier, QualityTier::High),
        other => panic!("expected queued dispatch, got {other:?}"),
    }
    assert_eq!(state.queued(), None);
}

#[test]
fn test_cached_tier_switches_without_fetch() {
    let mut state = ModelLoadState::new(&asset());

    let job = dispatch(&mut state, QualityTier::UltraLow);
    state.complete(&job, points(10), T0);
    let job = dispatch(&mut state, QualityTier::Low);
    state.complete(&job, points(20), T0);

    let revision = state.revision();

    assert!(matches!(state.request(QualityTier::UltraLow), TierRequest::Switched));
    assert_eq!(state.current_tier(), Some(QualityTier::UltraLow));
    assert_eq!(state.current_buffer().unwrap().vertex_count(), 10);
    assert_eq!(state.revision(), revision + 1);

    assert!(matches!(state.request(QualityTier::UltraLow), TierRequest::AlreadyCurrent));
    assert_eq!(state.revision(), revision + 1);
}

#[test]
fn test_failure_keeps_current_tier() {
    let mut state = ModelLoadState::new(&asset());

    let job = dispatch(&mut state, QualityTier::UltraLow);
    state.complete(&job, points(10), T0);

    let job = dispatch(&mut state, QualityTier::Medium);
    let events = state.complete(&job, not_found(), T0);

    assert!(matches!(
        events.as_slice(),
        [ModelEvent::TierFailed {
            tier: QualityTier::Medium,
            ..
        }],
    ));
    assert_eq!(state.current_tier(), Some(QualityTier::UltraLow));
    assert!(!state.has_tier(QualityTier::Medium));
    assert_eq!(state.failures(QualityTier::Medium), 1);
    assert!(!state.is_loading());

    // a failed tier can be requested again
    let _retry = dispatch(&mut state, QualityTier::Medium);
}

#[test]
fn test_failed_first_load_is_not_ready() {
    let mut state = ModelLoadState::new(&asset());

    let job = dispatch(&mut state, QualityTier::UltraLow);
    state.complete(&job, not_found(), T0);

    assert_eq!(state.phase(), LoadPhase::Idle);
    assert!(state.renderable(1.0).is_none());

    let job = dispatch(&mut state, QualityTier::UltraLow);
    let events = state.complete(&job, points(3), T0);
    assert_eq!(events[0], ModelEvent::Ready(QualityTier::UltraLow));
}

#[test]
fn test_teardown_discards_late_result() {
    let mut state = ModelLoadState::new(&asset());

    let job = dispatch(&mut state, QualityTier::UltraLow);
    state.teardown();

    assert!(job.is_cancelled());
    assert!(state.complete(&job, points(10), T0).is_empty());
    assert!(!state.has_tier(QualityTier::UltraLow));
    assert!(matches!(state.request(QualityTier::Low), TierRequest::Ignored));
}

#[test]
fn test_unexpected_job_is_ignored() {
    let mut state = ModelLoadState::new(&asset());
    let job = dispatch(&mut state, QualityTier::UltraLow);

    let mut stray = job.clone();
    stray.tier = QualityTier::High;

    assert!(state.complete(&stray, points(10), T0).is_empty());
    assert!(state.is_loading());

    // a second completion of the same job is stale as well
    assert!(!state.complete(&job, points(10), T0).is_empty());
    assert!(state.complete(&job, points(10), T0).is_empty());
}

#[test]
fn test_cancelled_result_is_silent() {
    let mut state = ModelLoadState::new(&asset());
    let job = dispatch(&mut state, QualityTier::Low);

    assert!(state.complete(&job, Err(LoadError::Cancelled), T0).is_empty());
    assert_eq!(state.failures(QualityTier::Low), 0);
    assert!(!state.is_loading());
}

#[test]
fn test_renderable_samples_current_buffer() {
    let mut state = ModelLoadState::new(&asset());
    let job = dispatch(&mut state, QualityTier::High);
    state.complete(&job, points(100), T0);

    assert_eq!(state.renderable(1.0).unwrap().vertex_count(), 100);
    assert_eq!(state.renderable(0.5).unwrap().vertex_count(), 50);
    assert_eq!(state.current_buffer().unwrap().vertex_count(), 100);
}

#[test]
fn test_sequence_waits_for_settle_delay() {
    let mut state = ModelLoadState::new(&asset());
    state.start_sequence(vec![QualityTier::UltraLow, QualityTier::Low], T0);

    let job = state.poll_sequence(T0).unwrap();
    assert_eq!(job.tier, QualityTier::UltraLow);
    assert!(state.poll_sequence(T0).is_none());

    let loaded_at = Duration::from_secs(2);
    state.complete(&job, points(10), loaded_at);

    let settle = settle_delay(QualityTier::UltraLow);
    assert_eq!(settle, Duration::from_millis(500));
    assert!(state.poll_sequence(loaded_at + settle / 2).is_none());

    let job = state.poll_sequence(loaded_at + settle).unwrap();
    assert_eq!(job.tier, QualityTier::Low);
    assert!(!state.sequence_finished());

    state.complete(&job, points(20), loaded_at + settle);
    assert!(state.sequence_finished());
    assert!(state.poll_sequence(Duration::from_secs(60)).is_none());
}

#[test]
fn test_sequence_continues_after_failure() {
    let mut state = ModelLoadState::new(&asset());
    state.start_sequence(vec![QualityTier::UltraLow, QualityTier::Low], T0);

    let job = state.poll_sequence(T0).unwrap();
    state.complete(&job, not_found(), T0);

    let job = state.poll_sequence(Duration::from_secs(1)).unwrap();
    assert_eq!(job.tier, QualityTier::Low);
}
