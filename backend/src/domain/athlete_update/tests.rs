//! Unit tests for the athlete update pipeline.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::domain::athlete::{AccessToken, ActivityId, ActivitySummary};
use crate::domain::ports::{
    ActivitySourceError, AthleteStateRepositoryError, MockAthleteStateRepository,
    ObjectStoreError, TileQueueError,
};
use crate::test_support::{
    InMemoryActivityRepository, InMemoryActivitySource, InMemoryMapProcessingRepository,
    InMemoryObjectStore, MutableClock, RecordingStateRepository, RecordingTileQueue,
};

const ATHLETE: AthleteId = AthleteId::new(42);

struct Harness {
    source: Arc<InMemoryActivitySource>,
    repository: Arc<InMemoryActivityRepository>,
    store: Arc<InMemoryObjectStore>,
    queue: Arc<RecordingTileQueue>,
    states: Arc<RecordingStateRepository>,
    processing: Arc<InMemoryMapProcessingRepository>,
    clock: Arc<MutableClock>,
}

impl Harness {
    fn ports(&self) -> AthleteUpdatePorts {
        AthleteUpdatePorts {
            activity_source: self.source.clone(),
            activity_repository: self.repository.clone(),
            object_store: self.store.clone(),
            tile_queue: self.queue.clone(),
            state_repository: self.states.clone(),
            map_processing_repository: self.processing.clone(),
        }
    }

    fn service(&self) -> AthleteUpdateService {
        self.service_with(test_config())
    }

    fn service_with(&self, config: AthleteUpdateConfig) -> AthleteUpdateService {
        AthleteUpdateService::new(self.ports(), self.clock.clone(), config)
    }
}

#[fixture]
fn harness() -> Harness {
    let now = Utc
        .with_ymd_and_hms(2026, 3, 14, 9, 30, 0)
        .single()
        .expect("valid timestamp");
    Harness {
        source: Arc::new(InMemoryActivitySource::default()),
        repository: Arc::new(InMemoryActivityRepository::default()),
        store: Arc::new(InMemoryObjectStore::default()),
        queue: Arc::new(RecordingTileQueue::default()),
        states: Arc::new(RecordingStateRepository::default()),
        processing: Arc::new(InMemoryMapProcessingRepository::default()),
        clock: Arc::new(MutableClock::new(now)),
    }
}

fn test_config() -> AthleteUpdateConfig {
    AthleteUpdateConfig {
        download_concurrency: 4,
        storage_concurrency: 4,
        zoom_range: ZoomRange::new(2, 3).expect("valid zoom range"),
        queue_batch_size: NonZeroUsize::new(2).expect("non-zero"),
    }
}

fn token() -> AthleteToken {
    AthleteToken {
        athlete_id: ATHLETE,
        access_token: AccessToken::new("access"),
    }
}

fn summary(id: i64) -> ActivitySummary {
    ActivitySummary {
        id: ActivityId::new(id),
        athlete_id: ATHLETE,
        name: format!("Morning Ride {id}"),
        sport_type: "Ride".to_owned(),
        start_date: Utc
            .with_ymd_and_hms(2026, 3, 1, 7, 0, 0)
            .single()
            .expect("valid timestamp"),
        distance: 21_500.0,
    }
}

fn stream(pairs: &[[f64; 2]]) -> Vec<u8> {
    json!([{ "type": "latlng", "data": pairs }])
        .to_string()
        .into_bytes()
}

fn three_streams(harness: &Harness) {
    harness.source.add_activity(summary(1), stream(&[[51.5, -0.12], [51.51, -0.13]]));
    harness.source.add_activity(summary(2), stream(&[[48.85, 2.35], [48.86, 2.36]]));
    harness.source.add_activity(summary(3), stream(&[[-33.87, 151.21], [40.71, -74.0]]));
}

#[rstest]
#[tokio::test]
async fn full_run_imports_downloads_and_queues_tiles(harness: Harness) {
    three_streams(&harness);

    let report = harness.service().update_athlete(&token()).await;

    assert!(report.is_success(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.new_activities, 3);
    assert_eq!(report.downloaded_streams, 3);
    assert_eq!(report.final_state, AthleteState::ProcessingMap);
    assert_eq!(
        harness.states.history(ATHLETE),
        vec![
            AthleteState::ImportingActivities,
            AthleteState::DownloadingActivities,
            AthleteState::ComputingMapParams,
            AthleteState::ProcessingMap,
        ]
    );

    let rebuild = report.rebuild.expect("map rebuilt");
    assert_eq!(rebuild.data_refs, 3);
    assert!((1..=12).contains(&rebuild.tiles));
    let batches = harness.queue.batches();
    assert_eq!(batches.iter().map(|batch| batch.tiles.len()).sum::<usize>(), rebuild.tiles);
    assert!(batches.iter().all(|batch| batch.tiles.len() <= 2));
    assert!(batches.iter().all(|batch| batch.map_id == rebuild.map_id));
    assert_eq!(harness.processing.queued_ids(rebuild.map_id), rebuild.message_ids);
    assert_eq!(
        harness.repository.data_ref_of(ActivityId::new(2)).as_deref(),
        Some("42/2.json")
    );
    assert!(harness.store.object("42/3.json").is_some());
}

#[rstest]
#[tokio::test]
async fn queued_batches_are_stamped_with_the_clock(harness: Harness) {
    three_streams(&harness);

    let report = harness.service().update_athlete(&token()).await;

    let map_id = report.rebuild.expect("map rebuilt").map_id;
    let summary = harness
        .processing
        .summary(map_id)
        .await
        .expect("summary query")
        .expect("queued batch");
    assert_eq!(summary.created_at, harness.clock.utc());
    assert_eq!(summary.queued as usize, harness.queue.batches().len());
}

#[rstest]
#[tokio::test]
async fn summary_tracks_only_the_latest_rebuild(harness: Harness) {
    three_streams(&harness);
    let service = harness.service();
    let first = service.update_athlete(&token()).await.rebuild.expect("first rebuild");

    harness.clock.advance(TimeDelta::hours(1));
    harness.source.add_activity(summary(4), stream(&[[0.5, 0.5]]));
    let second = service.update_athlete(&token()).await.rebuild.expect("second rebuild");

    assert_eq!(second.map_id, first.map_id);
    let latest = harness
        .processing
        .summary(second.map_id)
        .await
        .expect("summary query")
        .expect("queued batch");
    assert_eq!(latest.created_at, harness.clock.utc());
    assert_eq!(latest.total() as usize, second.message_ids.len());
}

#[rstest]
#[tokio::test]
async fn missing_streams_are_skipped_without_error(harness: Harness) {
    harness.source.add_activity(summary(1), stream(&[[10.0, 10.0]]));
    harness.source.add_activity_without_stream(summary(2));

    let report = harness.service().update_athlete(&token()).await;

    assert!(report.is_success(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.downloaded_streams, 1);
    assert_eq!(harness.repository.data_ref_of(ActivityId::new(2)), None);
    assert_eq!(report.final_state, AthleteState::ProcessingMap);
}

#[rstest]
#[tokio::test]
async fn import_failure_does_not_stop_downloads(harness: Harness) {
    harness
        .repository
        .insert_activities(&[summary(7)])
        .await
        .expect("seed activity");
    harness.source.add_stream(ActivityId::new(7), stream(&[[1.0, 1.0]]));
    harness
        .source
        .fail_listing(ActivitySourceError::transport("connection reset"));

    let report = harness.service().update_athlete(&token()).await;

    assert_eq!(report.downloaded_streams, 1);
    assert!(report.rebuild.is_some());
    assert!(matches!(
        report.errors.as_slice(),
        [AthleteUpdateError::Import { .. }]
    ));
    assert!(matches!(report.final_state, AthleteState::Error { count: 1, .. }));
}

#[rstest]
#[tokio::test]
async fn nothing_downloaded_means_no_rebuild(harness: Harness) {
    harness.repository.seed_synced(ATHLETE, ActivityId::new(1), "42/1.json");
    harness.store.insert("42/1.json", stream(&[[5.0, 5.0]]));

    let report = harness.service().update_athlete(&token()).await;

    assert!(report.rebuild.is_none());
    assert!(harness.queue.batches().is_empty());
    assert!(!harness
        .states
        .history(ATHLETE)
        .contains(&AthleteState::ComputingMapParams));
    assert_eq!(report.final_state, AthleteState::ProcessingMap);
}

#[rstest]
#[tokio::test]
async fn queue_failure_ends_in_error_state(harness: Harness) {
    three_streams(&harness);
    harness.queue.fail_with(TileQueueError::unavailable("broker down"));

    let report = harness.service().update_athlete(&token()).await;

    assert_eq!(
        report.final_state,
        AthleteState::Error {
            count: 1,
            messages: "rebuilding map failed: tile queue is unavailable: broker down".to_owned(),
        }
    );
    assert_eq!(harness.states.history(ATHLETE).last(), Some(&report.final_state));
}

#[rstest]
#[tokio::test]
async fn download_failures_are_aggregated(harness: Harness) {
    harness.source.add_activity(summary(1), stream(&[[1.0, 2.0]]));
    harness
        .source
        .add_failing_activity(summary(2), ActivitySourceError::rate_limited("429"));
    harness
        .source
        .add_failing_activity(summary(3), ActivitySourceError::timeout("5s elapsed"));

    let report = harness.service().update_athlete(&token()).await;

    assert_eq!(report.downloaded_streams, 1);
    assert!(report.rebuild.is_some());
    let mut failed: Vec<ActivityId> = report
        .errors
        .iter()
        .map(|err| match err {
            AthleteUpdateError::Download { activity_id, .. } => *activity_id,
            other => panic!("unexpected error {other}"),
        })
        .collect();
    failed.sort();
    assert_eq!(failed, vec![ActivityId::new(2), ActivityId::new(3)]);
    assert!(matches!(report.final_state, AthleteState::Error { count: 2, .. }));
}

#[rstest]
#[tokio::test]
async fn storage_failures_during_download_are_collected(harness: Harness) {
    harness.source.add_activity(summary(1), stream(&[[1.0, 2.0]]));
    harness
        .store
        .fail_puts(ObjectStoreError::io("42/1.json", "disk full"));

    let report = harness.service().update_athlete(&token()).await;

    assert_eq!(report.downloaded_streams, 0);
    assert!(report.rebuild.is_none());
    assert_eq!(harness.repository.data_ref_of(ActivityId::new(1)), None);
    assert!(report.final_state.is_error());
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn downloads_respect_the_concurrency_limit(harness: Harness) {
    for id in 1..=12 {
        harness.source.add_activity(summary(id), stream(&[[1.0, 1.0]]));
    }
    harness.source.delay_fetches(Duration::from_millis(10));
    let config = AthleteUpdateConfig {
        download_concurrency: 2,
        ..test_config()
    };

    let report = harness.service_with(config).update_athlete(&token()).await;

    assert_eq!(report.downloaded_streams, 12);
    assert_eq!(harness.source.fetch_count(), 12);
    assert!(harness.source.max_concurrent_fetches() <= 2);
}

#[rstest]
#[tokio::test]
async fn unreadable_streams_fail_the_rebuild(harness: Harness) {
    harness.repository.seed_synced(ATHLETE, ActivityId::new(9), "42/9.json");
    harness.store.fail_reads_of("42/9.json");
    harness.source.add_activity(summary(1), stream(&[[1.0, 2.0]]));

    let report = harness.service().update_athlete(&token()).await;

    assert!(report.rebuild.is_none());
    assert!(harness.queue.batches().is_empty());
    assert!(matches!(
        report.errors.as_slice(),
        [AthleteUpdateError::Rebuild { message }] if message.contains("42/9.json")
    ));
}

#[rstest]
#[tokio::test]
async fn state_write_failures_are_reported(harness: Harness) {
    let mut states = MockAthleteStateRepository::new();
    states
        .expect_set_state()
        .returning(|_, _| Err(AthleteStateRepositoryError::connection("pool exhausted")));
    let ports = AthleteUpdatePorts {
        state_repository: Arc::new(states),
        ..harness.ports()
    };
    let service = AthleteUpdateService::new(ports, harness.clock.clone(), test_config());

    let report = service.update_athlete(&token()).await;

    assert_eq!(report.errors.len(), 3);
    assert!(report
        .errors
        .iter()
        .all(|err| matches!(err, AthleteUpdateError::State { .. })));
    assert!(matches!(report.final_state, AthleteState::Error { count: 3, .. }));
}

#[rstest]
#[tokio::test]
async fn failed_final_write_is_reflected_in_the_reported_state(harness: Harness) {
    let mut states = MockAthleteStateRepository::new();
    states
        .expect_set_state()
        .withf(|_, state| matches!(state, AthleteState::ProcessingMap))
        .returning(|_, _| Err(AthleteStateRepositoryError::connection("pool exhausted")));
    states
        .expect_set_state()
        .withf(|_, state| !matches!(state, AthleteState::ProcessingMap))
        .returning(|_, _| Ok(()));
    let ports = AthleteUpdatePorts {
        state_repository: Arc::new(states),
        ..harness.ports()
    };
    three_streams(&harness);
    let service = AthleteUpdateService::new(ports, harness.clock.clone(), test_config());

    let report = service.update_athlete(&token()).await;

    assert!(report.rebuild.is_some());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(
        report.final_state,
        AthleteState::from_errors(&report.errors),
        "reported state agrees with the reported errors"
    );
}
