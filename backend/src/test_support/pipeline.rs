//! In-memory doubles for the athlete update pipeline ports.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::guard;
use crate::domain::athlete::{
    AccessToken, ActivityId, ActivitySummary, AthleteId, AthleteToken, AuthorizationGrant, MapId,
    MessageId, RefreshToken, TokenGrant,
};
use crate::domain::athlete_state::AthleteState;
use crate::domain::batch::TileBatch;
use crate::domain::ports::{
    ActivityRepository, ActivityRepositoryError, ActivitySource, ActivitySourceError,
    AthleteStateRepository, AthleteStateRepositoryError, AthleteTokenRepository,
    AthleteTokenRepositoryError, MapProcessingRepository, MapProcessingRepositoryError,
    MapProcessingSummary, ObjectStore, ObjectStoreError, ProcessingStatus, StoredRefreshToken,
    TileQueue, TileQueueError,
};

/// Scripted remote activity API.
///
/// Streams that were never registered are reported as not found.
#[derive(Default)]
pub struct InMemoryActivitySource {
    activities: Mutex<Vec<ActivitySummary>>,
    streams: Mutex<HashMap<ActivityId, Result<Vec<u8>, ActivitySourceError>>>,
    listing_failure: Mutex<Option<ActivitySourceError>>,
    authorizations: Mutex<HashMap<String, AuthorizationGrant>>,
    refreshes: Mutex<HashMap<String, Result<TokenGrant, ActivitySourceError>>>,
    fetch_delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl InMemoryActivitySource {
    /// List `summary` and serve `stream` for it.
    pub fn add_activity(&self, summary: ActivitySummary, stream: Vec<u8>) {
        guard(&self.streams).insert(summary.id, Ok(stream));
        guard(&self.activities).push(summary);
    }

    /// List `summary` but fail every stream fetch with `error`.
    pub fn add_failing_activity(&self, summary: ActivitySummary, error: ActivitySourceError) {
        guard(&self.streams).insert(summary.id, Err(error));
        guard(&self.activities).push(summary);
    }

    /// List `summary` without a stream, so fetches report not found.
    pub fn add_activity_without_stream(&self, summary: ActivitySummary) {
        guard(&self.activities).push(summary);
    }

    /// Serve `stream` for an activity that is not listed.
    pub fn add_stream(&self, activity_id: ActivityId, stream: Vec<u8>) {
        guard(&self.streams).insert(activity_id, Ok(stream));
    }

    pub fn fail_listing(&self, error: ActivitySourceError) {
        *guard(&self.listing_failure) = Some(error);
    }

    pub fn add_authorization(&self, code: impl Into<String>, grant: AuthorizationGrant) {
        guard(&self.authorizations).insert(code.into(), grant);
    }

    pub fn add_refresh(
        &self,
        refresh_token: &RefreshToken,
        result: Result<TokenGrant, ActivitySourceError>,
    ) {
        guard(&self.refreshes).insert(refresh_token.expose().to_owned(), result);
    }

    /// Hold every stream fetch for `delay` so overlap can be observed.
    pub fn delay_fetches(&self, delay: Duration) {
        *guard(&self.fetch_delay) = Some(delay);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivitySource for InMemoryActivitySource {
    async fn list_all_activities(
        &self,
        _token: &AccessToken,
    ) -> Result<Vec<ActivitySummary>, ActivitySourceError> {
        if let Some(error) = guard(&self.listing_failure).clone() {
            return Err(error);
        }
        Ok(guard(&self.activities).clone())
    }

    async fn fetch_stream_bytes(
        &self,
        _token: &AccessToken,
        activity_id: ActivityId,
    ) -> Result<Vec<u8>, ActivitySourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let delay = *guard(&self.fetch_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        guard(&self.streams)
            .get(&activity_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(ActivitySourceError::not_found(format!(
                    "activity {activity_id} has no stream"
                )))
            })
    }

    async fn exchange_auth_code(
        &self,
        code: &str,
    ) -> Result<AuthorizationGrant, ActivitySourceError> {
        guard(&self.authorizations)
            .get(code)
            .cloned()
            .ok_or_else(|| ActivitySourceError::unauthorized(format!("unknown code {code}")))
    }

    async fn refresh_token(
        &self,
        refresh_token: &RefreshToken,
    ) -> Result<TokenGrant, ActivitySourceError> {
        guard(&self.refreshes)
            .get(refresh_token.expose())
            .cloned()
            .unwrap_or_else(|| Err(ActivitySourceError::unauthorized("unknown refresh token")))
    }
}

/// Map-backed object store.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing_reads: Mutex<HashSet<String>>,
    put_failure: Mutex<Option<ObjectStoreError>>,
}

impl InMemoryObjectStore {
    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        guard(&self.objects).insert(key.into(), bytes);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        guard(&self.objects).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        guard(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        guard(&self.objects).is_empty()
    }

    /// Fail reads of `key` with an I/O error.
    pub fn fail_reads_of(&self, key: impl Into<String>) {
        guard(&self.failing_reads).insert(key.into());
    }

    pub fn fail_puts(&self, error: ObjectStoreError) {
        *guard(&self.put_failure) = Some(error);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        if let Some(error) = guard(&self.put_failure).clone() {
            return Err(error);
        }
        guard(&self.objects).insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        if guard(&self.failing_reads).contains(key) {
            return Err(ObjectStoreError::io(key, "scripted read failure"));
        }
        guard(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::not_found(key))
    }
}

#[derive(Debug, Clone)]
struct StoredActivity {
    athlete_id: AthleteId,
    data_ref: Option<String>,
}

/// Activity catalogue keyed by activity id.
#[derive(Debug, Default)]
pub struct InMemoryActivityRepository {
    activities: Mutex<BTreeMap<ActivityId, StoredActivity>>,
    maps: Mutex<HashMap<AthleteId, MapId>>,
    insert_failure: Mutex<Option<ActivityRepositoryError>>,
}

impl InMemoryActivityRepository {
    /// Seed an activity whose stream is already stored under `data_ref`.
    pub fn seed_synced(&self, athlete_id: AthleteId, activity_id: ActivityId, data_ref: &str) {
        guard(&self.activities).insert(
            activity_id,
            StoredActivity {
                athlete_id,
                data_ref: Some(data_ref.to_owned()),
            },
        );
    }

    pub fn data_ref_of(&self, activity_id: ActivityId) -> Option<String> {
        guard(&self.activities)
            .get(&activity_id)
            .and_then(|activity| activity.data_ref.clone())
    }

    pub fn map_of(&self, athlete_id: AthleteId) -> Option<MapId> {
        guard(&self.maps).get(&athlete_id).copied()
    }

    pub fn fail_inserts(&self, error: ActivityRepositoryError) {
        *guard(&self.insert_failure) = Some(error);
    }
}

#[async_trait]
impl ActivityRepository for InMemoryActivityRepository {
    async fn insert_activities(
        &self,
        activities: &[ActivitySummary],
    ) -> Result<Vec<ActivityId>, ActivityRepositoryError> {
        if let Some(error) = guard(&self.insert_failure).clone() {
            return Err(error);
        }
        let mut stored = guard(&self.activities);
        let mut inserted = Vec::new();
        for summary in activities {
            if stored.contains_key(&summary.id) {
                continue;
            }
            stored.insert(
                summary.id,
                StoredActivity {
                    athlete_id: summary.athlete_id,
                    data_ref: None,
                },
            );
            inserted.push(summary.id);
        }
        Ok(inserted)
    }

    async fn unsynced_activities(
        &self,
        athlete_id: AthleteId,
    ) -> Result<Vec<ActivityId>, ActivityRepositoryError> {
        Ok(guard(&self.activities)
            .iter()
            .filter(|(_, activity)| {
                activity.athlete_id == athlete_id && activity.data_ref.is_none()
            })
            .map(|(id, _)| *id)
            .collect())
    }

    async fn set_data_ref(
        &self,
        athlete_id: AthleteId,
        activity_id: ActivityId,
        data_ref: &str,
    ) -> Result<(), ActivityRepositoryError> {
        let mut stored = guard(&self.activities);
        match stored.get_mut(&activity_id) {
            Some(activity) if activity.athlete_id == athlete_id => {
                activity.data_ref = Some(data_ref.to_owned());
                Ok(())
            }
            _ => Err(ActivityRepositoryError::query(format!(
                "activity {activity_id} is not stored for athlete {athlete_id}"
            ))),
        }
    }

    async fn data_refs(
        &self,
        athlete_id: AthleteId,
    ) -> Result<Vec<String>, ActivityRepositoryError> {
        Ok(guard(&self.activities)
            .values()
            .filter(|activity| activity.athlete_id == athlete_id)
            .filter_map(|activity| activity.data_ref.clone())
            .collect())
    }

    async fn get_or_create_map_id(
        &self,
        athlete_id: AthleteId,
    ) -> Result<MapId, ActivityRepositoryError> {
        Ok(*guard(&self.maps)
            .entry(athlete_id)
            .or_insert_with(MapId::random))
    }
}

/// Queue that records every enqueued batch.
#[derive(Debug, Default)]
pub struct RecordingTileQueue {
    batches: Mutex<Vec<TileBatch>>,
    failure: Mutex<Option<TileQueueError>>,
}

impl RecordingTileQueue {
    pub fn batches(&self) -> Vec<TileBatch> {
        guard(&self.batches).clone()
    }

    pub fn fail_with(&self, error: TileQueueError) {
        *guard(&self.failure) = Some(error);
    }
}

#[async_trait]
impl TileQueue for RecordingTileQueue {
    async fn enqueue(&self, batches: &[TileBatch]) -> Result<Vec<MessageId>, TileQueueError> {
        if let Some(error) = guard(&self.failure).clone() {
            return Err(error);
        }
        let mut recorded = guard(&self.batches);
        let ids = (recorded.len()..recorded.len() + batches.len())
            .map(|index| MessageId::new(format!("msg-{index}")))
            .collect();
        recorded.extend_from_slice(batches);
        Ok(ids)
    }
}

/// State store keeping every write so transitions can be asserted.
#[derive(Debug, Default)]
pub struct RecordingStateRepository {
    writes: Mutex<Vec<(AthleteId, AthleteState)>>,
}

impl RecordingStateRepository {
    /// Every state written for `athlete_id`, oldest first.
    pub fn history(&self, athlete_id: AthleteId) -> Vec<AthleteState> {
        guard(&self.writes)
            .iter()
            .filter(|(id, _)| *id == athlete_id)
            .map(|(_, state)| state.clone())
            .collect()
    }
}

#[async_trait]
impl AthleteStateRepository for RecordingStateRepository {
    async fn set_state(
        &self,
        athlete_id: AthleteId,
        state: &AthleteState,
    ) -> Result<(), AthleteStateRepositoryError> {
        guard(&self.writes).push((athlete_id, state.clone()));
        Ok(())
    }

    async fn state(
        &self,
        athlete_id: AthleteId,
    ) -> Result<Option<AthleteState>, AthleteStateRepositoryError> {
        Ok(self.history(athlete_id).pop())
    }
}

#[derive(Debug, Clone)]
struct ProcessingRow {
    map_id: MapId,
    message_id: MessageId,
    status: ProcessingStatus,
    created_at: DateTime<Utc>,
}

/// Processing-state rows held in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryMapProcessingRepository {
    rows: Mutex<Vec<ProcessingRow>>,
}

impl InMemoryMapProcessingRepository {
    pub fn queued_ids(&self, map_id: MapId) -> Vec<MessageId> {
        guard(&self.rows)
            .iter()
            .filter(|row| row.map_id == map_id)
            .map(|row| row.message_id.clone())
            .collect()
    }
}

#[async_trait]
impl MapProcessingRepository for InMemoryMapProcessingRepository {
    async fn record_queued(
        &self,
        map_id: MapId,
        created_at: DateTime<Utc>,
        message_ids: &[MessageId],
    ) -> Result<(), MapProcessingRepositoryError> {
        guard(&self.rows).extend(message_ids.iter().map(|message_id| ProcessingRow {
            map_id,
            message_id: message_id.clone(),
            status: ProcessingStatus::Queued,
            created_at,
        }));
        Ok(())
    }

    async fn mark_status(
        &self,
        message_id: &MessageId,
        status: ProcessingStatus,
    ) -> Result<(), MapProcessingRepositoryError> {
        let mut rows = guard(&self.rows);
        let row = rows
            .iter_mut()
            .rev()
            .find(|row| &row.message_id == message_id)
            .ok_or_else(|| {
                MapProcessingRepositoryError::query(format!("unknown message {message_id}"))
            })?;
        row.status = status;
        Ok(())
    }

    async fn summary(
        &self,
        map_id: MapId,
    ) -> Result<Option<MapProcessingSummary>, MapProcessingRepositoryError> {
        let rows = guard(&self.rows);
        let Some(latest) = rows
            .iter()
            .filter(|row| row.map_id == map_id)
            .map(|row| row.created_at)
            .max()
        else {
            return Ok(None);
        };
        let mut summary = MapProcessingSummary {
            created_at: latest,
            queued: 0,
            complete: 0,
            failed: 0,
        };
        for row in rows
            .iter()
            .filter(|row| row.map_id == map_id && row.created_at == latest)
        {
            match row.status {
                ProcessingStatus::Queued => summary.queued += 1,
                ProcessingStatus::Complete => summary.complete += 1,
                ProcessingStatus::Failed => summary.failed += 1,
            }
        }
        Ok(Some(summary))
    }
}

/// Credential table keyed by athlete.
#[derive(Debug, Default)]
pub struct InMemoryAthleteTokenRepository {
    grants: Mutex<BTreeMap<AthleteId, TokenGrant>>,
}

impl InMemoryAthleteTokenRepository {
    pub fn grant_for(&self, athlete_id: AthleteId) -> Option<TokenGrant> {
        guard(&self.grants).get(&athlete_id).cloned()
    }
}

#[async_trait]
impl AthleteTokenRepository for InMemoryAthleteTokenRepository {
    async fn persist(
        &self,
        athlete_id: AthleteId,
        grant: &TokenGrant,
    ) -> Result<(), AthleteTokenRepositoryError> {
        guard(&self.grants).insert(athlete_id, grant.clone());
        Ok(())
    }

    async fn current_tokens(&self) -> Result<Vec<AthleteToken>, AthleteTokenRepositoryError> {
        Ok(guard(&self.grants)
            .iter()
            .map(|(athlete_id, grant)| AthleteToken {
                athlete_id: *athlete_id,
                access_token: grant.access_token.clone(),
            })
            .collect())
    }

    async fn token_for(
        &self,
        athlete_id: AthleteId,
    ) -> Result<AthleteToken, AthleteTokenRepositoryError> {
        self.grant_for(athlete_id)
            .map(|grant| AthleteToken {
                athlete_id,
                access_token: grant.access_token,
            })
            .ok_or_else(|| AthleteTokenRepositoryError::missing(athlete_id.get()))
    }

    async fn refresh_tokens(
        &self,
    ) -> Result<Vec<StoredRefreshToken>, AthleteTokenRepositoryError> {
        Ok(guard(&self.grants)
            .iter()
            .map(|(athlete_id, grant)| StoredRefreshToken {
                athlete_id: *athlete_id,
                refresh_token: grant.refresh_token.clone(),
                expires_at: grant.expires_at,
            })
            .collect())
    }

    async fn refresh_token_for(
        &self,
        athlete_id: AthleteId,
    ) -> Result<StoredRefreshToken, AthleteTokenRepositoryError> {
        self.grant_for(athlete_id)
            .map(|grant| StoredRefreshToken {
                athlete_id,
                refresh_token: grant.refresh_token,
                expires_at: grant.expires_at,
            })
            .ok_or_else(|| AthleteTokenRepositoryError::missing(athlete_id.get()))
    }
}
