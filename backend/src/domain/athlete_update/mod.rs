//! Per-athlete update pipeline.
//!
//! One run walks `ImportingActivities → DownloadingActivities →
//! ComputingMapParams → ProcessingMap`, recording every transition. Stage
//! failures are collected rather than raised; later stages still run, and the
//! final state becomes [`AthleteState::Error`] when anything failed. The map is
//! only rebuilt when at least one new stream was downloaded.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mockable::Clock;
use tracing::{debug, info, warn};

use crate::domain::athlete::{AthleteId, AthleteToken, MapId, MessageId, stream_object_key};
use crate::domain::athlete_state::AthleteState;
use crate::domain::batch::tile_batches;
use crate::domain::executor::BoundedExecutor;
use crate::domain::ports::{
    ActivityRepository, ActivitySource, AthleteStateRepository, MapProcessingRepository,
    ObjectStore, TileQueue,
};
use crate::domain::tiles::{TileSetGate, ZoomRange, compute_tile_params};

mod error;

pub use error::AthleteUpdateError;

/// Tuning for one update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AthleteUpdateConfig {
    /// Concurrent stream downloads from the remote API.
    pub download_concurrency: usize,
    /// Concurrent object-store reads during a rebuild.
    pub storage_concurrency: usize,
    /// Zoom levels every coordinate is indexed at.
    pub zoom_range: ZoomRange,
    /// Maximum tiles per queued envelope.
    pub queue_batch_size: NonZeroUsize,
}

impl Default for AthleteUpdateConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 8,
            storage_concurrency: 32,
            zoom_range: ZoomRange::default(),
            queue_batch_size: NonZeroUsize::new(250).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Driven ports used by the pipeline.
#[derive(Clone)]
pub struct AthleteUpdatePorts {
    pub activity_source: Arc<dyn ActivitySource>,
    pub activity_repository: Arc<dyn ActivityRepository>,
    pub object_store: Arc<dyn ObjectStore>,
    pub tile_queue: Arc<dyn TileQueue>,
    pub state_repository: Arc<dyn AthleteStateRepository>,
    pub map_processing_repository: Arc<dyn MapProcessingRepository>,
}

/// What a rebuild produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRebuildSummary {
    pub map_id: MapId,
    pub data_refs: usize,
    pub tiles: usize,
    pub message_ids: Vec<MessageId>,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AthleteUpdateReport {
    pub athlete_id: AthleteId,
    pub new_activities: usize,
    pub downloaded_streams: usize,
    pub rebuild: Option<MapRebuildSummary>,
    pub errors: Vec<AthleteUpdateError>,
    /// State derived from `errors`. When the last state write is itself the
    /// failure, the repository still holds the previous stage.
    pub final_state: AthleteState,
}

impl AthleteUpdateReport {
    /// Whether every stage finished without error.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Orchestrates import, download, and rebuild for one athlete at a time.
pub struct AthleteUpdateService {
    ports: AthleteUpdatePorts,
    clock: Arc<dyn Clock>,
    config: AthleteUpdateConfig,
}

impl AthleteUpdateService {
    /// Create the service over its ports, clock and tuning.
    pub fn new(
        ports: AthleteUpdatePorts,
        clock: Arc<dyn Clock>,
        config: AthleteUpdateConfig,
    ) -> Self {
        Self {
            ports,
            clock,
            config,
        }
    }

    /// Run the full pipeline for the athlete owning `token`.
    pub async fn update_athlete(&self, token: &AthleteToken) -> AthleteUpdateReport {
        let athlete_id = token.athlete_id;
        let mut errors = Vec::new();

        info!(%athlete_id, "importing new activities");
        self.record_state(athlete_id, &AthleteState::ImportingActivities, &mut errors)
            .await;
        let new_activities = match self.import_activities(token).await {
            Ok(count) => count,
            Err(err) => {
                warn!(%athlete_id, error = %err, "activity import failed; continuing");
                errors.push(err);
                0
            }
        };

        info!(%athlete_id, "downloading missing activity streams");
        self.record_state(athlete_id, &AthleteState::DownloadingActivities, &mut errors)
            .await;
        let (downloaded_streams, download_errors) = self.download_missing_streams(token).await;
        for err in &download_errors {
            warn!(%athlete_id, error = %err, "stream download failed");
        }
        errors.extend(download_errors);

        let rebuild = if downloaded_streams > 0 {
            info!(%athlete_id, downloaded_streams, "rebuilding map");
            self.record_state(athlete_id, &AthleteState::ComputingMapParams, &mut errors)
                .await;
            match self.rebuild_map(athlete_id).await {
                Ok(summary) => {
                    info!(
                        %athlete_id,
                        map_id = %summary.map_id,
                        data_refs = summary.data_refs,
                        tiles = summary.tiles,
                        messages = summary.message_ids.len(),
                        "map rebuilt and queued"
                    );
                    Some(summary)
                }
                Err(err) => {
                    warn!(%athlete_id, error = %err, "map rebuild failed");
                    errors.push(err);
                    None
                }
            }
        } else {
            debug!(%athlete_id, "no new streams; skipping map rebuild");
            None
        };

        let mut final_state = if errors.is_empty() {
            AthleteState::ProcessingMap
        } else {
            AthleteState::from_errors(&errors)
        };
        if let Err(err) = self.write_state(athlete_id, &final_state).await {
            warn!(%athlete_id, error = %err, "failed to record final athlete state");
            errors.push(err);
            final_state = AthleteState::from_errors(&errors);
        }
        info!(%athlete_id, state = %final_state, "athlete update finished");

        AthleteUpdateReport {
            athlete_id,
            new_activities,
            downloaded_streams,
            rebuild,
            errors,
            final_state,
        }
    }

    async fn record_state(
        &self,
        athlete_id: AthleteId,
        state: &AthleteState,
        errors: &mut Vec<AthleteUpdateError>,
    ) {
        if let Err(err) = self.write_state(athlete_id, state).await {
            warn!(%athlete_id, %state, error = %err, "failed to record athlete state");
            errors.push(err);
        }
    }

    async fn write_state(
        &self,
        athlete_id: AthleteId,
        state: &AthleteState,
    ) -> Result<(), AthleteUpdateError> {
        self.ports
            .state_repository
            .set_state(athlete_id, state)
            .await
            .map_err(|err| AthleteUpdateError::State {
                message: err.to_string(),
            })
    }

    async fn import_activities(&self, token: &AthleteToken) -> Result<usize, AthleteUpdateError> {
        let activities = self
            .ports
            .activity_source
            .list_all_activities(&token.access_token)
            .await
            .map_err(|err| AthleteUpdateError::Import {
                message: err.to_string(),
            })?;
        let inserted = self
            .ports
            .activity_repository
            .insert_activities(&activities)
            .await
            .map_err(|err| AthleteUpdateError::Import {
                message: err.to_string(),
            })?;
        debug!(
            athlete_id = %token.athlete_id,
            listed = activities.len(),
            inserted = inserted.len(),
            "activities imported"
        );
        Ok(inserted.len())
    }

    async fn download_missing_streams(
        &self,
        token: &AthleteToken,
    ) -> (usize, Vec<AthleteUpdateError>) {
        let athlete_id = token.athlete_id;
        let pending = match self
            .ports
            .activity_repository
            .unsynced_activities(athlete_id)
            .await
        {
            Ok(pending) => pending,
            Err(err) => {
                let err = AthleteUpdateError::PendingStreams {
                    message: err.to_string(),
                };
                return (0, vec![err]);
            }
        };
        debug!(%athlete_id, pending = pending.len(), "activities awaiting streams");

        let downloaded = Arc::new(AtomicUsize::new(0));
        let tasks = pending.into_iter().map(|activity_id| {
            let source = Arc::clone(&self.ports.activity_source);
            let store = Arc::clone(&self.ports.object_store);
            let repository = Arc::clone(&self.ports.activity_repository);
            let access_token = token.access_token.clone();
            let downloaded = Arc::clone(&downloaded);
            async move {
                let download_error = |message: String| AthleteUpdateError::Download {
                    activity_id,
                    message,
                };
                let bytes = match source.fetch_stream_bytes(&access_token, activity_id).await {
                    Ok(bytes) => bytes,
                    Err(err) if err.is_not_found() => {
                        debug!(%athlete_id, %activity_id, "stream not found; skipping");
                        return Ok(());
                    }
                    Err(err) => return Err(download_error(err.to_string())),
                };
                let key = stream_object_key(athlete_id, activity_id);
                store
                    .put(&key, bytes)
                    .await
                    .map_err(|err| download_error(err.to_string()))?;
                repository
                    .set_data_ref(athlete_id, activity_id, &key)
                    .await
                    .map_err(|err| download_error(err.to_string()))?;
                downloaded.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let result = BoundedExecutor::new(self.config.download_concurrency)
            .run_collect_all(tasks)
            .await;
        let errors = result.err().map(|errs| errs.into_inner()).unwrap_or_default();
        (downloaded.load(Ordering::SeqCst), errors)
    }

    async fn rebuild_map(
        &self,
        athlete_id: AthleteId,
    ) -> Result<MapRebuildSummary, AthleteUpdateError> {
        let data_refs = self
            .ports
            .activity_repository
            .data_refs(athlete_id)
            .await
            .map_err(AthleteUpdateError::rebuild)?;

        let gate = Arc::new(TileSetGate::new(self.config.zoom_range));
        let tasks = data_refs.iter().cloned().map(|key| {
            let store = Arc::clone(&self.ports.object_store);
            let gate = Arc::clone(&gate);
            async move {
                let raw = store.get(&key).await.map_err(AthleteUpdateError::rebuild)?;
                let coordinates = gate.add_stream(&raw);
                debug!(%athlete_id, key = %key, coordinates, "stream added to tile set");
                Ok::<(), AthleteUpdateError>(())
            }
        });
        BoundedExecutor::new(self.config.storage_concurrency)
            .run_fail_fast(tasks)
            .await?;
        let tiles = gate.take();
        let params = compute_tile_params(&tiles);

        let map_id = self
            .ports
            .activity_repository
            .get_or_create_map_id(athlete_id)
            .await
            .map_err(AthleteUpdateError::rebuild)?;
        let batches = tile_batches(&params, self.config.queue_batch_size, athlete_id, map_id);

        let message_ids = if batches.is_empty() {
            debug!(%athlete_id, %map_id, "no tiles derived; nothing to enqueue");
            Vec::new()
        } else {
            let created_at = self.clock.utc();
            let message_ids = self
                .ports
                .tile_queue
                .enqueue(&batches)
                .await
                .map_err(AthleteUpdateError::rebuild)?;
            self.ports
                .map_processing_repository
                .record_queued(map_id, created_at, &message_ids)
                .await
                .map_err(AthleteUpdateError::rebuild)?;
            message_ids
        };

        Ok(MapRebuildSummary {
            map_id,
            data_refs: data_refs.len(),
            tiles: tiles.len(),
            message_ids,
        })
    }
}

#[cfg(test)]
mod tests;
