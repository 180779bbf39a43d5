//! Driven port for activity metadata, stream references, and map ids.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::athlete::{ActivityId, ActivitySummary, AthleteId, MapId};

define_port_error! {
    /// Errors raised by activity persistence adapters.
    pub enum ActivityRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "activity persistence connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "activity persistence query failed: {message}",
    }
}

/// Port for the athlete's activity catalogue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Insert summaries, ignoring ones already stored. Returns the ids that
    /// were newly inserted.
    async fn insert_activities(
        &self,
        activities: &[ActivitySummary],
    ) -> Result<Vec<ActivityId>, ActivityRepositoryError>;

    /// Activities of `athlete_id` that have no stored stream yet.
    async fn unsynced_activities(
        &self,
        athlete_id: AthleteId,
    ) -> Result<Vec<ActivityId>, ActivityRepositoryError>;

    /// Record where the raw stream of an activity was stored.
    async fn set_data_ref(
        &self,
        athlete_id: AthleteId,
        activity_id: ActivityId,
        data_ref: &str,
    ) -> Result<(), ActivityRepositoryError>;

    /// Every stored stream reference for `athlete_id`.
    async fn data_refs(
        &self,
        athlete_id: AthleteId,
    ) -> Result<Vec<String>, ActivityRepositoryError>;

    /// The athlete's heatmap id, creating one on first use.
    async fn get_or_create_map_id(
        &self,
        athlete_id: AthleteId,
    ) -> Result<MapId, ActivityRepositoryError>;
}
