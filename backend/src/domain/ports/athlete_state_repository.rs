//! Driven port persisting the latest pipeline stage per athlete.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::athlete::AthleteId;
use crate::domain::athlete_state::AthleteState;

define_port_error! {
    /// Errors raised while reading or writing athlete state.
    pub enum AthleteStateRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "athlete state connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "athlete state query failed: {message}",
    }
}

/// Port for the one-row-per-athlete state table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AthleteStateRepository: Send + Sync {
    /// Overwrite the athlete's state (last write wins).
    async fn set_state(
        &self,
        athlete_id: AthleteId,
        state: &AthleteState,
    ) -> Result<(), AthleteStateRepositoryError>;

    /// Latest recorded state, or `None` when the athlete was never processed.
    async fn state(
        &self,
        athlete_id: AthleteId,
    ) -> Result<Option<AthleteState>, AthleteStateRepositoryError>;
}
