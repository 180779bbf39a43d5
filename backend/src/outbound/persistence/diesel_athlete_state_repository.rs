//! PostgreSQL-backed `AthleteStateRepository` implementation.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{AthleteStateRepository, AthleteStateRepositoryError};
use crate::domain::{AthleteId, AthleteState};

use super::diesel_helpers::{
    is_connection_error, map_diesel_error_message, map_pool_error_message,
};
use super::models::AthleteStateRow;
use super::pool::{DbPool, PoolError};
use super::schema::athlete_processing_states;

/// Diesel-backed implementation of the athlete state port.
#[derive(Clone)]
pub struct DieselAthleteStateRepository {
    pool: DbPool,
}

impl DieselAthleteStateRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> AthleteStateRepositoryError {
    AthleteStateRepositoryError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> AthleteStateRepositoryError {
    if is_connection_error(&error) {
        return AthleteStateRepositoryError::connection(error.to_string());
    }
    AthleteStateRepositoryError::query(map_diesel_error_message(error, "athlete state"))
}

#[async_trait]
impl AthleteStateRepository for DieselAthleteStateRepository {
    async fn set_state(
        &self,
        athlete_id: AthleteId,
        state: &AthleteState,
    ) -> Result<(), AthleteStateRepositoryError> {
        let encoded = state.as_db_value();
        let row = AthleteStateRow {
            athlete_id: athlete_id.get(),
            state: &encoded,
            updated_at: Utc::now(),
        };

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(athlete_processing_states::table)
            .values(&row)
            .on_conflict(athlete_processing_states::athlete_id)
            .do_update()
            .set((
                athlete_processing_states::state.eq(excluded(athlete_processing_states::state)),
                athlete_processing_states::updated_at
                    .eq(excluded(athlete_processing_states::updated_at)),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn state(
        &self,
        athlete_id: AthleteId,
    ) -> Result<Option<AthleteState>, AthleteStateRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let stored: Option<String> = athlete_processing_states::table
            .filter(athlete_processing_states::athlete_id.eq(athlete_id.get()))
            .select(athlete_processing_states::state)
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        stored
            .map(|value| {
                AthleteState::parse(&value)
                    .map_err(|err| AthleteStateRepositoryError::query(err.to_string()))
            })
            .transpose()
    }
}
