//! PostgreSQL-backed `AthleteTokenRepository` implementation.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{
    AthleteTokenRepository, AthleteTokenRepositoryError, StoredRefreshToken,
};
use crate::domain::{AccessToken, AthleteId, AthleteToken, RefreshToken, TokenGrant};

use super::diesel_helpers::{
    is_connection_error, map_diesel_error_message, map_pool_error_message,
};
use super::models::{AthleteTokenRow, NewAthleteTokenRow};
use super::pool::{DbPool, PoolError};
use super::schema::athlete_tokens;

/// Diesel-backed implementation of the athlete token port.
#[derive(Clone)]
pub struct DieselAthleteTokenRepository {
    pool: DbPool,
}

impl DieselAthleteTokenRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_rows(
        &self,
        athlete_id: Option<AthleteId>,
    ) -> Result<Vec<AthleteTokenRow>, AthleteTokenRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = athlete_tokens::table
            .select(AthleteTokenRow::as_select())
            .order_by(athlete_tokens::athlete_id)
            .into_boxed();
        if let Some(athlete_id) = athlete_id {
            query = query.filter(athlete_tokens::athlete_id.eq(athlete_id.get()));
        }
        query.load(&mut conn).await.map_err(map_diesel_error)
    }

    async fn load_one(
        &self,
        athlete_id: AthleteId,
    ) -> Result<AthleteTokenRow, AthleteTokenRepositoryError> {
        self.load_rows(Some(athlete_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AthleteTokenRepositoryError::missing(athlete_id.get()))
    }
}

fn map_pool_error(error: PoolError) -> AthleteTokenRepositoryError {
    AthleteTokenRepositoryError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> AthleteTokenRepositoryError {
    if is_connection_error(&error) {
        return AthleteTokenRepositoryError::connection(error.to_string());
    }
    AthleteTokenRepositoryError::query(map_diesel_error_message(error, "athlete tokens"))
}

fn row_to_token(row: AthleteTokenRow) -> AthleteToken {
    AthleteToken {
        athlete_id: AthleteId::new(row.athlete_id),
        access_token: AccessToken::new(row.access_token),
    }
}

fn row_to_refresh(row: AthleteTokenRow) -> StoredRefreshToken {
    StoredRefreshToken {
        athlete_id: AthleteId::new(row.athlete_id),
        refresh_token: RefreshToken::new(row.refresh_token),
        expires_at: row.expires_at,
    }
}

#[async_trait]
impl AthleteTokenRepository for DieselAthleteTokenRepository {
    async fn persist(
        &self,
        athlete_id: AthleteId,
        grant: &TokenGrant,
    ) -> Result<(), AthleteTokenRepositoryError> {
        let row = NewAthleteTokenRow {
            athlete_id: athlete_id.get(),
            access_token: grant.access_token.expose(),
            refresh_token: grant.refresh_token.expose(),
            expires_at: grant.expires_at,
            updated_at: Utc::now(),
        };

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(athlete_tokens::table)
            .values(&row)
            .on_conflict(athlete_tokens::athlete_id)
            .do_update()
            .set((
                athlete_tokens::access_token.eq(excluded(athlete_tokens::access_token)),
                athlete_tokens::refresh_token.eq(excluded(athlete_tokens::refresh_token)),
                athlete_tokens::expires_at.eq(excluded(athlete_tokens::expires_at)),
                athlete_tokens::updated_at.eq(excluded(athlete_tokens::updated_at)),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn current_tokens(&self) -> Result<Vec<AthleteToken>, AthleteTokenRepositoryError> {
        let rows = self.load_rows(None).await?;
        Ok(rows.into_iter().map(row_to_token).collect())
    }

    async fn token_for(
        &self,
        athlete_id: AthleteId,
    ) -> Result<AthleteToken, AthleteTokenRepositoryError> {
        self.load_one(athlete_id).await.map(row_to_token)
    }

    async fn refresh_tokens(
        &self,
    ) -> Result<Vec<StoredRefreshToken>, AthleteTokenRepositoryError> {
        let rows = self.load_rows(None).await?;
        Ok(rows.into_iter().map(row_to_refresh).collect())
    }

    async fn refresh_token_for(
        &self,
        athlete_id: AthleteId,
    ) -> Result<StoredRefreshToken, AthleteTokenRepositoryError> {
        self.load_one(athlete_id).await.map(row_to_refresh)
    }
}
