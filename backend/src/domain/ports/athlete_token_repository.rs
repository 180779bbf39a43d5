//! Driven port storing OAuth credentials per athlete.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::define_port_error;
use crate::domain::athlete::{AthleteId, AthleteToken, RefreshToken, TokenGrant};

define_port_error! {
    /// Errors raised by token persistence adapters.
    pub enum AthleteTokenRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "athlete token connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "athlete token query failed: {message}",
        /// No credentials are stored for the athlete.
        Missing { athlete_id: i64 } =>
            "no tokens stored for athlete {athlete_id}",
    }
}

/// Stored refresh credentials for one athlete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRefreshToken {
    pub athlete_id: AthleteId,
    pub refresh_token: RefreshToken,
    pub expires_at: DateTime<Utc>,
}

/// Port for the athlete credential table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AthleteTokenRepository: Send + Sync {
    /// Insert or replace the grant for `athlete_id`.
    async fn persist(
        &self,
        athlete_id: AthleteId,
        grant: &TokenGrant,
    ) -> Result<(), AthleteTokenRepositoryError>;

    /// Access tokens of every known athlete.
    async fn current_tokens(&self) -> Result<Vec<AthleteToken>, AthleteTokenRepositoryError>;

    /// Access token of one athlete.
    async fn token_for(
        &self,
        athlete_id: AthleteId,
    ) -> Result<AthleteToken, AthleteTokenRepositoryError>;

    /// Refresh credentials of every known athlete.
    async fn refresh_tokens(
        &self,
    ) -> Result<Vec<StoredRefreshToken>, AthleteTokenRepositoryError>;

    /// Refresh credentials of one athlete.
    async fn refresh_token_for(
        &self,
        athlete_id: AthleteId,
    ) -> Result<StoredRefreshToken, AthleteTokenRepositoryError>;
}
