//! Background job bodies scheduled by the worker binary.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::domain::athlete::AthleteId;
use crate::domain::athlete_auth::AthleteAuthService;
use crate::domain::athlete_update::AthleteUpdateService;
use crate::domain::periodic_job::{JobError, ScheduledJob};
use crate::domain::ports::{AthleteTokenRepository, LockId};

/// Advisory lock guarding the token refresh job.
pub const TOKEN_REFRESH_LOCK: LockId = LockId::new(1);
/// Advisory lock guarding the athlete update job.
pub const ATHLETE_UPDATE_LOCK: LockId = LockId::new(2);

/// Name the token refresh job logs under.
pub const TOKEN_REFRESH_JOB: &str = "AthleteTokenRefresh";
/// Name the athlete update job logs under.
pub const ATHLETE_UPDATE_JOB: &str = "AthleteUpdate";

/// Refreshes every stored athlete grant.
pub struct TokenRefreshJob {
    auth: Arc<AthleteAuthService>,
}

impl TokenRefreshJob {
    /// Wrap the auth service in a scheduled job.
    pub fn new(auth: Arc<AthleteAuthService>) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl ScheduledJob for TokenRefreshJob {
    async fn run(&self) -> Result<(), JobError> {
        let (refreshed, failures) = self
            .auth
            .refresh_all()
            .await
            .map_err(|err| JobError::new(err.to_string()))?;
        info!(refreshed = refreshed.len(), failed = failures.len(), "token refresh finished");
        if failures.is_empty() {
            return Ok(());
        }
        let messages: Vec<String> = failures.iter().map(ToString::to_string).collect();
        Err(JobError::new(format!(
            "{} token refresh(es) failed: {}",
            failures.len(),
            messages.join("; ")
        )))
    }
}

/// Runs the update pipeline for every athlete with stored credentials.
pub struct AthleteUpdateJob {
    tokens: Arc<dyn AthleteTokenRepository>,
    updater: Arc<AthleteUpdateService>,
}

impl AthleteUpdateJob {
    /// Build the update job over its token store and pipeline.
    pub fn new(
        tokens: Arc<dyn AthleteTokenRepository>,
        updater: Arc<AthleteUpdateService>,
    ) -> Self {
        Self { tokens, updater }
    }
}

#[async_trait]
impl ScheduledJob for AthleteUpdateJob {
    async fn run(&self) -> Result<(), JobError> {
        let tokens = self
            .tokens
            .current_tokens()
            .await
            .map_err(|err| JobError::new(err.to_string()))?;
        info!(athletes = tokens.len(), "updating activity information");

        let mut failed: Vec<AthleteId> = Vec::new();
        for token in &tokens {
            let report = self.updater.update_athlete(token).await;
            if !report.is_success() {
                failed.push(token.athlete_id);
            }
        }
        if failed.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = failed.iter().map(ToString::to_string).collect();
        Err(JobError::new(format!(
            "athlete update ended in error for: {}",
            ids.join(", ")
        )))
    }
}
