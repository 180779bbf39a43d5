//! OAuth credential lifecycle for athletes.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::athlete::{AthleteId, AthleteToken};
use crate::domain::ports::{
    ActivitySource, ActivitySourceError, AthleteTokenRepository, AthleteTokenRepositoryError,
};

/// Failures raised while exchanging or refreshing credentials.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AthleteAuthError {
    #[error("authorisation code exchange failed: {source}")]
    Exchange {
        #[source]
        source: ActivitySourceError,
    },
    #[error("token refresh for athlete {athlete_id} failed: {source}")]
    Refresh {
        athlete_id: AthleteId,
        #[source]
        source: ActivitySourceError,
    },
    #[error(transparent)]
    Storage(#[from] AthleteTokenRepositoryError),
}

/// Exchanges authorisation codes and keeps stored tokens fresh.
pub struct AthleteAuthService {
    source: Arc<dyn ActivitySource>,
    tokens: Arc<dyn AthleteTokenRepository>,
}

impl AthleteAuthService {
    /// Create the service over the remote API and token store.
    pub fn new(source: Arc<dyn ActivitySource>, tokens: Arc<dyn AthleteTokenRepository>) -> Self {
        Self { source, tokens }
    }

    /// Exchange `code` for a grant, persist it, and return the athlete's
    /// access token.
    pub async fn exchange_code(&self, code: &str) -> Result<AthleteToken, AthleteAuthError> {
        let grant = self
            .source
            .exchange_auth_code(code)
            .await
            .map_err(|source| AthleteAuthError::Exchange { source })?;
        self.tokens.persist(grant.athlete_id, &grant.tokens).await?;
        info!(athlete_id = %grant.athlete_id, "authorisation code exchanged");
        Ok(grant.athlete_token())
    }

    /// Refresh and persist the stored grant of one athlete.
    pub async fn refresh(&self, athlete_id: AthleteId) -> Result<AthleteToken, AthleteAuthError> {
        let stored = self.tokens.refresh_token_for(athlete_id).await?;
        let grant = self
            .source
            .refresh_token(&stored.refresh_token)
            .await
            .map_err(|source| AthleteAuthError::Refresh { athlete_id, source })?;
        self.tokens.persist(athlete_id, &grant).await?;
        debug!(%athlete_id, expires_at = %grant.expires_at, "access token refreshed");
        Ok(AthleteToken {
            athlete_id,
            access_token: grant.access_token,
        })
    }

    /// Refresh every stored grant, continuing past individual failures.
    ///
    /// Returns the refreshed tokens and the failures that were observed.
    pub async fn refresh_all(
        &self,
    ) -> Result<(Vec<AthleteToken>, Vec<AthleteAuthError>), AthleteAuthError> {
        let stored = self.tokens.refresh_tokens().await?;
        info!(athletes = stored.len(), "refreshing athlete tokens");
        let mut refreshed = Vec::with_capacity(stored.len());
        let mut failures = Vec::new();
        for entry in stored {
            match self.refresh(entry.athlete_id).await {
                Ok(token) => refreshed.push(token),
                Err(err) => {
                    warn!(athlete_id = %entry.athlete_id, error = %err, "token refresh failed");
                    failures.push(err);
                }
            }
        }
        Ok((refreshed, failures))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::athlete::{AccessToken, AuthorizationGrant, RefreshToken, TokenGrant};
    use crate::domain::ports::{MockActivitySource, MockAthleteTokenRepository};
    use crate::test_support::{InMemoryActivitySource, InMemoryAthleteTokenRepository};

    fn grant(access: &str, refresh: &str) -> TokenGrant {
        TokenGrant {
            access_token: AccessToken::new(access),
            refresh_token: RefreshToken::new(refresh),
            expires_at: Utc
                .with_ymd_and_hms(2026, 5, 1, 12, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[fixture]
    fn source() -> Arc<InMemoryActivitySource> {
        Arc::new(InMemoryActivitySource::default())
    }

    #[fixture]
    fn tokens() -> Arc<InMemoryAthleteTokenRepository> {
        Arc::new(InMemoryAthleteTokenRepository::default())
    }

    #[rstest]
    #[tokio::test]
    async fn exchange_persists_the_grant(
        source: Arc<InMemoryActivitySource>,
        tokens: Arc<InMemoryAthleteTokenRepository>,
    ) {
        let athlete_id = AthleteId::new(5);
        source.add_authorization(
            "code-1",
            AuthorizationGrant {
                athlete_id,
                tokens: grant("a1", "r1"),
            },
        );
        let service = AthleteAuthService::new(source, tokens.clone());

        let token = service.exchange_code("code-1").await.expect("exchange");

        assert_eq!(token.athlete_id, athlete_id);
        assert_eq!(token.access_token.expose(), "a1");
        assert_eq!(tokens.grant_for(athlete_id), Some(grant("a1", "r1")));
    }

    #[rstest]
    #[tokio::test]
    async fn refresh_replaces_the_stored_grant(
        source: Arc<InMemoryActivitySource>,
        tokens: Arc<InMemoryAthleteTokenRepository>,
    ) {
        let athlete_id = AthleteId::new(6);
        tokens
            .persist(athlete_id, &grant("old", "r-old"))
            .await
            .expect("seed grant");
        source.add_refresh(&RefreshToken::new("r-old"), Ok(grant("new", "r-new")));
        let service = AthleteAuthService::new(source, tokens.clone());

        let token = service.refresh(athlete_id).await.expect("refresh");

        assert_eq!(token.access_token.expose(), "new");
        assert_eq!(tokens.grant_for(athlete_id), Some(grant("new", "r-new")));
    }

    #[rstest]
    #[tokio::test]
    async fn refresh_all_continues_past_failures(
        source: Arc<InMemoryActivitySource>,
        tokens: Arc<InMemoryAthleteTokenRepository>,
    ) {
        for (id, refresh) in [(1, "r1"), (2, "r2"), (3, "r3")] {
            tokens
                .persist(AthleteId::new(id), &grant("old", refresh))
                .await
                .expect("seed grant");
        }
        source.add_refresh(&RefreshToken::new("r1"), Ok(grant("n1", "r1b")));
        source.add_refresh(
            &RefreshToken::new("r2"),
            Err(ActivitySourceError::rate_limited("slow down")),
        );
        source.add_refresh(&RefreshToken::new("r3"), Ok(grant("n3", "r3b")));
        let service = AthleteAuthService::new(source, tokens);

        let (refreshed, failures) = service.refresh_all().await.expect("listing succeeds");

        let ids: Vec<_> = refreshed.iter().map(|token| token.athlete_id).collect();
        assert_eq!(ids, vec![AthleteId::new(1), AthleteId::new(3)]);
        assert!(matches!(
            failures.as_slice(),
            [AthleteAuthError::Refresh { athlete_id, source }]
                if *athlete_id == AthleteId::new(2) && source.is_rate_limited()
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn missing_credentials_surface_as_storage_errors() {
        let mut repository = MockAthleteTokenRepository::new();
        repository
            .expect_refresh_token_for()
            .returning(|athlete_id| Err(AthleteTokenRepositoryError::missing(athlete_id.get())));
        let mut source = MockActivitySource::new();
        source.expect_refresh_token().never();
        let service = AthleteAuthService::new(Arc::new(source), Arc::new(repository));

        let err = service
            .refresh(AthleteId::new(77))
            .await
            .expect_err("no stored tokens");

        assert_eq!(
            err,
            AthleteAuthError::Storage(AthleteTokenRepositoryError::missing(77_i64))
        );
    }
}
