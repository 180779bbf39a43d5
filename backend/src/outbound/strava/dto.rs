//! DTOs for decoding remote activity API responses.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{
    AccessToken, ActivityId, ActivitySummary, AthleteId, AuthorizationGrant, RefreshToken,
    TokenGrant,
};

#[derive(Debug, Deserialize)]
pub(super) struct AthleteRefDto {
    pub(super) id: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct ActivityDto {
    pub(super) id: i64,
    pub(super) athlete: AthleteRefDto,
    #[serde(default)]
    pub(super) name: String,
    #[serde(default)]
    pub(super) sport_type: String,
    pub(super) start_date: DateTime<Utc>,
    #[serde(default)]
    pub(super) distance: f64,
}

impl From<ActivityDto> for ActivitySummary {
    fn from(dto: ActivityDto) -> Self {
        Self {
            id: ActivityId::new(dto.id),
            athlete_id: AthleteId::new(dto.athlete.id),
            name: dto.name,
            sport_type: dto.sport_type,
            start_date: dto.start_date,
            distance: dto.distance,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TokenDto {
    pub(super) access_token: String,
    pub(super) refresh_token: String,
    /// Unix timestamp in seconds.
    pub(super) expires_at: i64,
}

impl TokenDto {
    pub(super) fn into_grant(self) -> Result<TokenGrant, String> {
        let expires_at = DateTime::from_timestamp(self.expires_at, 0)
            .ok_or_else(|| format!("expires_at {} is out of range", self.expires_at))?;
        Ok(TokenGrant {
            access_token: AccessToken::new(self.access_token),
            refresh_token: RefreshToken::new(self.refresh_token),
            expires_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct AuthorizationCodeDto {
    #[serde(flatten)]
    pub(super) tokens: TokenDto,
    pub(super) athlete: AthleteRefDto,
}

impl AuthorizationCodeDto {
    pub(super) fn into_grant(self) -> Result<AuthorizationGrant, String> {
        Ok(AuthorizationGrant {
            athlete_id: AthleteId::new(self.athlete.id),
            tokens: self.tokens.into_grant()?,
        })
    }
}
