//! Reqwest-backed remote activity API adapter.
//!
//! This adapter owns transport details only: URL construction, bearer and
//! form authentication, HTTP error mapping, and JSON decoding into domain
//! records. Retries and rate-limit bookkeeping are left to callers.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::dto::{ActivityDto, AuthorizationCodeDto, TokenDto};
use crate::domain::ports::{ActivitySource, ActivitySourceError};
use crate::domain::{
    AccessToken, ActivityId, ActivitySummary, AuthorizationGrant, RefreshToken, TokenGrant,
};

/// Activities requested per listing page.
pub(super) const PAGE_SIZE: u32 = 200;

/// OAuth application credentials registered with the remote API.
#[derive(Clone)]
pub struct StravaCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for StravaCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StravaCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Remote API adapter issuing requests relative to one base URL.
pub struct StravaHttpSource {
    client: Client,
    base_url: Url,
    credentials: StravaCredentials,
}

impl StravaHttpSource {
    /// Build an adapter using a reqwest client with an explicit request timeout.
    ///
    /// `base_url` should end with `/` so relative paths resolve beneath it.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        base_url: Url,
        credentials: StravaCredentials,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ActivitySourceError> {
        self.base_url.join(path).map_err(|err| {
            ActivitySourceError::transport(format!("invalid endpoint {path}: {err}"))
        })
    }

    async fn fetch_activity_page(
        &self,
        token: &AccessToken,
        page: u32,
    ) -> Result<Vec<ActivityDto>, ActivitySourceError> {
        let request = self
            .client
            .get(self.endpoint("activities")?)
            .bearer_auth(token.expose())
            .query(&[("page", page), ("per_page", PAGE_SIZE)]);
        let body = send(request).await?;
        decode(&body, "activity page")
    }

    async fn post_token_form(
        &self,
        grant: &[(&str, &str)],
    ) -> Result<Vec<u8>, ActivitySourceError> {
        let mut form = vec![
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        form.extend_from_slice(grant);
        let request = self.client.post(self.endpoint("oauth/token")?).form(&form);
        send(request).await
    }
}

#[async_trait]
impl ActivitySource for StravaHttpSource {
    async fn list_all_activities(
        &self,
        token: &AccessToken,
    ) -> Result<Vec<ActivitySummary>, ActivitySourceError> {
        let mut activities = Vec::new();
        for page in 1.. {
            let batch = self.fetch_activity_page(token, page).await?;
            if batch.is_empty() {
                break;
            }
            debug!(page, count = batch.len(), "fetched activity page");
            activities.extend(batch.into_iter().map(ActivitySummary::from));
        }
        Ok(activities)
    }

    async fn fetch_stream_bytes(
        &self,
        token: &AccessToken,
        activity_id: ActivityId,
    ) -> Result<Vec<u8>, ActivitySourceError> {
        let request = self
            .client
            .get(self.endpoint(&format!("activities/{activity_id}/streams"))?)
            .bearer_auth(token.expose())
            .query(&[("keys", "latlng")]);
        send(request).await
    }

    async fn exchange_auth_code(
        &self,
        code: &str,
    ) -> Result<AuthorizationGrant, ActivitySourceError> {
        let body = self
            .post_token_form(&[("grant_type", "authorization_code"), ("code", code)])
            .await?;
        let dto: AuthorizationCodeDto = decode(&body, "authorization response")?;
        dto.into_grant().map_err(ActivitySourceError::decode)
    }

    async fn refresh_token(
        &self,
        refresh_token: &RefreshToken,
    ) -> Result<TokenGrant, ActivitySourceError> {
        let body = self
            .post_token_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose()),
            ])
            .await?;
        let dto: TokenDto = decode(&body, "refresh response")?;
        dto.into_grant().map_err(ActivitySourceError::decode)
    }
}

async fn send(request: RequestBuilder) -> Result<Vec<u8>, ActivitySourceError> {
    let response = request.send().await.map_err(map_transport_error)?;
    let status = response.status();
    let body = response.bytes().await.map_err(map_transport_error)?;
    if !status.is_success() {
        return Err(map_status_error(status, body.as_ref()));
    }
    Ok(body.to_vec())
}

pub(super) fn decode<T: DeserializeOwned>(
    body: &[u8],
    what: &str,
) -> Result<T, ActivitySourceError> {
    serde_json::from_slice(body)
        .map_err(|err| ActivitySourceError::decode(format!("invalid {what} JSON: {err}")))
}

fn map_transport_error(error: reqwest::Error) -> ActivitySourceError {
    if error.is_timeout() {
        ActivitySourceError::timeout(error.to_string())
    } else {
        ActivitySourceError::transport(error.to_string())
    }
}

pub(super) fn map_status_error(status: StatusCode, body: &[u8]) -> ActivitySourceError {
    let body_preview = body_preview(body);
    let message = if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    };

    match status {
        StatusCode::UNAUTHORIZED => ActivitySourceError::unauthorized(message),
        StatusCode::NOT_FOUND => ActivitySourceError::not_found(message),
        StatusCode::TOO_MANY_REQUESTS => ActivitySourceError::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ActivitySourceError::timeout(message)
        }
        _ => ActivitySourceError::transport(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 120;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut preview: String = compact.chars().take(PREVIEW_CHAR_LIMIT).collect();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        preview.push_str("...");
    }
    preview
}
