//! Driven port for the remote fitness activity API.
//!
//! The adapter owns transport, pagination, and OAuth wire formats; the domain
//! only sees summaries, raw stream bytes, and token grants.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::athlete::{
    AccessToken, ActivityId, ActivitySummary, AuthorizationGrant, RefreshToken, TokenGrant,
};

define_port_error! {
    /// Errors surfaced while calling the remote activity API.
    pub enum ActivitySourceError {
        /// The access token was rejected.
        Unauthorized { message: String } =>
            "activity api rejected credentials: {message}",
        /// The requested resource does not exist remotely.
        NotFound { message: String } =>
            "activity api resource not found: {message}",
        /// The API asked the caller to back off.
        RateLimited { message: String } =>
            "activity api rate limited request: {message}",
        /// The call exceeded the configured timeout.
        Timeout { message: String } =>
            "activity api timeout: {message}",
        /// Network transport or an unexpected status.
        Transport { message: String } =>
            "activity api transport failed: {message}",
        /// The response body could not be decoded.
        Decode { message: String } =>
            "activity api response decode failed: {message}",
    }
}

/// Port for reading athlete data from the remote activity API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// List every activity visible to `token`, following pagination until the
    /// API returns an empty page.
    async fn list_all_activities(
        &self,
        token: &AccessToken,
    ) -> Result<Vec<ActivitySummary>, ActivitySourceError>;

    /// Fetch the raw location stream payload for one activity.
    async fn fetch_stream_bytes(
        &self,
        token: &AccessToken,
        activity_id: ActivityId,
    ) -> Result<Vec<u8>, ActivitySourceError>;

    /// Exchange an OAuth authorisation code for a token grant.
    async fn exchange_auth_code(
        &self,
        code: &str,
    ) -> Result<AuthorizationGrant, ActivitySourceError>;

    /// Exchange a refresh token for a fresh grant.
    async fn refresh_token(
        &self,
        refresh_token: &RefreshToken,
    ) -> Result<TokenGrant, ActivitySourceError>;
}
