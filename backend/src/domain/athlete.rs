//! Athlete, activity, and credential identifiers.
//!
//! Token strings are wrapped so they never leak through `Debug` output in
//! logs or panic messages.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Remote API identifier for one athlete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AthleteId(i64);

impl AthleteId {
    /// Wrap a raw remote athlete id.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// The raw id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AthleteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote API identifier for one recorded activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(i64);

impl ActivityId {
    /// Wrap a raw remote activity id.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// The raw id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the heatmap an athlete's tiles are rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(Uuid);

impl MapId {
    /// Wrap an existing map UUID.
    pub fn new(value: Uuid) -> Self {
        Self(value)
    }

    /// Generate a fresh random map identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Borrow the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned by the tile queue to one enqueued envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap a queue message id.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! secret_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name(String);

        impl $name {
            /// Wrap a secret value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Expose the raw secret for transport.
            pub fn expose(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(<redacted>)"))
            }
        }
    };
}

secret_string!(
    /// Bearer token authorising remote API calls for one athlete.
    AccessToken
);
secret_string!(
    /// Long-lived token exchanged for fresh access tokens.
    RefreshToken
);

/// Credentials needed to act on behalf of one athlete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AthleteToken {
    pub athlete_id: AthleteId,
    pub access_token: AccessToken,
}

/// Token pair issued by the remote OAuth endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub expires_at: DateTime<Utc>,
}

/// Result of exchanging an authorisation code: the grant plus its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub athlete_id: AthleteId,
    pub tokens: TokenGrant,
}

impl AuthorizationGrant {
    /// Pair the athlete id with the access token only.
    pub fn athlete_token(&self) -> AthleteToken {
        AthleteToken {
            athlete_id: self.athlete_id,
            access_token: self.tokens.access_token.clone(),
        }
    }
}

/// Activity metadata returned by the remote listing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    pub id: ActivityId,
    pub athlete_id: AthleteId,
    pub name: String,
    pub sport_type: String,
    pub start_date: DateTime<Utc>,
    /// Distance in metres.
    pub distance: f64,
}

/// Object-store key holding the raw stream for one activity.
pub fn stream_object_key(athlete_id: AthleteId, activity_id: ActivityId) -> String {
    format!("{athlete_id}/{activity_id}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn secrets_are_redacted_in_debug_output() {
        let token = AccessToken::new("abc123");
        let rendered = format!("{token:?}");

        assert_eq!(rendered, "AccessToken(<redacted>)");
        assert_eq!(token.expose(), "abc123");
    }

    #[rstest]
    fn athlete_token_debug_hides_access_token() {
        let token = AthleteToken {
            athlete_id: AthleteId::new(7),
            access_token: AccessToken::new("sekrit"),
        };

        assert!(!format!("{token:?}").contains("sekrit"));
    }

    #[rstest]
    #[case(1, 2, "1/2.json")]
    #[case(42, 9_000_000_001, "42/9000000001.json")]
    fn stream_keys_join_athlete_and_activity(
        #[case] athlete: i64,
        #[case] activity: i64,
        #[case] expected: &str,
    ) {
        let key = stream_object_key(AthleteId::new(athlete), ActivityId::new(activity));
        assert_eq!(key, expected);
    }
}
