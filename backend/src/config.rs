//! Runtime settings loaded via OrthoConfig.
//!
//! Values come from CLI flags, `HEATMAP_*` environment variables, or a config
//! file, in OrthoConfig's usual precedence. [`HeatmapSettings::validate`]
//! turns the raw values into the typed configuration the binaries wire up.

use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use reqwest::Url;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::domain::AthleteUpdateConfig;
use crate::domain::tiles::ZoomRange;
use crate::outbound::strava::StravaCredentials;

const DEFAULT_STRAVA_API_URL: &str = "https://www.strava.com/api/v3/";
const DEFAULT_STORAGE_ROOT: &str = "./object-store";
const FALLBACK_DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Raw configuration values for the heatmap binaries.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "HEATMAP")]
pub struct HeatmapSettings {
    /// PostgreSQL connection URL. Falls back to `DATABASE_URL` when omitted.
    pub database_url: Option<String>,
    /// Upper bound on pooled database connections.
    #[ortho_config(default = 10)]
    pub database_max_connections: u32,
    /// OAuth client id registered with the activity API.
    #[serde(default, deserialize_with = "string_or_number")]
    pub strava_client_id: Option<String>,
    /// OAuth client secret registered with the activity API.
    #[serde(default, deserialize_with = "string_or_number")]
    pub strava_client_secret: Option<String>,
    /// Base URL of the activity API.
    pub strava_api_url: Option<String>,
    #[ortho_config(default = 5)]
    pub http_timeout_seconds: u64,
    /// Directory holding raw activity streams.
    pub storage_root: Option<PathBuf>,
    #[ortho_config(default = 32)]
    pub storage_concurrency_limit: usize,
    #[ortho_config(default = 8)]
    pub download_concurrency_limit: usize,
    /// Maximum tiles per queued render envelope.
    #[ortho_config(default = 250)]
    pub queue_batch_size: usize,
    #[ortho_config(default = 2)]
    pub min_tile_zoom: u8,
    #[ortho_config(default = 20)]
    pub max_tile_zoom: u8,
    #[ortho_config(default = 3600)]
    pub athlete_update_interval_seconds: u64,
    #[ortho_config(default = 3600)]
    pub token_refresh_interval_seconds: u64,
}

/// Problems found while loading or validating settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {message}")]
    Load { message: String },
    #[error("missing required setting {key}")]
    Missing { key: &'static str },
    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl SettingsError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Connection settings for the database pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Connection settings for the remote activity API.
#[derive(Debug, Clone)]
pub struct ActivityApiConfig {
    pub base_url: Url,
    pub credentials: StravaCredentials,
    pub timeout: Duration,
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct HeatmapConfig {
    pub database: DatabaseConfig,
    pub activity_api: ActivityApiConfig,
    pub storage_root: PathBuf,
    pub update: AthleteUpdateConfig,
    pub athlete_update_interval: Duration,
    pub token_refresh_interval: Duration,
}

impl HeatmapSettings {
    /// Load settings from `args` plus the environment and config files.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Load`] when OrthoConfig rejects the inputs.
    pub fn load_from<I, T>(args: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::load_from_iter(args).map_err(|err| SettingsError::Load {
            message: err.to_string(),
        })
    }

    /// Resolve the database URL, falling back to `DATABASE_URL`.
    pub fn database_url(&self) -> Option<String> {
        self.database_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| env::var(FALLBACK_DATABASE_URL_VAR).ok())
            .filter(|url| !url.trim().is_empty())
    }

    /// Return the configured storage root, falling back to the default.
    pub fn storage_root(&self) -> PathBuf {
        self.storage_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT))
    }

    /// Check every value and build the typed configuration.
    ///
    /// # Errors
    ///
    /// Returns the first missing or out-of-range setting.
    pub fn validate(&self) -> Result<HeatmapConfig, SettingsError> {
        let database = DatabaseConfig {
            url: self.database_url().ok_or(SettingsError::Missing {
                key: "database_url",
            })?,
            max_connections: positive_u32(
                "database_max_connections",
                self.database_max_connections,
            )?,
        };

        Ok(HeatmapConfig {
            database,
            activity_api: self.activity_api()?,
            storage_root: self.storage_root(),
            update: self.update_config()?,
            athlete_update_interval: positive_seconds(
                "athlete_update_interval_seconds",
                self.athlete_update_interval_seconds,
            )?,
            token_refresh_interval: positive_seconds(
                "token_refresh_interval_seconds",
                self.token_refresh_interval_seconds,
            )?,
        })
    }

    fn activity_api(&self) -> Result<ActivityApiConfig, SettingsError> {
        let raw_url = self
            .strava_api_url
            .as_deref()
            .unwrap_or(DEFAULT_STRAVA_API_URL);
        let mut base_url = Url::parse(raw_url)
            .map_err(|err| SettingsError::invalid("strava_api_url", err.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(ActivityApiConfig {
            base_url,
            credentials: StravaCredentials {
                client_id: required(&self.strava_client_id, "strava_client_id")?,
                client_secret: required(&self.strava_client_secret, "strava_client_secret")?,
            },
            timeout: positive_seconds("http_timeout_seconds", self.http_timeout_seconds)?,
        })
    }

    fn update_config(&self) -> Result<AthleteUpdateConfig, SettingsError> {
        let zoom_range = ZoomRange::new(self.min_tile_zoom, self.max_tile_zoom)
            .map_err(|err| SettingsError::invalid("min_tile_zoom", err.to_string()))?;
        let queue_batch_size = NonZeroUsize::new(self.queue_batch_size)
            .ok_or_else(|| SettingsError::invalid("queue_batch_size", "must be at least 1"))?;

        Ok(AthleteUpdateConfig {
            download_concurrency: positive_usize(
                "download_concurrency_limit",
                self.download_concurrency_limit,
            )?,
            storage_concurrency: positive_usize(
                "storage_concurrency_limit",
                self.storage_concurrency_limit,
            )?,
            zoom_range,
            queue_batch_size,
        })
    }
}

/// Accept a scalar as text.
///
/// The environment layer types `HEATMAP_STRAVA_CLIENT_ID=123` as an integer,
/// while OAuth forms want the original digits.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(
        Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
            Scalar::Text(text) => text,
            Scalar::Unsigned(number) => number.to_string(),
            Scalar::Signed(number) => number.to_string(),
        }),
    )
}

fn required(value: &Option<String>, key: &'static str) -> Result<String, SettingsError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or(SettingsError::Missing { key })
}

fn positive_usize(key: &'static str, value: usize) -> Result<usize, SettingsError> {
    if value == 0 {
        return Err(SettingsError::invalid(key, "must be at least 1"));
    }
    Ok(value)
}

fn positive_u32(key: &'static str, value: u32) -> Result<u32, SettingsError> {
    if value == 0 {
        return Err(SettingsError::invalid(key, "must be at least 1"));
    }
    Ok(value)
}

fn positive_seconds(key: &'static str, value: u64) -> Result<Duration, SettingsError> {
    if value == 0 {
        return Err(SettingsError::invalid(key, "must be at least 1 second"));
    }
    Ok(Duration::from_secs(value))
}
