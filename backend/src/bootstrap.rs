//! Adapter wiring shared by the worker and the rebuild CLI.

use std::path::PathBuf;
use std::sync::Arc;

use mockable::DefaultClock;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::HeatmapConfig;
use crate::domain::ports::{ActivitySource, AthleteTokenRepository, DistributedLock};
use crate::domain::{AthleteAuthService, AthleteUpdatePorts, AthleteUpdateService};
use crate::outbound::object_store::FsObjectStore;
use crate::outbound::persistence::{
    DbPool, DieselActivityRepository, DieselAthleteStateRepository, DieselAthleteTokenRepository,
    DieselDistributedLock, DieselMapProcessingRepository, DieselTileQueue, PoolConfig, PoolError,
};
use crate::outbound::strava::StravaHttpSource;

/// Failures while constructing the production adapters.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("failed to build activity API client: {message}")]
    HttpClient { message: String },
    #[error("failed to open object store at {}: {message}", .path.display())]
    ObjectStore { path: PathBuf, message: String },
}

/// Services and shared ports backed by the production adapters.
pub struct Services {
    pub lock: Arc<dyn DistributedLock>,
    pub tokens: Arc<dyn AthleteTokenRepository>,
    pub auth: Arc<AthleteAuthService>,
    pub updater: Arc<AthleteUpdateService>,
}

/// Install the JSON tracing subscriber. Failure is logged, not fatal.
pub fn init_tracing() {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }
}

/// Build every adapter from validated configuration.
///
/// # Errors
///
/// Returns [`BootstrapError`] when the pool, HTTP client, or object store
/// cannot be created.
pub async fn build_services(config: &HeatmapConfig) -> Result<Services, BootstrapError> {
    let pool = DbPool::new(
        PoolConfig::new(&config.database.url).with_max_size(config.database.max_connections),
    )
    .await?;
    let status = pool.status();
    info!(
        max_connections = config.database.max_connections,
        open = status.connections,
        idle = status.idle,
        "database pool ready"
    );

    let api = &config.activity_api;
    let source: Arc<dyn ActivitySource> = Arc::new(
        StravaHttpSource::new(api.base_url.clone(), api.credentials.clone(), api.timeout)
            .map_err(|err| BootstrapError::HttpClient {
                message: err.to_string(),
            })?,
    );
    let object_store =
        FsObjectStore::open(&config.storage_root).map_err(|err| BootstrapError::ObjectStore {
            path: config.storage_root.clone(),
            message: err.to_string(),
        })?;
    let tokens: Arc<dyn AthleteTokenRepository> =
        Arc::new(DieselAthleteTokenRepository::new(pool.clone()));

    let ports = AthleteUpdatePorts {
        activity_source: Arc::clone(&source),
        activity_repository: Arc::new(DieselActivityRepository::new(pool.clone())),
        object_store: Arc::new(object_store),
        tile_queue: Arc::new(DieselTileQueue::new(pool.clone())),
        state_repository: Arc::new(DieselAthleteStateRepository::new(pool.clone())),
        map_processing_repository: Arc::new(DieselMapProcessingRepository::new(pool.clone())),
    };

    Ok(Services {
        lock: Arc::new(DieselDistributedLock::new(pool)),
        tokens: Arc::clone(&tokens),
        auth: Arc::new(AthleteAuthService::new(source, tokens)),
        updater: Arc::new(AthleteUpdateService::new(
            ports,
            Arc::new(DefaultClock),
            config.update.clone(),
        )),
    })
}
