//! Domain types and services for the heatmap pipeline.
//!
//! Purpose: own the tile engine, the concurrency primitives, and the
//! orchestration logic. Everything that touches infrastructure goes through
//! the traits in [`ports`].
//!
//! Public surface:
//! - `BoundedExecutor`: fan-out with a concurrency cap and two failure modes.
//! - `PeriodicJob`: interval scheduler with optional distributed lock.
//! - `tiles`: projection, tile sets, and render parameters.
//! - `AthleteUpdateService`: the import/download/rebuild pipeline.
//! - `AthleteAuthService`: OAuth code exchange and token refresh.

pub mod athlete;
pub mod athlete_auth;
pub mod athlete_state;
pub mod athlete_update;
pub mod batch;
pub mod executor;
pub mod jobs;
pub mod periodic_job;
pub mod ports;
pub mod tiles;

pub use self::athlete::{
    AccessToken, ActivityId, ActivitySummary, AthleteId, AthleteToken, AuthorizationGrant, MapId,
    MessageId, RefreshToken, TokenGrant, stream_object_key,
};
pub use self::athlete_auth::{AthleteAuthError, AthleteAuthService};
pub use self::athlete_state::{AthleteState, AthleteStateParseError};
pub use self::athlete_update::{
    AthleteUpdateConfig, AthleteUpdateError, AthleteUpdatePorts, AthleteUpdateReport,
    AthleteUpdateService, MapRebuildSummary,
};
pub use self::batch::{TileBatch, tile_batches, to_batches};
pub use self::executor::{BoundedExecutor, TaskErrors, TaskJoinError};
pub use self::jobs::{
    ATHLETE_UPDATE_JOB, ATHLETE_UPDATE_LOCK, AthleteUpdateJob, TOKEN_REFRESH_JOB,
    TOKEN_REFRESH_LOCK, TokenRefreshJob,
};
pub use self::periodic_job::{CycleOutcome, JobError, PeriodicJob, ScheduledJob};
