//! Driven ports for the heatmap pipeline.
//!
//! Each port is a narrow async trait with a strongly typed error enum. The
//! production adapters live under `crate::outbound`; in-memory doubles live
//! in `crate::test_support`.

mod macros;
pub(crate) use macros::define_port_error;

mod activity_repository;
mod activity_source;
mod athlete_state_repository;
mod athlete_token_repository;
mod distributed_lock;
mod map_processing_repository;
mod object_store;
mod tile_queue;

#[cfg(test)]
pub use activity_repository::MockActivityRepository;
pub use activity_repository::{ActivityRepository, ActivityRepositoryError};
#[cfg(test)]
pub use activity_source::MockActivitySource;
pub use activity_source::{ActivitySource, ActivitySourceError};
#[cfg(test)]
pub use athlete_state_repository::MockAthleteStateRepository;
pub use athlete_state_repository::{AthleteStateRepository, AthleteStateRepositoryError};
#[cfg(test)]
pub use athlete_token_repository::MockAthleteTokenRepository;
pub use athlete_token_repository::{
    AthleteTokenRepository, AthleteTokenRepositoryError, StoredRefreshToken,
};
#[cfg(test)]
pub use distributed_lock::MockDistributedLock;
pub use distributed_lock::{
    DistributedLock, DistributedLockError, GuardedWork, LockId, LockOutcome,
};
#[cfg(test)]
pub use map_processing_repository::MockMapProcessingRepository;
pub use map_processing_repository::{
    MapProcessingRepository, MapProcessingRepositoryError, MapProcessingSummary, ProcessingStatus,
};
#[cfg(test)]
pub use object_store::MockObjectStore;
pub use object_store::{ObjectStore, ObjectStoreError};
#[cfg(test)]
pub use tile_queue::MockTileQueue;
pub use tile_queue::{TileQueue, TileQueueError};
