//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Concrete implementations of the pipeline's driven ports backed by
//! PostgreSQL via `diesel-async` and `bb8` connection pooling.
//!
//! - **Thin adapters**: repositories only translate between Diesel rows and
//!   domain types. No pipeline logic resides here.
//! - **Internal models**: row structs (`models.rs`) and table definitions
//!   (`schema.rs`) never leave this module.
//! - **Strongly typed errors**: pool and Diesel failures map onto each
//!   port's error enum.
//!
//! # Example
//!
//! ```ignore
//! use heatmap::outbound::persistence::{DbPool, DieselActivityRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/heatmap")).await?;
//! let activities = DieselActivityRepository::new(pool.clone());
//! ```

mod diesel_activity_repository;
mod diesel_athlete_state_repository;
mod diesel_athlete_token_repository;
mod diesel_distributed_lock;
pub(crate) mod diesel_helpers;
mod diesel_map_processing_repository;
mod diesel_tile_queue;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_activity_repository::DieselActivityRepository;
pub use diesel_athlete_state_repository::DieselAthleteStateRepository;
pub use diesel_athlete_token_repository::DieselAthleteTokenRepository;
pub use diesel_distributed_lock::DieselDistributedLock;
pub use diesel_map_processing_repository::DieselMapProcessingRepository;
pub use diesel_tile_queue::DieselTileQueue;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPool, PoolConfig, PoolError, PoolStatus};
