//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL-backed repositories, advisory lock, and tile
//!   queue outbox using Diesel ORM
//! - **strava**: reqwest client for the remote activity API
//! - **object_store**: cap-std filesystem store for raw activity streams
//!
//! Adapters are thin translators between domain types and
//! infrastructure-specific representations. They contain no pipeline logic.

pub mod object_store;
pub mod persistence;
pub mod strava;
