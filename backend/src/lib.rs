//! Background-processing core for personal activity heatmaps.
//!
//! The crate is split along hexagonal lines: `domain` owns the tile engine,
//! concurrency primitives, and orchestration services; `domain::ports`
//! declares the driven interfaces; `outbound` provides PostgreSQL, remote
//! activity API, and filesystem adapters; `bootstrap` wires them together
//! for the binaries.

pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod outbound;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
