//! Test utilities for the heatmap crate.
//!
//! In-memory doubles for every driven port, shared by unit tests (in `src/`)
//! and integration tests (in `tests/`). Compiled for tests and when the
//! `test-support` feature is enabled.

use std::sync::{Mutex, MutexGuard, PoisonError};

mod clock;
mod lock;
mod object_store;
mod pipeline;

pub use clock::MutableClock;
pub use lock::InMemoryDistributedLock;
pub use object_store::TempObjectStore;
pub use pipeline::{
    InMemoryActivityRepository, InMemoryActivitySource, InMemoryAthleteTokenRepository,
    InMemoryMapProcessingRepository, InMemoryObjectStore, RecordingStateRepository,
    RecordingTileQueue,
};

/// Lock a double's mutex, recovering the data if a test thread panicked.
fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
