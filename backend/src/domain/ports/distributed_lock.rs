//! Driven port for cross-instance mutual exclusion of periodic jobs.
//!
//! Acquisition never waits: a lock held elsewhere is reported as
//! [`LockOutcome::NotAcquired`] and the guarded work is not invoked. The lock
//! lives exactly as long as the adapter's transactional scope, so there is no
//! unlock call.

use std::fmt;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use super::define_port_error;
use crate::domain::periodic_job::JobError;

/// Numeric lock scope shared by every process pointed at the same store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockId(i64);

impl LockId {
    /// Wrap a raw advisory lock key.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// The raw key.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the lock was won for this attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock was held and the guarded work completed successfully.
    Acquired,
    /// Another holder owns the lock; the guarded work did not run.
    NotAcquired,
}

/// Deferred work executed while the lock is held.
pub type GuardedWork = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), JobError>> + Send>;

define_port_error! {
    /// Errors raised while running lock-guarded work.
    pub enum DistributedLockError {
        /// The lock could not be attempted or its scope could not complete.
        Store { message: String } =>
            "distributed lock store failed: {message}",
        /// The lock was held but the guarded work failed.
        Work { message: String } =>
            "lock-guarded work failed: {message}",
    }
}

impl DistributedLockError {
    /// Whether the lock was held when the error occurred.
    pub fn lock_was_held(&self) -> bool {
        matches!(self, Self::Work { .. })
    }
}

impl From<JobError> for DistributedLockError {
    fn from(err: JobError) -> Self {
        Self::work(err.message())
    }
}

/// Port for running work under a store-backed mutual-exclusion token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take `lock_id` without waiting and run `work` while holding it.
    async fn with_lock(
        &self,
        lock_id: LockId,
        work: GuardedWork,
    ) -> Result<LockOutcome, DistributedLockError>;
}
