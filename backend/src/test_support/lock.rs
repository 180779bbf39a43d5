//! Process-local stand-in for the advisory lock adapter.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::guard;
use crate::domain::ports::{
    DistributedLock, DistributedLockError, GuardedWork, LockId, LockOutcome,
};

/// Non-blocking lock table keyed by [`LockId`].
#[derive(Debug, Default)]
pub struct InMemoryDistributedLock {
    held: Mutex<HashSet<LockId>>,
}

impl InMemoryDistributedLock {
    pub fn is_held(&self, lock_id: LockId) -> bool {
        guard(&self.held).contains(&lock_id)
    }
}

struct Release<'a> {
    held: &'a Mutex<HashSet<LockId>>,
    lock_id: LockId,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        guard(self.held).remove(&self.lock_id);
    }
}

#[async_trait]
impl DistributedLock for InMemoryDistributedLock {
    async fn with_lock(
        &self,
        lock_id: LockId,
        work: GuardedWork,
    ) -> Result<LockOutcome, DistributedLockError> {
        if !guard(&self.held).insert(lock_id) {
            return Ok(LockOutcome::NotAcquired);
        }
        let _release = Release {
            held: &self.held,
            lock_id,
        };
        work().await?;
        Ok(LockOutcome::Acquired)
    }
}
