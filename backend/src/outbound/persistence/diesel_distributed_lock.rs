//! PostgreSQL advisory-lock adapter for the `DistributedLock` port.
//!
//! The lock is a transaction-scoped advisory lock taken with
//! `pg_try_advisory_xact_lock`. Guarded work runs inside the same
//! transaction, so the lock is released on commit or rollback and a crashed
//! holder frees it as soon as its connection drops.

use async_trait::async_trait;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Bool};
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use tracing::debug;

use crate::domain::ports::{
    DistributedLock, DistributedLockError, GuardedWork, LockId, LockOutcome,
};
use crate::domain::JobError;

use super::diesel_helpers::{map_diesel_error_message, map_pool_error_message};
use super::pool::DbPool;

const TRY_LOCK_SQL: &str = "SELECT pg_try_advisory_xact_lock($1) AS acquired";

#[derive(diesel::QueryableByName)]
struct TryLockRow {
    #[diesel(sql_type = Bool)]
    acquired: bool,
}

/// Failure inside the lock transaction.
enum LockScopeError {
    Store(diesel::result::Error),
    Work(JobError),
}

impl From<diesel::result::Error> for LockScopeError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Store(error)
    }
}

/// Diesel-backed implementation of the distributed lock port.
#[derive(Clone)]
pub struct DieselDistributedLock {
    pool: DbPool,
}

impl DieselDistributedLock {
    /// Create a new lock adapter with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DistributedLock for DieselDistributedLock {
    async fn with_lock(
        &self,
        lock_id: LockId,
        work: GuardedWork,
    ) -> Result<LockOutcome, DistributedLockError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| DistributedLockError::store(map_pool_error_message(err)))?;

        let outcome = conn
            .transaction::<LockOutcome, LockScopeError, _>(|conn| {
                async move {
                    let row: TryLockRow = sql_query(TRY_LOCK_SQL)
                        .bind::<BigInt, _>(lock_id.get())
                        .get_result(conn)
                        .await?;
                    if !row.acquired {
                        debug!(%lock_id, "advisory lock held elsewhere");
                        return Ok(LockOutcome::NotAcquired);
                    }
                    work().await.map_err(LockScopeError::Work)?;
                    Ok(LockOutcome::Acquired)
                }
                .scope_boxed()
            })
            .await;

        outcome.map_err(|err| match err {
            LockScopeError::Store(error) => DistributedLockError::store(
                map_diesel_error_message(error, "advisory lock transaction"),
            ),
            LockScopeError::Work(error) => DistributedLockError::from(error),
        })
    }
}
