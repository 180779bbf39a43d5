//! Fixed-interval scheduler for background jobs.
//!
//! A [`PeriodicJob`] invokes its job, then sleeps for the interval, until the
//! shutdown token is cancelled. Job failures are logged and never end the
//! loop. When a [`DistributedLock`] is attached, each cycle runs only if the
//! lock is won; losing the race skips the cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::domain::ports::{DistributedLock, GuardedWork, LockId, LockOutcome};

/// Failure reported by a scheduled job body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct JobError {
    message: String,
}

impl JobError {
    /// Build a job failure from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable failure detail.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Zero-argument fallible unit of work driven by a [`PeriodicJob`].
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn run(&self) -> Result<(), JobError>;
}

/// Result of one scheduler cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// The lock was held by another instance.
    Skipped,
    Failed(String),
}

/// A named job invoked on a fixed interval.
pub struct PeriodicJob {
    name: String,
    interval: Duration,
    job: Arc<dyn ScheduledJob>,
    lock: Option<(Arc<dyn DistributedLock>, LockId)>,
}

impl PeriodicJob {
    /// Run `job` every `interval`, without a lock until [`Self::with_lock`].
    pub fn new(name: impl Into<String>, interval: Duration, job: Arc<dyn ScheduledJob>) -> Self {
        Self {
            name: name.into(),
            interval,
            job,
            lock: None,
        }
    }

    /// Gate every cycle behind `lock_id`.
    pub fn with_lock(mut self, lock: Arc<dyn DistributedLock>, lock_id: LockId) -> Self {
        self.lock = Some((lock, lock_id));
        self
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a single cycle, logging its outcome.
    pub async fn run_once(&self) -> CycleOutcome {
        debug!(job = %self.name, "starting job cycle");
        let outcome = match &self.lock {
            None => match self.job.run().await {
                Ok(()) => CycleOutcome::Completed,
                Err(err) => CycleOutcome::Failed(err.to_string()),
            },
            Some((lock, lock_id)) => {
                let job = Arc::clone(&self.job);
                let work: GuardedWork = Box::new(move || async move { job.run().await }.boxed());
                match lock.with_lock(*lock_id, work).await {
                    Ok(LockOutcome::Acquired) => CycleOutcome::Completed,
                    Ok(LockOutcome::NotAcquired) => CycleOutcome::Skipped,
                    Err(err) => CycleOutcome::Failed(err.to_string()),
                }
            }
        };

        match &outcome {
            CycleOutcome::Completed => info!(job = %self.name, "job cycle completed"),
            CycleOutcome::Skipped => {
                info!(job = %self.name, "lock held elsewhere; skipping job cycle");
            }
            CycleOutcome::Failed(message) => {
                error!(job = %self.name, error = %message, "job cycle failed");
            }
        }
        outcome
    }

    /// Invoke the job, then sleep, until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(job = %self.name, interval_secs = self.interval.as_secs(), "job scheduler started");
        while !shutdown.is_cancelled() {
            self.run_once().await;
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(job = %self.name, "job scheduler stopped");
    }

    /// Run the scheduler on its own task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::ports::{DistributedLockError, MockDistributedLock};
    use crate::test_support::InMemoryDistributedLock;

    const INTERVAL: Duration = Duration::from_secs(10);

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        async fn run(&self) -> Result<(), JobError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                Err(JobError::new(format!("run {run} failed")))
            } else {
                Ok(())
            }
        }
    }

    #[fixture]
    fn failing_job() -> Arc<CountingJob> {
        Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
            fail: true,
        })
    }

    #[fixture]
    fn healthy_job() -> Arc<CountingJob> {
        Arc::new(CountingJob::default())
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn keeps_running_after_job_failures(failing_job: Arc<CountingJob>) {
        let shutdown = CancellationToken::new();
        let handle =
            PeriodicJob::new("failing", INTERVAL, failing_job.clone()).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(35)).await;
        shutdown.cancel();
        handle.await.expect("scheduler task");

        assert_eq!(failing_job.runs.load(Ordering::SeqCst), 4);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn stops_promptly_on_cancellation(healthy_job: Arc<CountingJob>) {
        let shutdown = CancellationToken::new();
        let handle = PeriodicJob::new("hourly", Duration::from_secs(3600), healthy_job.clone())
            .spawn(shutdown.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;

        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler stops before the next cycle")
            .expect("scheduler task");
        assert_eq!(healthy_job.runs.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn skips_cycle_when_lock_is_held_elsewhere(healthy_job: Arc<CountingJob>) {
        let mut lock = MockDistributedLock::new();
        lock.expect_with_lock()
            .times(1)
            .returning(|_, _| Ok(LockOutcome::NotAcquired));
        let job = PeriodicJob::new("locked", INTERVAL, healthy_job.clone())
            .with_lock(Arc::new(lock), LockId::new(1));

        assert_eq!(job.run_once().await, CycleOutcome::Skipped);
        assert_eq!(healthy_job.runs.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn runs_job_while_holding_the_lock(healthy_job: Arc<CountingJob>) {
        let lock = Arc::new(InMemoryDistributedLock::default());
        let job = PeriodicJob::new("locked", INTERVAL, healthy_job.clone())
            .with_lock(lock.clone(), LockId::new(2));

        assert_eq!(job.run_once().await, CycleOutcome::Completed);
        assert_eq!(healthy_job.runs.load(Ordering::SeqCst), 1);
        assert!(!lock.is_held(LockId::new(2)));
    }

    #[rstest]
    #[tokio::test]
    async fn lock_store_failures_are_reported_not_raised(healthy_job: Arc<CountingJob>) {
        let mut lock = MockDistributedLock::new();
        lock.expect_with_lock()
            .returning(|_, _| Err(DistributedLockError::store("connection refused")));
        let job = PeriodicJob::new("locked", INTERVAL, healthy_job.clone())
            .with_lock(Arc::new(lock), LockId::new(1));

        let outcome = job.run_once().await;

        assert!(matches!(
            outcome,
            CycleOutcome::Failed(message) if message.contains("connection refused")
        ));
        assert_eq!(healthy_job.runs.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn guarded_job_failures_surface_in_the_outcome(failing_job: Arc<CountingJob>) {
        let job = PeriodicJob::new("locked", INTERVAL, failing_job)
            .with_lock(Arc::new(InMemoryDistributedLock::default()), LockId::new(3));

        assert_eq!(
            job.run_once().await,
            CycleOutcome::Failed("lock-guarded work failed: run 1 failed".to_owned())
        );
    }
}
