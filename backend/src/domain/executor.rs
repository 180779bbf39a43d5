//! Bounded-concurrency fan-out over independent fallible tasks.
//!
//! Every task is spawned onto the runtime immediately and then waits for a
//! semaphore permit, so at most `limit` task bodies run at once. Permits are
//! RAII guards and are returned whether the body succeeds, fails, or panics.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Failure of the executor machinery rather than of a task body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskJoinError {
    /// The task panicked or was aborted before producing a result.
    #[error("task did not complete: {message}")]
    Join { message: String },
    /// The permit semaphore was closed while the task waited.
    #[error("concurrency limiter closed before the task could start")]
    Closed,
}

/// Every failure observed by a collect-all run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskErrors<E> {
    errors: Vec<E>,
}

impl<E> TaskErrors<E> {
    /// Number of failed tasks.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether no task failed.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate failures in completion order.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.errors.iter()
    }

    /// Unwrap the failures.
    pub fn into_inner(self) -> Vec<E> {
        self.errors
    }
}

impl<E: fmt::Display> fmt::Display for TaskErrors<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) failed", self.errors.len())?;
        for (index, error) in self.errors.iter().enumerate() {
            let separator = if index == 0 { ": " } else { "; " };
            write!(f, "{separator}{error}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for TaskErrors<E> {}

/// Runs batches of tasks with at most `limit` in flight.
///
/// # Examples
///
/// ```
/// use heatmap::domain::{BoundedExecutor, TaskJoinError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let executor = BoundedExecutor::new(2);
/// let tasks = (0..4).map(|_| async { Ok::<(), TaskJoinError>(()) });
/// assert!(executor.run_collect_all(tasks).await.is_ok());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl BoundedExecutor {
    /// Create an executor; a `limit` of zero is raised to one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Maximum tasks in flight.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every task and return the first error observed.
    ///
    /// Returning early does not cancel the remaining tasks; they keep running
    /// detached and their results are dropped.
    pub async fn run_fail_fast<I, F, E>(&self, tasks: I) -> Result<(), E>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: From<TaskJoinError> + Send + 'static,
    {
        let mut pending = self.spawn_all(tasks);
        while let Some(joined) = pending.next().await {
            flatten(joined)?;
        }
        Ok(())
    }

    /// Run every task to completion and aggregate all failures.
    pub async fn run_collect_all<I, F, E>(&self, tasks: I) -> Result<(), TaskErrors<E>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: From<TaskJoinError> + Send + 'static,
    {
        let mut pending = self.spawn_all(tasks);
        let mut errors = Vec::new();
        while let Some(joined) = pending.next().await {
            if let Err(err) = flatten(joined) {
                errors.push(err);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TaskErrors { errors })
        }
    }

    fn spawn_all<I, F, E>(&self, tasks: I) -> FuturesUnordered<JoinHandle<Result<(), E>>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: From<TaskJoinError> + Send + 'static,
    {
        tasks
            .into_iter()
            .map(|task| {
                let permits = Arc::clone(&self.permits);
                tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| E::from(TaskJoinError::Closed))?;
                    task.await
                })
            })
            .collect()
    }
}

fn flatten<E>(joined: Result<Result<(), E>, tokio::task::JoinError>) -> Result<(), E>
where
    E: From<TaskJoinError>,
{
    joined.map_err(|err| {
        E::from(TaskJoinError::Join {
            message: err.to_string(),
        })
    })?
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    enum ProbeError {
        #[error("task {0} failed")]
        Failed(usize),
        #[error(transparent)]
        Join(#[from] TaskJoinError),
    }

    #[derive(Default)]
    struct Concurrency {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl Concurrency {
        async fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn tracked_tasks(
        count: usize,
        failing: &'static [usize],
        gauge: Arc<Concurrency>,
    ) -> Vec<impl Future<Output = Result<(), ProbeError>> + Send + 'static> {
        (0..count)
            .map(|index| {
                let gauge = Arc::clone(&gauge);
                async move {
                    gauge.enter().await;
                    if failing.contains(&index) {
                        Err(ProbeError::Failed(index))
                    } else {
                        Ok(())
                    }
                }
            })
            .collect()
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(8, 8)]
    fn zero_limit_is_raised_to_one(#[case] requested: usize, #[case] effective: usize) {
        assert_eq!(BoundedExecutor::new(requested).limit(), effective);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(16)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_the_concurrency_limit(#[case] limit: usize) {
        let gauge = Arc::new(Concurrency::default());
        let executor = BoundedExecutor::new(limit);

        executor
            .run_collect_all(tracked_tasks(24, &[], Arc::clone(&gauge)))
            .await
            .expect("all tasks succeed");

        assert!(gauge.max_active.load(Ordering::SeqCst) <= limit);
        assert_eq!(gauge.active.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    #[case(32)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fail_fast_returns_the_failing_task_error(#[case] limit: usize) {
        let gauge = Arc::new(Concurrency::default());
        let executor = BoundedExecutor::new(limit);

        let result = executor
            .run_fail_fast(tracked_tasks(10, &[6], gauge))
            .await;

        assert_eq!(result, Err(ProbeError::Failed(6)));
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn collect_all_reports_every_failure() {
        let gauge = Arc::new(Concurrency::default());
        let executor = BoundedExecutor::new(3);

        let errors = executor
            .run_collect_all(tracked_tasks(12, &[0, 5, 11], gauge))
            .await
            .expect_err("three tasks fail");

        assert_eq!(errors.len(), 3);
        let mut failed: Vec<_> = errors
            .iter()
            .map(|err| match err {
                ProbeError::Failed(index) => *index,
                ProbeError::Join(other) => panic!("unexpected join failure: {other}"),
            })
            .collect();
        failed.sort_unstable();
        assert_eq!(failed, vec![0, 5, 11]);
        assert!(errors.to_string().starts_with("3 task(s) failed: "));
    }

    #[rstest]
    #[tokio::test]
    async fn empty_batches_succeed_immediately() {
        let executor = BoundedExecutor::new(2);
        let none: Vec<std::future::Ready<Result<(), ProbeError>>> = Vec::new();

        assert!(executor.run_fail_fast(none.clone()).await.is_ok());
        assert!(executor.run_collect_all(none).await.is_ok());
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_tasks_surface_as_join_errors_and_release_permits() {
        let executor = BoundedExecutor::new(1);
        let completed = Arc::new(AtomicUsize::new(0));
        let tasks = (0..3).map(|index| {
            let completed = Arc::clone(&completed);
            async move {
                assert_ne!(index, 0, "first task panics");
                completed.fetch_add(1, Ordering::SeqCst);
                Ok::<(), ProbeError>(())
            }
        });

        let errors = executor
            .run_collect_all(tasks)
            .await
            .expect_err("one task panics");

        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors.iter().next(),
            Some(ProbeError::Join(TaskJoinError::Join { .. }))
        ));
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }
}
