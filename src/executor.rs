//! Parallel task execution
//!
//! Runs a batch of independent jobs on a bounded rayon pool. A job that fails
//! or panics is recorded in the [`BatchReport`] and never cancels its
//! siblings; nothing is reported until the whole batch has finished.

use crate::error::EtlError;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon::ThreadPoolBuilder;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

type Job<'a, T> = Box<dyn FnOnce() -> Result<T, EtlError> + Send + 'a>;

/// One unit of work with a label used in reports
pub struct Task<'a, T> {
    pub label: String,
    job: Job<'a, T>,
}

impl<'a, T> Task<'a, T> {
    pub fn new<F>(label: impl Into<String>, job: F) -> Self
    where
        F: FnOnce() -> Result<T, EtlError> + Send + 'a,
    {
        Self {
            label: label.into(),
            job: Box::new(job),
        }
    }
}

/// Completion count for a running batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total as f64) * 100.0
    }
}

/// Receives progress updates as tasks finish, from worker threads
pub trait ProgressObserver: Sync {
    fn on_progress(&self, progress: BatchProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(BatchProgress) + Sync,
{
    fn on_progress(&self, progress: BatchProgress) {
        self(progress)
    }
}

/// Logs every completed task at debug level and each 10% step at info level
pub struct LogProgress {
    pub stage: &'static str,
}

impl ProgressObserver for LogProgress {
    fn on_progress(&self, progress: BatchProgress) {
        debug!(stage = self.stage, completed = progress.completed, total = progress.total, "task finished");

        let decile = |n: usize| n * 10 / progress.total.max(1);
        if decile(progress.completed) != decile(progress.completed.saturating_sub(1)) {
            info!(
                stage = self.stage,
                "[{}/{}] {:.0}%",
                progress.completed,
                progress.total,
                progress.percent()
            );
        }
    }
}

/// Outcome of one task
#[derive(Debug)]
pub struct TaskResult<T> {
    pub label: String,
    pub outcome: Result<T, EtlError>,
}

/// Outcomes of a whole batch, in submission order
#[derive(Debug)]
pub struct BatchReport<T> {
    pub results: Vec<TaskResult<T>>,
}

impl<T> BatchReport<T> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &T)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|v| (r.label.as_str(), v)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &EtlError)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.label.as_str(), e)))
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

/// Executes batches of independent tasks
#[derive(Debug, Clone, Default)]
pub struct ParallelExecutor {
    max_threads: Option<usize>,
}

impl ParallelExecutor {
    /// Pool size defaults to the available parallelism
    pub fn new(max_threads: Option<usize>) -> Self {
        Self { max_threads }
    }

    /// Run every task and block until all have finished
    pub fn run<'a, T: Send>(
        &self,
        tasks: Vec<Task<'a, T>>,
        observer: &dyn ProgressObserver,
    ) -> BatchReport<T> {
        let total = tasks.len();
        if total == 0 {
            return BatchReport {
                results: Vec::new(),
            };
        }

        let completed = AtomicUsize::new(0);
        let execute = |task: Task<'a, T>| -> TaskResult<T> {
            let Task { label, job } = task;
            let outcome = match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(result) => result,
                Err(panic_info) => Err(EtlError::TaskPanicked(panic_message(panic_info.as_ref()))),
            };

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            observer.on_progress(BatchProgress {
                completed: done,
                total,
            });

            TaskResult { label, outcome }
        };

        let threads = self
            .max_threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
            .clamp(1, total);

        // Sequential fallback if the pool cannot be built
        let results = match ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| tasks.into_par_iter().map(execute).collect()),
            Err(_) => tasks.into_iter().map(execute).collect(),
        };

        BatchReport { results }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
