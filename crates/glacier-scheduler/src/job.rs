//! Job types.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

/// Boxed future returned by a job action.
pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>;

/// Type alias for the zero-argument callback a job runs on each fire.
pub type JobAction = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Failure of a single job run.
///
/// The caller classifies fatality when constructing the job; the worker only
/// inspects the flag. A fatal failure ends the run regardless of the
/// halt-on-error policy.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct JobError {
    message: String,
    fatal: bool,
}

impl JobError {
    /// Create a non-fatal job error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    /// Create a fatal job error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A single schedulable job: a tag, a cron expression, an optional run
/// limit, and the action to run on each fire.
///
/// The tag and expression are immutable for the lifetime of a run; only
/// `run_count` mutates, and only inside the scheduler's fire path. Cloning
/// a job is cheap (the action is reference-counted) and every clone handed
/// to the queue carries the run count it was fired with.
#[derive(Clone)]
pub struct Job {
    /// Name used in logs and result attribution, unique per logical job.
    pub tag: String,
    /// Cron expression, validated at registration.
    pub spec: String,
    /// Maximum number of runs; 0 means unlimited.
    pub limit: u32,
    /// Number of times the scheduler has fired this job.
    pub(crate) run_count: u32,
    action: JobAction,
}

impl Job {
    /// Create a job from an async callback.
    pub fn new<F, Fut>(tag: impl Into<String>, spec: impl Into<String>, limit: u32, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        Self {
            tag: tag.into(),
            spec: spec.into(),
            limit,
            run_count: 0,
            action: Arc::new(move || -> JobFuture { Box::pin(action()) }),
        }
    }

    /// Run the job's action to completion.
    pub(crate) async fn run(&self) -> Result<(), JobError> {
        (self.action)().await
    }

    /// How many times this job has fired.
    pub fn run_count(&self) -> u32 {
        self.run_count
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("tag", &self.tag)
            .field("spec", &self.spec)
            .field("limit", &self.limit)
            .field("run_count", &self.run_count)
            .finish_non_exhaustive()
    }
}
