//! Error types for the scheduler.

use thiserror::Error;

use crate::job::JobError;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A schedule expression could not be parsed.
    #[error("invalid schedule '{spec}': {reason}")]
    InvalidSchedule { spec: String, reason: String },

    /// The run was canceled from the outside (e.g. Ctrl-C).
    #[error("cron processing interrupted")]
    Interrupted,

    /// A job failed while halting on errors was in effect, or failed fatally.
    #[error("error processing cron job '{tag}'")]
    JobFailed {
        tag: String,
        #[source]
        source: JobError,
    },

    /// The worker task ended without producing an outcome.
    #[error("worker terminated unexpectedly")]
    WorkerTerminated(#[from] tokio::task::JoinError),
}

impl SchedulerError {
    /// Whether this error should terminate the caller rather than the run.
    ///
    /// Interruption and ordinary job failures are recoverable from the
    /// caller's point of view; a job that classified its own failure as
    /// fatal is not.
    pub fn is_fatal(&self) -> bool {
        match self {
            SchedulerError::JobFailed { source, .. } => source.is_fatal(),
            SchedulerError::WorkerTerminated(_) => true,
            _ => false,
        }
    }
}
