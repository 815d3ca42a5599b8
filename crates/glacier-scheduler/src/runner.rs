//! Run controller: wires scheduler, queue, and worker together.

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::SchedulerError;
use crate::job::Job;
use crate::scheduler::CronScheduler;
use crate::worker::{self, JOB_QUEUE_CAPACITY, StopSignal, WorkerOutcome};

/// Cancellation source for a running [`CronRunner`].
///
/// The Ctrl-C listener installed by [`run_jobs`] is one holder; tests (or
/// any embedding caller) can trigger cancellation programmatically through
/// their own clone.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    signals: mpsc::Sender<StopSignal>,
}

impl InterruptHandle {
    /// Request cancellation of the run.
    ///
    /// Observed by the worker on its next poll, after any currently
    /// executing job has run to completion. Repeated triggers are
    /// harmless.
    pub fn interrupt(&self) {
        let _ = self.signals.try_send(StopSignal::Interrupted);
    }
}

/// Coordinates one scheduler run: registers the jobs, starts the timing
/// loop and the worker, and blocks until the worker reports its terminal
/// outcome.
pub struct CronRunner {
    halt_on_error: bool,
    signal_tx: mpsc::Sender<StopSignal>,
    signal_rx: mpsc::Receiver<StopSignal>,
}

impl CronRunner {
    pub fn new(halt_on_error: bool) -> Self {
        // one slot for the scheduler's stop, one for an interrupt
        let (signal_tx, signal_rx) = mpsc::channel(2);
        Self {
            halt_on_error,
            signal_tx,
            signal_rx,
        }
    }

    /// Handle through which this run can be canceled.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            signals: self.signal_tx.clone(),
        }
    }

    /// Schedule the jobs and block until the run reaches a terminal
    /// outcome. A malformed schedule is reported per job and skips only
    /// that job; once every registered job exhausts its run limit the run
    /// ends successfully.
    pub async fn run(self, jobs: Vec<Job>) -> Result<(), SchedulerError> {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut scheduler = CronScheduler::new(job_tx, self.signal_tx.clone());
        for job in jobs {
            let tag = job.tag.clone();
            match scheduler.register(job) {
                Ok(first_run) => {
                    info!(tag = %tag, at = %first_run.to_rfc3339(), "first job run scheduled");
                }
                Err(err) => error!(tag = %tag, error = %err, "could not schedule job"),
            }
        }

        let worker = tokio::spawn(worker::run(job_rx, self.signal_rx, self.halt_on_error));
        let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

        let outcome = worker.await;

        // tear down the timing loop on every exit path; the queue and
        // signal channels close with the runner
        let _ = shutdown_tx.send(true);
        let _ = scheduler_task.await;
        debug!("exiting scheduler run");

        match outcome? {
            WorkerOutcome::Stopped => {
                info!("cron processing stopped");
                Ok(())
            }
            WorkerOutcome::Interrupted => Err(SchedulerError::Interrupted),
            WorkerOutcome::Failed { tag, error } | WorkerOutcome::Fatal { tag, error } => {
                Err(SchedulerError::JobFailed { tag, source: error })
            }
        }
    }
}

/// Schedule one or more jobs and block until the run ends.
///
/// Runs indefinitely unless interrupted (e.g. Ctrl-C) or until every job
/// reaches its run limit. With `halt_on_error` set, the first job failure
/// terminates the run; otherwise failures are logged and processing
/// continues at the next scheduled time.
pub async fn run_jobs(jobs: Vec<Job>, halt_on_error: bool) -> Result<(), SchedulerError> {
    let runner = CronRunner::new(halt_on_error);

    // OS interrupt is just one cancellation source feeding the handle
    let handle = runner.interrupt_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt signal");
            handle.interrupt();
        }
    });

    let result = runner.run(jobs).await;
    ctrl_c.abort();
    result
}
