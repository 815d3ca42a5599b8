//! The bounded job queue's single consumer.
//!
//! Jobs run strictly one at a time and in arrival order even when several
//! schedules fire together. The worker polls its two channels without
//! blocking, signals before jobs so a termination request is never starved
//! by a backlog, and suspends briefly when both are empty.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, warn};

use crate::job::{Job, JobError};

/// Maximum number of fired jobs awaiting execution; later fires are dropped.
pub const JOB_QUEUE_CAPACITY: usize = 5;

/// How long the worker suspends when no signal and no job is pending.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Reason the worker is asked to stop.
///
/// `Stopped` is issued by the scheduler once every job has exhausted its run
/// limit; `Interrupted` comes from an external cancellation source such as
/// the Ctrl-C listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Stopped,
    Interrupted,
}

/// Terminal outcome of the worker loop, produced exactly once per run.
#[derive(Debug)]
pub(crate) enum WorkerOutcome {
    /// All scheduled work ran out (run limits reached).
    Stopped,
    /// The run was canceled from the outside.
    Interrupted,
    /// A job failed while halt-on-error was in effect.
    Failed { tag: String, error: JobError },
    /// A job failed fatally; the caller should terminate.
    Fatal { tag: String, error: JobError },
}

/// Drain the job queue one job at a time until a stop signal arrives or a
/// halting failure occurs.
pub(crate) async fn run(
    mut jobs: mpsc::Receiver<Job>,
    mut signals: mpsc::Receiver<StopSignal>,
    halt_on_error: bool,
) -> WorkerOutcome {
    loop {
        match signals.try_recv() {
            Ok(StopSignal::Stopped) => {
                warn!("worker processing stopped");
                return WorkerOutcome::Stopped;
            }
            Ok(StopSignal::Interrupted) => {
                warn!("worker processing canceled");
                return WorkerOutcome::Interrupted;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                debug!("signal channel closed");
                return WorkerOutcome::Stopped;
            }
        }

        match jobs.try_recv() {
            Ok(job) => {
                debug!(tag = %job.tag, "worker started processing new job");
                if job.limit > 0 {
                    debug!(tag = %job.tag, run = job.run_count, limit = job.limit, "worker on limited run");
                }
                match job.run().await {
                    Ok(()) => debug!(tag = %job.tag, "worker finished processing"),
                    Err(err) => {
                        error!(tag = %job.tag, error = %err, "could not process job");
                        if err.is_fatal() {
                            return WorkerOutcome::Fatal {
                                tag: job.tag,
                                error: err,
                            };
                        }
                        if halt_on_error {
                            return WorkerOutcome::Failed {
                                tag: job.tag,
                                error: err,
                            };
                        }
                    }
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                // suspend processing to handle any interrupts
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn recording_job(
        tag: &str,
        order: &Arc<Mutex<Vec<String>>>,
        result: Result<(), JobError>,
    ) -> Job {
        let order = Arc::clone(order);
        let tag_owned = tag.to_string();
        Job::new(tag, "* * * * * *", 0, move || {
            let order = Arc::clone(&order);
            let tag = tag_owned.clone();
            let result = result.clone();
            async move {
                order.lock().unwrap().push(tag);
                result
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn executes_jobs_in_fifo_order() {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::channel(2);
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            job_tx.send(recording_job(tag, &order, Ok(()))).await.unwrap();
        }

        // the last job requests a graceful stop once it has run
        let stop_tx = signal_tx.clone();
        job_tx
            .send(Job::new("stopper", "* * * * * *", 0, move || {
                let stop_tx = stop_tx.clone();
                async move {
                    stop_tx.try_send(StopSignal::Stopped).ok();
                    Ok(())
                }
            }))
            .await
            .unwrap();

        let outcome = run(job_rx, signal_rx, true).await;

        assert!(matches!(outcome, WorkerOutcome::Stopped));
        assert_eq!(*order.lock().unwrap(), ["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn halting_failure_skips_remaining_jobs() {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let (_signal_tx, signal_rx) = mpsc::channel(2);
        let order = Arc::new(Mutex::new(Vec::new()));

        job_tx
            .send(recording_job("broken", &order, Err(JobError::new("boom"))))
            .await
            .unwrap();
        job_tx
            .send(recording_job("never-runs", &order, Ok(())))
            .await
            .unwrap();

        let outcome = run(job_rx, signal_rx, true).await;

        match outcome {
            WorkerOutcome::Failed { tag, error } => {
                assert_eq!(tag, "broken");
                assert!(!error.is_fatal());
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(*order.lock().unwrap(), ["broken"]);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_run_continues_past_failures() {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::channel(2);
        let order = Arc::new(Mutex::new(Vec::new()));

        job_tx
            .send(recording_job("broken", &order, Err(JobError::new("boom"))))
            .await
            .unwrap();
        let stop_tx = signal_tx.clone();
        job_tx
            .send(Job::new("after", "* * * * * *", 0, move || {
                let stop_tx = stop_tx.clone();
                async move {
                    stop_tx.try_send(StopSignal::Stopped).ok();
                    Ok(())
                }
            }))
            .await
            .unwrap();

        let outcome = run(job_rx, signal_rx, false).await;

        assert!(matches!(outcome, WorkerOutcome::Stopped));
        assert_eq!(*order.lock().unwrap(), ["broken"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_halts_even_when_sustained() {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let (_signal_tx, signal_rx) = mpsc::channel(2);
        let order = Arc::new(Mutex::new(Vec::new()));

        job_tx
            .send(recording_job("doomed", &order, Err(JobError::fatal("gone"))))
            .await
            .unwrap();

        let outcome = run(job_rx, signal_rx, false).await;

        match outcome {
            WorkerOutcome::Fatal { tag, error } => {
                assert_eq!(tag, "doomed");
                assert!(error.is_fatal());
            }
            other => panic!("expected Fatal, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pending_signal_wins_over_queued_jobs() {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::channel(2);
        let executed = Arc::new(AtomicUsize::new(0));

        let count = Arc::clone(&executed);
        job_tx
            .send(Job::new("queued", "* * * * * *", 0, move || {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .await
            .unwrap();
        signal_tx.send(StopSignal::Interrupted).await.unwrap();

        let outcome = run(job_rx, signal_rx, true).await;

        assert!(matches!(outcome, WorkerOutcome::Interrupted));
        assert_eq!(executed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_observes_late_interrupt() {
        let (_job_tx, job_rx) = mpsc::channel::<Job>(JOB_QUEUE_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::channel(2);

        let handle = tokio::spawn(run(job_rx, signal_rx, true));

        // let the worker go through a few idle poll cycles first
        tokio::time::sleep(Duration::from_secs(3)).await;
        signal_tx.send(StopSignal::Interrupted).await.unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, WorkerOutcome::Interrupted));
    }
}
