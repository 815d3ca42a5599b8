//! Cron scheduler: one schedule entry per registered job.
//!
//! The timing loop runs on its own task and never executes job work itself;
//! each fire only attempts a non-blocking enqueue onto the bounded job
//! queue. A full queue drops the fire (the job waits for its next scheduled
//! time) so the timing loop can never be blocked by slow jobs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::SchedulerError;
use crate::job::Job;
use crate::schedule::Schedule;
use crate::worker::StopSignal;

/// Association between a job and its live schedule; owned exclusively by
/// the scheduler and destroyed when the job reaches its run limit.
struct ScheduleEntry {
    job: Job,
    schedule: Schedule,
    next_fire: DateTime<Utc>,
}

pub(crate) struct CronScheduler {
    entries: Vec<ScheduleEntry>,
    queue: mpsc::Sender<Job>,
    signals: mpsc::Sender<StopSignal>,
}

impl CronScheduler {
    pub(crate) fn new(queue: mpsc::Sender<Job>, signals: mpsc::Sender<StopSignal>) -> Self {
        Self {
            entries: Vec::new(),
            queue,
            signals,
        }
    }

    /// Register a job's schedule and return its first fire time.
    ///
    /// Each entry owns an independent copy of the job; a malformed
    /// expression leaves the other registrations untouched.
    pub(crate) fn register(&mut self, job: Job) -> Result<DateTime<Utc>, SchedulerError> {
        info!(tag = %job.tag, spec = %job.spec, "scheduling job");
        let schedule = Schedule::parse(&job.spec)?;
        let next_fire = schedule.next_after(Utc::now()).ok_or_else(|| {
            SchedulerError::InvalidSchedule {
                spec: job.spec.clone(),
                reason: "schedule has no upcoming fire time".to_string(),
            }
        })?;
        self.entries.push(ScheduleEntry {
            job,
            schedule,
            next_fire,
        });
        Ok(next_fire)
    }

    pub(crate) fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Earliest pending fire time across all entries.
    fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|e| e.next_fire).min()
    }

    /// Fire every entry that is due at `now`.
    ///
    /// A fire increments the job's run count; within its limit the job is
    /// enqueued (or dropped when the queue is full), past it the entry is
    /// deregistered.
    fn fire_due(&mut self, now: DateTime<Utc>) {
        let mut index = 0;
        while index < self.entries.len() {
            if self.entries[index].next_fire > now {
                index += 1;
                continue;
            }

            self.entries[index].job.run_count += 1;
            let fired = self.entries[index].job.clone();

            if fired.limit > 0 && fired.run_count() > fired.limit {
                debug!(tag = %fired.tag, limit = fired.limit, "stopped job, limit reached");
                self.entries.remove(index);
                continue;
            }

            match self.queue.try_send(fired) {
                Ok(()) => debug!(tag = %self.entries[index].job.tag, "added new job to queue"),
                Err(TrySendError::Full(job)) => {
                    error!(tag = %job.tag, "dropped job (queue is full)");
                }
                Err(TrySendError::Closed(job)) => {
                    debug!(tag = %job.tag, "job queue closed, deregistering");
                    self.entries.remove(index);
                    continue;
                }
            }

            match self.entries[index].schedule.next_after(now) {
                Some(next) => {
                    self.entries[index].next_fire = next;
                    index += 1;
                }
                None => {
                    debug!(tag = %self.entries[index].job.tag, "schedule exhausted, deregistering");
                    self.entries.remove(index);
                }
            }
        }
    }

    /// Run the timing loop until every entry is gone or shutdown is
    /// requested. Signals the worker to stop once the last entry has been
    /// deregistered.
    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let Some(next) = self.next_fire() else {
                debug!("no schedule entries remain");
                let _ = self.signals.try_send(StopSignal::Stopped);
                return;
            };

            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("scheduler received shutdown");
                        return;
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    self.fire_due(Utc::now());
                }
            }
        }
    }
}
