//! Cron-driven job scheduler for glacier.
//!
//! This crate provides the recurring-run machinery behind the `schedule`
//! command:
//! - Validates cron expressions (five fields, optional seconds, `@` macros)
//! - Fires registered jobs onto a bounded queue, dropping on overflow
//! - Executes jobs one at a time, in arrival order, on a single worker
//! - Supports run limits per job and halt-on-error runs
//! - Distinguishes graceful exhaustion from user interruption

mod error;
mod job;
mod runner;
mod schedule;
mod scheduler;
mod worker;

pub use error::SchedulerError;
pub use job::{Job, JobError};
pub use runner::{CronRunner, InterruptHandle, run_jobs};
pub use schedule::{Schedule, validate_schedule};
pub use worker::JOB_QUEUE_CAPACITY;
