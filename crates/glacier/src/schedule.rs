//! The `schedule` subcommand: recurring backup (and forget) jobs.

use std::path::PathBuf;

use tracing::info;

use glacier_restic::{KeepPolicy, Restic, ResticError};
use glacier_scheduler::{Job, JobError, SchedulerError, run_jobs, validate_schedule};

/// Set up the cron jobs and block until the run ends.
///
/// Builds a `backup` job for the given expression and, when a forget
/// expression is present, a `forget` job applying the keep policy. Runs
/// until interrupted; with `sustained` unset, the first job failure ends
/// the run.
pub async fn run(
    backup_cron: String,
    forget_cron: Option<String>,
    path: PathBuf,
    init: bool,
    host: Option<String>,
    sustained: bool,
    keep: KeepPolicy,
) -> Result<(), SchedulerError> {
    info!("executing schedule command");

    // reject malformed expressions before any job is registered
    validate_schedule(&backup_cron)?;
    if let Some(expr) = &forget_cron {
        validate_schedule(expr)?;
    }

    let restic = Restic::new();
    let mut jobs = Vec::new();

    let backup_restic = restic.clone();
    jobs.push(Job::new("backup", &backup_cron, 0, move || {
        let restic = backup_restic.clone();
        let path = path.clone();
        let host = host.clone();
        async move {
            restic
                .backup(&path, init, host.as_deref())
                .await
                .map_err(job_error)
        }
    }));

    if let Some(expr) = &forget_cron {
        let forget_restic = restic.clone();
        jobs.push(Job::new("forget", expr, 0, move || {
            let restic = forget_restic.clone();
            let keep = keep.clone();
            async move { restic.forget(&keep).await.map_err(job_error) }
        }));
    }

    run_jobs(jobs, !sustained).await
}

/// Carry a restic failure into the scheduler, preserving its fatality.
fn job_error(err: ResticError) -> JobError {
    if err.is_fatal() {
        JobError::fatal(err.to_string())
    } else {
        JobError::new(err.to_string())
    }
}
