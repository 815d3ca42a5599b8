//! The restic manager: backup, check, forget, restore, and snapshot
//! operations as subprocess invocations.

use std::path::Path;

use tracing::info;

use crate::ResticError;
use crate::process;

/// Snapshot rotation policy for the forget operation.
///
/// Each field maps to the restic `--keep-*` flag of the same name; unset
/// fields are omitted from the invocation.
#[derive(Debug, Clone, Default)]
pub struct KeepPolicy {
    /// Never delete the n most recent snapshots.
    pub last: Option<u32>,
    /// Keep the last snapshot for each of the last n hours with one.
    pub hourly: Option<u32>,
    /// Keep the last snapshot for each of the last n days with one.
    pub daily: Option<u32>,
    /// Keep the last snapshot for each of the last n weeks with one.
    pub weekly: Option<u32>,
    /// Keep the last snapshot for each of the last n months with one.
    pub monthly: Option<u32>,
    /// Keep the last snapshot for each of the last n years with one.
    pub yearly: Option<u32>,
    /// Keep all snapshots carrying all of these tags.
    pub tags: Vec<String>,
    /// Keep all snapshots within this duration of the latest one.
    pub within: Option<String>,
}

impl KeepPolicy {
    /// Render the policy as restic command-line arguments.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let counts = [
            ("last", self.last),
            ("hourly", self.hourly),
            ("daily", self.daily),
            ("weekly", self.weekly),
            ("monthly", self.monthly),
            ("yearly", self.yearly),
        ];
        for (name, value) in counts {
            if let Some(value) = value {
                args.push(format!("--keep-{name}={value}"));
            }
        }
        for tag in &self.tags {
            args.push(format!("--keep-tag={tag}"));
        }
        if let Some(within) = &self.within {
            args.push(format!("--keep-within={within}"));
        }
        args
    }
}

/// Manages invocations of the external restic binary.
#[derive(Debug, Clone)]
pub struct Restic {
    program: String,
}

impl Default for Restic {
    fn default() -> Self {
        Self::new()
    }
}

impl Restic {
    /// Manager for the `restic` binary on `PATH`.
    pub fn new() -> Self {
        Self::with_program("restic")
    }

    /// Manager for a specific binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Invoke a restic subcommand with a freshly staged environment.
    ///
    /// Secrets are staged on every invocation so rotated credential files
    /// take effect without a restart.
    pub async fn execute(
        &self,
        log_output: bool,
        subcommand: &str,
        args: &[String],
    ) -> Result<(), ResticError> {
        let env = glacier_secrets::stage_env_from_process().await?;
        process::execute(&self.program, subcommand, args, &env, log_output).await
    }

    /// Remove any stale locks from the repository.
    async fn unlock(&self) -> Result<(), ResticError> {
        self.execute(false, "unlock", &[])
            .await
            .map_err(|_| ResticError::Fatal("could not unlock repository".to_string()))
    }

    /// Probe whether the repository can be opened.
    async fn probe(&self) -> Result<(), ResticError> {
        self.execute(false, "snapshots", &[]).await
    }

    /// Back up `path` into the repository, initializing it first when
    /// `init` is set and the repository does not exist yet.
    pub async fn backup(&self, path: &Path, init: bool, host: Option<&str>) -> Result<(), ResticError> {
        info!(path = %path.display(), "starting backup operation");

        if self.probe().await.is_err() {
            if init {
                info!("initializing repository for first use");
                self.execute(true, "init", &[])
                    .await
                    .map_err(|_| ResticError::Fatal("could not init repository".to_string()))?;
            } else {
                return Err(ResticError::Fatal("could not open repository".to_string()));
            }
        }

        self.unlock().await?;

        let mut args = vec![path.display().to_string()];
        if let Some(host) = host {
            args.push(format!("--host={host}"));
        }
        self.execute(true, "backup", &args).await?;

        info!(path = %path.display(), "finished backup operation");
        Ok(())
    }

    /// Test the repository for errors.
    pub async fn check(&self) -> Result<(), ResticError> {
        info!("executing check");

        self.unlock().await?;
        self.execute(true, "check", &[])
            .await
            .map_err(|_| ResticError::Fatal("could not execute check".to_string()))?;

        info!("finished executing check");
        Ok(())
    }

    /// Remove old snapshots according to the rotation policy and prune the
    /// repository.
    pub async fn forget(&self, keep: &KeepPolicy) -> Result<(), ResticError> {
        info!("starting forget operation");

        let mut args = vec!["--prune".to_string()];
        args.extend(keep.to_args());

        self.probe()
            .await
            .map_err(|_| ResticError::Fatal("could not open repository".to_string()))?;
        self.unlock().await?;
        self.execute(true, "forget", &args)
            .await
            .map_err(|_| ResticError::Operation("could not complete forget operation".to_string()))?;

        info!("finished forget operation");
        Ok(())
    }

    /// Restore a snapshot to a local path.
    pub async fn restore(&self, path: &Path, snapshot: &str) -> Result<(), ResticError> {
        info!(snapshot, "starting restore operation");

        self.probe()
            .await
            .map_err(|_| ResticError::Fatal("could not open repository".to_string()))?;
        self.unlock().await?;
        self.execute(
            true,
            "restore",
            &[snapshot.to_string(), format!("--target={}", path.display())],
        )
        .await
        .map_err(|_| ResticError::Fatal(format!("could not restore snapshot '{snapshot}'")))?;

        info!(snapshot, "finished restore operation");
        Ok(())
    }

    /// List all snapshots stored in the repository.
    pub async fn snapshots(&self) -> Result<(), ResticError> {
        info!("listing snapshots");

        self.unlock().await?;
        self.execute(true, "snapshots", &[])
            .await
            .map_err(|_| ResticError::Fatal("could not list snapshots".to_string()))?;

        info!("finished listing snapshots");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_policy_renders_no_args() {
        assert!(KeepPolicy::default().to_args().is_empty());
    }

    #[test]
    fn counts_render_in_stable_order() {
        let policy = KeepPolicy {
            last: Some(5),
            daily: Some(7),
            yearly: Some(1),
            ..Default::default()
        };
        assert_eq!(
            policy.to_args(),
            ["--keep-last=5", "--keep-daily=7", "--keep-yearly=1"]
        );
    }

    #[test]
    fn tags_repeat_and_within_renders_last() {
        let policy = KeepPolicy {
            tags: vec!["prod".to_string(), "db".to_string()],
            within: Some("2y5m7d".to_string()),
            ..Default::default()
        };
        assert_eq!(
            policy.to_args(),
            ["--keep-tag=prod", "--keep-tag=db", "--keep-within=2y5m7d"]
        );
    }
}
