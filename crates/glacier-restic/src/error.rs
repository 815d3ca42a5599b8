//! Error types for restic invocations.

use std::process::ExitStatus;

use thiserror::Error;

use glacier_secrets::SecretsError;

/// Errors from invoking the restic binary.
#[derive(Debug, Error)]
pub enum ResticError {
    /// The binary could not be started at all.
    #[error("could not invoke '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The subcommand ran and exited unsuccessfully.
    #[error("restic {subcommand} failed ({status})")]
    CommandFailed {
        subcommand: String,
        status: ExitStatus,
    },

    /// The execution environment could not be staged.
    #[error(transparent)]
    Secrets(#[from] SecretsError),

    /// A failure the caller cannot recover from, such as an unreachable or
    /// locked repository.
    #[error("{0}")]
    Fatal(String),

    /// A failed operation against an otherwise healthy repository.
    #[error("{0}")]
    Operation(String),
}

impl ResticError {
    /// Whether this error should terminate the caller rather than be
    /// retried at the next scheduled occasion.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ResticError::Fatal(_))
    }
}
