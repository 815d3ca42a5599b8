//! Subprocess wrapper for the restic backup binary.
//!
//! All operations shell out to `restic` with an environment staged by
//! `glacier-secrets`; child output is relayed into the log in real time.
//! Repository credentials only ever travel through the environment, never
//! the command line.

mod error;
mod process;
mod restic;

pub use error::ResticError;
pub use restic::{KeepPolicy, Restic};
