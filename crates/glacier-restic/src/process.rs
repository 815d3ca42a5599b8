//! External command execution with live log relay.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::ResticError;

/// Invoke an external command with exactly the provided environment.
///
/// Child stderr is always relayed into the log at error level as it
/// arrives; stdout is relayed at info level when `log_output` is set and
/// discarded otherwise. Returns once the child has exited and both relays
/// have drained.
pub(crate) async fn execute(
    program: &str,
    subcommand: &str,
    args: &[String],
    env: &HashMap<String, String>,
    log_output: bool,
) -> Result<(), ResticError> {
    let mut cmd = Command::new(program);
    cmd.arg(subcommand)
        .args(args)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(if log_output {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::piped());

    debug!(program, subcommand, "invoking external command");
    let mut child = cmd.spawn().map_err(|source| ResticError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let mut relays = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        relays.push(tokio::spawn(relay_lines(stdout, false)));
    }
    if let Some(stderr) = child.stderr.take() {
        relays.push(tokio::spawn(relay_lines(stderr, true)));
    }

    let status = child.wait().await.map_err(|source| ResticError::Spawn {
        program: program.to_string(),
        source,
    })?;
    for relay in relays {
        let _ = relay.await;
    }

    if !status.success() {
        return Err(ResticError::CommandFailed {
            subcommand: subcommand.to_string(),
            status,
        });
    }
    Ok(())
}

/// Forward each line of child output into the log as it is produced.
async fn relay_lines<R: AsyncRead + Unpin>(reader: R, is_stderr: bool) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.is_empty() {
            continue;
        }
        if is_stderr {
            error!("{line}");
        } else {
            info!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[tokio::test]
    async fn successful_command_returns_ok() {
        let result = execute("/bin/sh", "-c", &["exit 0".to_string()], &no_env(), false).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failing_command_reports_exit_status() {
        let result = execute("/bin/sh", "-c", &["exit 3".to_string()], &no_env(), false).await;
        match result {
            Err(ResticError::CommandFailed { subcommand, status }) => {
                assert_eq!(subcommand, "-c");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_reports_spawn_error() {
        let result = execute(
            "glacier-no-such-binary",
            "snapshots",
            &[],
            &no_env(),
            false,
        )
        .await;
        assert!(matches!(result, Err(ResticError::Spawn { .. })));
    }

    #[tokio::test]
    async fn child_sees_exactly_the_staged_environment() {
        let mut env = no_env();
        env.insert("GLACIER_TEST_MARKER".to_string(), "expected".to_string());

        // succeeds only if the staged variable is visible to the child
        let probe = r#"test "$GLACIER_TEST_MARKER" = expected"#.to_string();
        assert!(execute("/bin/sh", "-c", &[probe], &env, false).await.is_ok());

        // the inherited process environment must not leak through env_clear
        let leak_probe = r#"test -z "$HOME""#.to_string();
        assert!(execute("/bin/sh", "-c", &[leak_probe], &no_env(), false).await.is_ok());
    }

    #[tokio::test]
    async fn logged_output_does_not_affect_status() {
        let script = "echo from-stdout; echo from-stderr >&2".to_string();
        assert!(execute("/bin/sh", "-c", &[script], &no_env(), true).await.is_ok());
    }
}
