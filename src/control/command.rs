//! External command execution.

use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {cmd}: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{cmd} {args} failed ({status}): {stderr}")]
    Failed {
        cmd: String,
        args: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run `cmd` with `args`, feeding `input` on stdin. Returns trimmed stdout.
///
/// Non-zero exit is logged with full stderr and returned as `Failed`.
pub async fn run(cmd: &str, args: &[&str], input: Option<&[u8]>) -> Result<String, CommandError> {
    tracing::trace!(cmd, args = ?args, "Running command");

    let mut child = Command::new(cmd)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CommandError::Spawn {
            cmd: cmd.to_string(),
            source,
        })?;

    if let Some(input) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
            // closing stdin lets the child see EOF
            drop(stdin);
        }
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let err = CommandError::Failed {
            cmd: cmd.to_string(),
            args: args.join(" "),
            status: output.status.to_string(),
            stderr,
        };
        tracing::error!(error = %err, "Command failed");
        return Err(err);
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a line through `bash -c`, for commands that need process substitution.
pub async fn run_shell(script: &str) -> Result<String, CommandError> {
    run("bash", &["-c", script], None).await
}
