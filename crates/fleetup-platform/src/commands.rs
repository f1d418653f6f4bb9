use std::path::Path;

use log::debug;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {}{stderr_snippet}", exit_label(*code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr_snippet: String,
    },
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |code| format!("code {code}"))
}

/// Run `program` with `args` and return its stdout.
///
/// # Errors
/// Returns an error when the process cannot be spawned or exits non-zero.
pub async fn run_checked(program: &str, args: &[&str]) -> Result<String, CommandError> {
    run_checked_in(None, program, args).await
}

/// Like [`run_checked`], but with the child's working directory set to `dir`.
///
/// # Errors
/// Returns an error when the process cannot be spawned or exits non-zero.
pub async fn run_checked_in(
    dir: Option<&Path>,
    program: &str,
    args: &[&str],
) -> Result<String, CommandError> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    debug!("running {program} {}", args.join(" "));
    let output = command
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CommandError::Failed {
            program: program.to_string(),
            code: output.status.code(),
            stderr_snippet: snippet(stderr.trim(), 200),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let snippet: String = text.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

/// Processor identifier as reported by `uname -m` (`armv6l`, `aarch64`, ...).
///
/// Falls back to the compile-time architecture when `uname` is unavailable.
#[must_use]
pub fn host_architecture() -> String {
    std::process::Command::new("uname")
        .arg("-m")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|arch| !arch.is_empty())
        .unwrap_or_else(|| std::env::consts::ARCH.to_string())
}
