//! Running the `aws` executable.
//!
//! `CommandRunner` is the seam between the adapter and the operating
//! system; tests substitute a scripted runner.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

/// What a finished CLI invocation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs one CLI invocation to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// `Err` only when the process could not be run at all.
    async fn run(&self, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Spawns the real CLI with `tokio::process`.
///
/// The child is killed if the future is dropped, which is what happens when
/// a call hits its timeout or a read is abandoned on cancel.
pub struct ProcessRunner {
    program: PathBuf,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(&self.program)
            .args(args)
            .env("AWS_PAGER", "")
            .env_remove("AWS_REGION")
            .env_remove("AWS_DEFAULT_REGION")
            .env_remove("AWS_PROFILE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
