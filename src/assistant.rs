//! External AI assistant invocation.
//!
//! Built-in commands, steps and agents all end up handing a prompt to the
//! configured assistant executable. The prompt is passed as a single argv
//! element; no shell is involved.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{JdcError, Result};

const SKIP_PERMISSIONS_FLAG: &str = "--dangerously-skip-permissions";

/// Runs the assistant executable with a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantInvoker {
    command: String,
    skip_permissions: bool,
    working_dir: PathBuf,
}

impl AssistantInvoker {
    pub fn new(command: &str, skip_permissions: bool, working_dir: PathBuf) -> Self {
        Self {
            command: command.to_string(),
            skip_permissions,
            working_dir,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.assistant.command,
            config.assistant.skip_permissions,
            config.project_root.clone(),
        )
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Arguments passed after the executable name.
    pub fn args(&self, prompt: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(2);
        if self.skip_permissions {
            args.push(SKIP_PERMISSIONS_FLAG.to_string());
        }
        args.push(prompt.to_string());
        args
    }

    fn build(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.args(prompt));
        if self.working_dir.is_dir() {
            cmd.current_dir(&self.working_dir);
        }
        cmd
    }

    /// Run interactively, inheriting the terminal.
    pub async fn run(&self, prompt: &str) -> Result<()> {
        info!(command = %self.command, prompt_len = prompt.len(), "Invoking assistant");

        let status = self
            .build(prompt)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !status.success() {
            return Err(JdcError::execution(format!(
                "{} exited with code {}",
                self.command,
                status.code().unwrap_or(-1)
            )));
        }
        Ok(())
    }

    /// Run non-interactively and return trimmed stdout.
    pub async fn run_captured(&self, prompt: &str) -> Result<String> {
        debug!(command = %self.command, prompt_len = prompt.len(), "Invoking assistant (captured)");

        let output = self
            .build(prompt)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JdcError::execution(format!(
                "{} exited with code {}: {}",
                self.command,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn spawn_error(&self, e: std::io::Error) -> JdcError {
        JdcError::execution(format!("failed to start '{}': {}", self.command, e))
    }
}
