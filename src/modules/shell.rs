//! Data-driven shell module.
//!
//! An entry bundle of the form
//!
//! ```json
//! { "shell": { "command": "mvn -q test -Dtest={{args}}", "timeout_secs": 600 } }
//! ```
//!
//! turns a command template into an invocable plugin of any kind. The
//! template may reference:
//!
//! - `{{args}}`: command arguments, each single-quoted
//! - `{{task}}`: the agent task (or the joined arguments), single-quoted
//! - `{{context}}`: the payload as single-quoted JSON
//!
//! Templates containing shell chaining operators are rejected at load time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::{Lazy, OnceCell};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::{JdcError, Result};
use crate::plugins::{
    BehaviorHandle, Executable, Initializable, ModuleContext, Payload, PluginOutput,
};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

static PLACEHOLDER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\{\{\s*([a-z]+)\s*\}\}").ok());

/// Inline shell module definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellSpec {
    /// Command template run with `sh -c`.
    pub command: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Working directory; relative paths resolve against the project root.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ShellSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// Check a command template for dangerous shell operators.
fn validate_command_safety(command: &str, plugin_name: &str) -> Result<()> {
    let dangerous_patterns: &[(&str, &str)] = &[
        ("&&", "command chaining (&&)"),
        ("||", "conditional chaining (||)"),
        (";", "command separator (;)"),
        ("`", "backtick execution"),
        ("|", "pipe operator (|)"),
    ];

    for (pattern, description) in dangerous_patterns {
        if command.contains(pattern) {
            return Err(JdcError::ModuleLoad {
                plugin: plugin_name.to_string(),
                message: format!("shell command contains dangerous pattern: {}", description),
            });
        }
    }
    Ok(())
}

/// Single-quote a string for `sh`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

pub struct ShellModule {
    plugin: String,
    spec: ShellSpec,
    plugin_dir: PathBuf,
    project_root: OnceCell<PathBuf>,
}

impl ShellModule {
    /// Validate `spec` and wrap it in a behavior handle.
    pub fn handle(spec: ShellSpec, ctx: &ModuleContext) -> Result<BehaviorHandle> {
        if spec.command.trim().is_empty() {
            return Err(JdcError::ModuleLoad {
                plugin: ctx.manifest.name.clone(),
                message: "shell command is empty".to_string(),
            });
        }
        validate_command_safety(&spec.command, &ctx.manifest.name)?;

        let module = Arc::new(Self {
            plugin: ctx.manifest.name.clone(),
            spec,
            plugin_dir: ctx.plugin_dir.clone(),
            project_root: OnceCell::new(),
        });
        Ok(BehaviorHandle::new()
            .with_init(module.clone())
            .with_execute(module))
    }

    fn working_dir(&self) -> PathBuf {
        let base = self
            .project_root
            .get()
            .cloned()
            .unwrap_or_else(|| self.plugin_dir.clone());
        match &self.spec.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base.join(dir),
            None => base,
        }
    }

    /// Substitute placeholders from the payload. Unknown placeholders are kept.
    pub fn render(&self, payload: &Payload) -> String {
        let Some(re) = PLACEHOLDER.as_ref() else {
            return self.spec.command.clone();
        };

        re.replace_all(&self.spec.command, |caps: &Captures| match &caps[1] {
            "args" => quoted_args(payload),
            "task" => shell_quote(&task_text(payload)),
            "context" => shell_quote(&payload.to_value().to_string()),
            _ => caps[0].to_string(),
        })
        .into_owned()
    }
}

fn quoted_args(payload: &Payload) -> String {
    let args: Vec<String> = match payload {
        Payload::Args(args) => args.clone(),
        Payload::Task(task) => vec![task.clone()],
        Payload::Context(ctx) => ctx
            .get("args")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
    };
    args.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn task_text(payload: &Payload) -> String {
    match payload {
        Payload::Task(task) => task.clone(),
        Payload::Args(args) => args.join(" "),
        Payload::Context(_) => String::new(),
    }
}

impl Initializable for ShellModule {
    fn init(&self, config: &Config) -> Result<()> {
        let _ = self.project_root.set(config.project_root.clone());
        Ok(())
    }
}

#[async_trait]
impl Executable for ShellModule {
    async fn execute(&self, payload: &Payload) -> Result<PluginOutput> {
        let script = self.render(payload);
        let dir = self.working_dir();
        debug!(plugin = %self.plugin, command = %script, dir = %dir.display(), "Running shell module");

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&script)
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if dir.is_dir() {
            command.current_dir(&dir);
        }

        let timeout = self.spec.timeout();
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| {
                JdcError::execution(format!(
                    "'{}' timed out after {}s",
                    self.plugin,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| JdcError::execution(format!("failed to run shell command: {}", e)))?;

        let exit_code = output.status.code().unwrap_or(-1);
        Ok(PluginOutput {
            success: output.status.success(),
            fields: Default::default(),
        }
        .with("message", String::from_utf8_lossy(&output.stdout).trim_end())
        .with("stderr", String::from_utf8_lossy(&output.stderr).trim_end())
        .with("exit_code", exit_code))
    }
}
