//! Configuration for JDC
//!
//! The process-wide configuration is read from `~/.jdc/config.json` (or an
//! explicit path), with environment overrides applied on top. The same
//! `Config` value is forwarded verbatim to every plugin's `init`.
//!
//! # Example config.json
//!
//! ```json
//! {
//!   "project_root": "/work/shop-service",
//!   "plugins_dir": ".claude/cli/plugins",
//!   "assistant": { "command": "claude", "skip_permissions": true },
//!   "monitor": { "enabled": true, "thresholds_ms": { "command": 30000 } }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{JdcError, Result};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project the assistant operates on. Relative directories below resolve against it.
    pub project_root: PathBuf,
    /// Directory holding the built-in command prompt files.
    pub commands_dir: PathBuf,
    /// Directory holding the built-in agent definitions.
    pub agents_dir: PathBuf,
    /// Directory scanned for plugin subdirectories.
    pub plugins_dir: PathBuf,
    /// External assistant invocation.
    pub assistant: AssistantConfig,
    /// Performance monitoring.
    pub monitor: MonitorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            commands_dir: PathBuf::from(".claude/commands"),
            agents_dir: PathBuf::from(".claude/agents"),
            plugins_dir: PathBuf::from(".claude/cli/plugins"),
            assistant: AssistantConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// How the external AI assistant is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Executable name or path.
    pub command: String,
    /// Pass `--dangerously-skip-permissions` to the assistant.
    pub skip_permissions: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            skip_permissions: true,
        }
    }
}

/// Performance monitor settings.
///
/// # Defaults
///
/// - `enabled`: `true`
/// - `log_dir`: `.performance` under the project root
/// - thresholds: command 30s, step 60s, agent 120s, plugin 10s, hook 1s
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub log_dir: Option<PathBuf>,
    pub thresholds_ms: ThresholdsConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
            thresholds_ms: ThresholdsConfig::default(),
        }
    }
}

/// Per-category duration thresholds in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub command: u64,
    pub step: u64,
    pub agent: u64,
    pub plugin: u64,
    pub hook: u64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            command: 30_000,
            step: 60_000,
            agent: 120_000,
            plugin: 10_000,
            hook: 1_000,
        }
    }
}

impl Config {
    /// Directory for user-level JDC state (`~/.jdc`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".jdc")
    }

    /// Default config file location.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Load from `path` (defaults if the file is absent), then apply
    /// environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                JdcError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                JdcError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `JDC_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("JDC_PROJECT_ROOT") {
            self.project_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("JDC_PLUGINS_DIR") {
            self.plugins_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("JDC_COMMANDS_DIR") {
            self.commands_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("JDC_AGENTS_DIR") {
            self.agents_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("JDC_ASSISTANT_CMD") {
            self.assistant.command = val;
        }
        if let Ok(val) = std::env::var("JDC_SKIP_PERMISSIONS") {
            self.assistant.skip_permissions = parse_bool(&val);
        }
        if let Ok(val) = std::env::var("JDC_MONITOR_ENABLED") {
            self.monitor.enabled = parse_bool(&val);
        }
    }

    /// Resolve a configured path against `project_root`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn plugins_path(&self) -> PathBuf {
        self.resolve(&self.plugins_dir)
    }

    pub fn commands_path(&self) -> PathBuf {
        self.resolve(&self.commands_dir)
    }

    pub fn agents_path(&self) -> PathBuf {
        self.resolve(&self.agents_dir)
    }

    /// Where the performance monitor keeps its files.
    pub fn monitor_log_dir(&self) -> PathBuf {
        match &self.monitor.log_dir {
            Some(dir) => self.resolve(dir),
            None => self.project_root.join(".performance"),
        }
    }
}

fn parse_bool(val: &str) -> bool {
    matches!(
        val.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
