//! Error types for JDC
//!
//! This module defines the error taxonomy of the plugin runtime. Uses
//! `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for JDC operations.
#[derive(Error, Debug)]
pub enum JdcError {
    /// No `plugin.json` at the expected location.
    #[error("No plugin.json found in {}", .0.display())]
    ManifestMissing(PathBuf),

    /// The descriptor exists but is not parseable JSON.
    #[error("Malformed manifest {}: {source}", .path.display())]
    ManifestMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A required field is absent or empty, or `type` is outside the closed set.
    #[error("Invalid manifest: {0}")]
    ManifestInvalid(String),

    /// The entry module named by `main` does not exist on disk.
    #[error("Plugin entry not found: {}", .0.display())]
    EntryMissing(PathBuf),

    /// The entry bundle could not be turned into a behavior handle, or `init` failed.
    #[error("Failed to load plugin '{plugin}': {message}")]
    ModuleLoad { plugin: String, message: String },

    /// A plugin with the same name is already registered.
    #[error("Plugin already loaded: {0}")]
    PluginAlreadyLoaded(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin is disabled: {0}")]
    PluginDisabled(String),

    /// The plugin's declared type does not match the requested kind.
    #[error("Plugin '{plugin}' has type '{actual}', expected '{expected}'")]
    TypeMismatch {
        plugin: String,
        expected: String,
        actual: String,
    },

    /// The behavior handle has no execute operation.
    #[error("Plugin '{0}' does not expose an execute operation")]
    MissingExecuteContract(String),

    /// A hook handler failed. Logged by the hook bus, never returned to callers.
    #[error("Hook handler failed [{plugin}:{channel}]: {message}")]
    HookHandlerFailed {
        plugin: String,
        channel: String,
        message: String,
    },

    /// The plugin's own execute operation failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Configuration-related errors (unreadable config, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JdcError {
    /// Shorthand used by plugin modules to fail their own execution.
    pub fn execution(message: impl Into<String>) -> Self {
        JdcError::ExecutionFailed(message.into())
    }
}

/// A specialized `Result` type for JDC operations.
pub type Result<T> = std::result::Result<T, JdcError>;
