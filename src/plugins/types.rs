//! Plugin types for JDC
//!
//! This module defines the data model of the plugin system: the manifest
//! parsed from `plugin.json`, the in-memory record owned by the registry,
//! the payloads handed to the three invocable kinds and the result shape
//! every `execute` returns.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::behavior::{BehaviorHandle, Capabilities};

/// Entry module used when the manifest has no `main`.
pub const DEFAULT_ENTRY: &str = "index";

/// The closed set of declared plugin types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Command,
    Step,
    Agent,
    Hook,
    Custom,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Command => "command",
            PluginType::Step => "step",
            PluginType::Agent => "agent",
            PluginType::Hook => "hook",
            PluginType::Custom => "custom",
        }
    }

    /// The invocable kind for this type, if any.
    pub fn kind(&self) -> Option<PluginKind> {
        match self {
            PluginType::Command => Some(PluginKind::Command),
            PluginType::Step => Some(PluginKind::Step),
            PluginType::Agent => Some(PluginKind::Agent),
            PluginType::Hook | PluginType::Custom => None,
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three directly invocable plugin kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Command,
    Step,
    Agent,
}

impl PluginKind {
    pub fn as_str(&self) -> &'static str {
        self.plugin_type().as_str()
    }

    pub fn plugin_type(&self) -> PluginType {
        match self {
            PluginKind::Command => PluginType::Command,
            PluginKind::Step => PluginType::Step,
            PluginKind::Agent => PluginType::Agent,
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a plugin record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Enabled,
    Disabled,
    Error,
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PluginStatus::Enabled => "enabled",
            PluginStatus::Disabled => "disabled",
            PluginStatus::Error => "error",
        })
    }
}

/// A validated `plugin.json`.
///
/// # Example
///
/// ```json
/// {
///   "name": "hello-world",
///   "version": "1.0.0",
///   "type": "command",
///   "description": "Greets the caller",
///   "author": "JDC",
///   "main": "index.json"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin name; the registry key.
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Whether the plugin starts enabled. Defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Entry module path relative to the plugin directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl PluginManifest {
    /// The entry module name, falling back to [`DEFAULT_ENTRY`].
    pub fn entry(&self) -> &str {
        self.main.as_deref().unwrap_or(DEFAULT_ENTRY)
    }
}

/// A loaded plugin, owned exclusively by the registry.
pub struct PluginRecord {
    pub manifest: PluginManifest,
    pub status: PluginStatus,
    pub enabled: bool,
    pub last_error: Option<String>,
    /// The plugin directory it was loaded from.
    pub source_path: PathBuf,
    /// The resolved entry module.
    pub entry_path: PathBuf,
    pub(crate) behavior: BehaviorHandle,
}

impl PluginRecord {
    /// Create a record for a freshly loaded plugin. The initial status
    /// follows the manifest's `enabled` flag.
    pub fn new(
        manifest: PluginManifest,
        source_path: PathBuf,
        entry_path: PathBuf,
        behavior: BehaviorHandle,
    ) -> Self {
        let enabled = manifest.enabled;
        Self {
            manifest,
            status: if enabled {
                PluginStatus::Enabled
            } else {
                PluginStatus::Disabled
            },
            enabled,
            last_error: None,
            source_path,
            entry_path,
            behavior,
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn plugin_type(&self) -> PluginType {
        self.manifest.plugin_type
    }

    pub fn behavior(&self) -> &BehaviorHandle {
        &self.behavior
    }

    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.manifest.name.clone(),
            version: self.manifest.version.clone(),
            plugin_type: self.manifest.plugin_type,
            description: self.manifest.description.clone(),
            author: self.manifest.author.clone(),
            enabled: self.enabled,
            status: self.status,
        }
    }

    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            summary: self.summary(),
            path: self.source_path.clone(),
            manifest: self.manifest.clone(),
            capabilities: self.behavior.capabilities(),
            last_error: self.last_error.clone(),
        }
    }
}

impl fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRecord")
            .field("manifest", &self.manifest)
            .field("status", &self.status)
            .field("enabled", &self.enabled)
            .field("last_error", &self.last_error)
            .field("source_path", &self.source_path)
            .field("capabilities", &self.behavior.capabilities())
            .finish()
    }
}

/// Listing row for `plugin:list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub description: String,
    pub author: Option<String>,
    pub enabled: bool,
    pub status: PluginStatus,
}

/// Detail view for `plugin:info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInfo {
    #[serde(flatten)]
    pub summary: PluginSummary,
    pub path: PathBuf,
    pub manifest: PluginManifest,
    pub capabilities: Capabilities,
    pub last_error: Option<String>,
}

/// A plugin directory that failed to load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadFailure {
    pub path: PathBuf,
    /// Known when the manifest parsed before the failure.
    pub plugin: Option<String>,
    pub status: PluginStatus,
    pub error: String,
}

/// Outcome of a batch load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<LoadFailure>,
}

/// Input handed to a plugin's execute operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// Command argument list.
    Args(Vec<String>),
    /// Step context object.
    Context(Value),
    /// Free-form agent task.
    Task(String),
}

impl Payload {
    /// The kind this payload shape belongs to.
    pub fn kind(&self) -> PluginKind {
        match self {
            Payload::Args(_) => PluginKind::Command,
            Payload::Context(_) => PluginKind::Step,
            Payload::Task(_) => PluginKind::Agent,
        }
    }

    pub fn as_args(&self) -> Option<&[String]> {
        match self {
            Payload::Args(args) => Some(args),
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<&Value> {
        match self {
            Payload::Context(ctx) => Some(ctx),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<&str> {
        match self {
            Payload::Task(task) => Some(task),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// The result shape returned by every execute: a success flag plus
/// kind-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginOutput {
    pub success: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PluginOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            fields: Map::new(),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Command results conventionally carry a `message`.
    pub fn message(&self) -> Option<&str> {
        self.get("message").and_then(Value::as_str)
    }

    /// Agent results conventionally carry a `response`.
    pub fn response(&self) -> Option<&str> {
        self.get("response").and_then(Value::as_str)
    }

    /// Step results may carry a `steps` sequence of sub-step reports.
    pub fn steps(&self) -> Vec<StepReport> {
        self.get("steps")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// One sub-step inside a step plugin's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StepReport {
    pub fn new(name: &str, success: bool, message: &str) -> Self {
        Self {
            name: name.to_string(),
            success,
            message: Some(message.to_string()),
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_manifest_deserialization_defaults() {
        let manifest: PluginManifest = serde_json::from_str(
            r#"{"name":"hello","version":"1.0","type":"command","description":"x"}"#,
        )
        .unwrap();
        assert_eq!(manifest.plugin_type, PluginType::Command);
        assert!(manifest.enabled);
        assert_eq!(manifest.entry(), "index");
        assert!(manifest.author.is_none());
    }

    #[test]
    fn test_manifest_explicit_main_and_disabled() {
        let manifest: PluginManifest = serde_json::from_str(
            r#"{"name":"a","version":"2","type":"hook","description":"d","enabled":false,"main":"hooks.json"}"#,
        )
        .unwrap();
        assert!(!manifest.enabled);
        assert_eq!(manifest.entry(), "hooks.json");
    }

    #[test]
    fn test_manifest_unknown_type_rejected() {
        let result = serde_json::from_str::<PluginManifest>(
            r#"{"name":"a","version":"1","type":"widget","description":"d"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_type_kind_mapping() {
        assert_eq!(PluginType::Command.kind(), Some(PluginKind::Command));
        assert_eq!(PluginType::Hook.kind(), None);
        assert_eq!(PluginType::Custom.kind(), None);
        assert_eq!(PluginKind::Agent.plugin_type(), PluginType::Agent);
        assert_eq!(PluginKind::Step.to_string(), "step");
    }

    #[test]
    fn test_payload_kinds_and_accessors() {
        let args = Payload::Args(vec!["World".into()]);
        assert_eq!(args.kind(), PluginKind::Command);
        assert_eq!(args.as_args().unwrap(), ["World".to_string()]);
        assert!(args.as_task().is_none());

        let task = Payload::Task("review".into());
        assert_eq!(task.kind(), PluginKind::Agent);
        assert_eq!(task.to_value(), json!("review"));

        let ctx = Payload::Context(json!({"args": []}));
        assert_eq!(ctx.kind(), PluginKind::Step);
        assert_eq!(ctx.as_context().unwrap()["args"], json!([]));
    }

    #[test]
    fn test_plugin_output_flattened_fields() {
        let output = PluginOutput::ok().with("message", "Hello, World!");
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value, json!({"success": true, "message": "Hello, World!"}));
        assert_eq!(output.message(), Some("Hello, World!"));
        assert!(output.response().is_none());
    }

    #[test]
    fn test_plugin_output_steps() {
        let output: PluginOutput = serde_json::from_value(json!({
            "success": false,
            "steps": [
                {"name": "dependency-check", "success": true, "message": "ok"},
                {"name": "main-logic", "success": false, "output": {"files": []}}
            ]
        }))
        .unwrap();
        let steps = output.steps();
        assert_eq!(steps.len(), 2);
        assert!(steps[0].success);
        assert_eq!(steps[1].name, "main-logic");
        assert!(steps[1].extra.contains_key("output"));
    }

    #[test]
    fn test_record_status_follows_manifest() {
        let mut manifest: PluginManifest = serde_json::from_str(
            r#"{"name":"a","version":"1","type":"custom","description":"d"}"#,
        )
        .unwrap();
        let record = PluginRecord::new(
            manifest.clone(),
            PathBuf::from("/p/a"),
            PathBuf::from("/p/a/index.json"),
            BehaviorHandle::new(),
        );
        assert_eq!(record.status, PluginStatus::Enabled);
        assert!(record.enabled);

        manifest.enabled = false;
        let record = PluginRecord::new(
            manifest,
            PathBuf::from("/p/a"),
            PathBuf::from("/p/a/index.json"),
            BehaviorHandle::new(),
        );
        assert_eq!(record.status, PluginStatus::Disabled);
        assert!(!record.summary().enabled);
    }
}
