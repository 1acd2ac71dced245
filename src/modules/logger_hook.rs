//! `logger-hook`: appends one JSON line per lifecycle event.
//!
//! Subscribes to all eight channels. Each line looks like:
//!
//! ```json
//! {"timestamp":"2026-01-05T10:00:00Z","level":"INFO","message":"Command started","context":{"plugin":"hello-world","args":["World"]}}
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{JdcError, Result};
use crate::hooks::{ExecutionContext, HookChannel, HookHandler};
use crate::plugins::{
    BehaviorHandle, HookProvider, Initializable, ModuleContext, PluginKind,
};

pub const NAME: &str = "logger-hook";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    /// Relative paths resolve against the project root.
    pub log_file: PathBuf,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from(".logs/cli.log"),
        }
    }
}

/// The log file shared by every channel handler.
pub struct LogSink {
    plugin: String,
    settings: LoggerSettings,
    path: OnceCell<PathBuf>,
}

impl LogSink {
    pub fn new(plugin: &str, settings: LoggerSettings) -> Self {
        Self {
            plugin: plugin.to_string(),
            settings,
            path: OnceCell::new(),
        }
    }

    pub fn path(&self) -> Result<&Path> {
        self.path
            .get()
            .map(PathBuf::as_path)
            .ok_or_else(|| JdcError::execution(format!("'{}' was not initialized", self.plugin)))
    }

    pub async fn write(&self, level: &str, message: &str, context: Value) -> Result<()> {
        let path = self.path()?;
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "message": message,
            "context": context,
        });
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;

        if level == "ERROR" {
            error!(plugin = %self.plugin, "{}", message);
        }
        Ok(())
    }

    /// The last `lines` entries, oldest first. Unparsable lines are skipped.
    pub async fn recent(&self, lines: usize) -> Result<Vec<Value>> {
        let path = self.path()?;
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let entries: Vec<Value> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        let skip = entries.len().saturating_sub(lines);
        Ok(entries.into_iter().skip(skip).collect())
    }

    pub async fn clear(&self) -> Result<()> {
        let path = self.path()?;
        if path.exists() {
            tokio::fs::write(path, "").await?;
        }
        Ok(())
    }
}

impl Initializable for LogSink {
    fn init(&self, config: &Config) -> Result<()> {
        let path = config.resolve(&self.settings.log_file);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        info!(plugin = %self.plugin, path = %path.display(), "Logger initialized");
        let _ = self.path.set(path);
        Ok(())
    }
}

/// One channel's handler.
struct ChannelLogger {
    sink: Arc<LogSink>,
    channel: HookChannel,
}

fn payload_key(kind: PluginKind) -> &'static str {
    match kind {
        PluginKind::Command => "args",
        PluginKind::Step => "context",
        PluginKind::Agent => "task",
    }
}

fn event_message(channel: HookChannel) -> &'static str {
    match channel {
        HookChannel::BeforeCommand => "Command started",
        HookChannel::AfterCommand => "Command completed",
        HookChannel::BeforeStep => "Step started",
        HookChannel::AfterStep => "Step completed",
        HookChannel::BeforeAgent => "Agent started",
        HookChannel::AfterAgent => "Agent completed",
        HookChannel::OnError => "Error occurred",
        HookChannel::OnSuccess => "Execution successful",
    }
}

#[async_trait]
impl HookHandler for ChannelLogger {
    async fn handle(&self, ctx: &ExecutionContext) -> Result<()> {
        let mut context = Map::new();
        context.insert("plugin".into(), json!(ctx.plugin));

        let level = match self.channel {
            HookChannel::OnError => {
                context.insert(
                    "error".into(),
                    json!(ctx.error.as_deref().unwrap_or("Unknown error")),
                );
                "ERROR"
            }
            HookChannel::OnSuccess => {
                context.insert("result".into(), serde_json::to_value(&ctx.result)?);
                "INFO"
            }
            channel => {
                context.insert(payload_key(ctx.kind).into(), ctx.payload.to_value());
                if ctx.result.is_some() && channel == HookChannel::after(ctx.kind) {
                    context.insert("result".into(), serde_json::to_value(&ctx.result)?);
                }
                "INFO"
            }
        };

        self.sink
            .write(level, event_message(self.channel), Value::Object(context))
            .await
    }
}

/// Hook table over a shared sink.
struct LoggerHooks {
    sink: Arc<LogSink>,
}

impl HookProvider for LoggerHooks {
    fn hooks(&self) -> Vec<(String, Arc<dyn HookHandler>)> {
        HookChannel::ALL
            .into_iter()
            .map(|channel| {
                let handler: Arc<dyn HookHandler> = Arc::new(ChannelLogger {
                    sink: Arc::clone(&self.sink),
                    channel,
                });
                (channel.as_str().to_string(), handler)
            })
            .collect()
    }
}

pub fn build(ctx: &ModuleContext) -> Result<BehaviorHandle> {
    let sink = Arc::new(LogSink::new(&ctx.manifest.name, ctx.settings_as()?));
    Ok(BehaviorHandle::new()
        .with_init(sink.clone())
        .with_hooks(Arc::new(LoggerHooks { sink })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{Payload, PluginOutput};
    use tempfile::TempDir;

    fn sink(root: &Path) -> Arc<LogSink> {
        let sink = Arc::new(LogSink::new(NAME, LoggerSettings::default()));
        let config = Config {
            project_root: root.to_path_buf(),
            ..Config::default()
        };
        sink.init(&config).unwrap();
        sink
    }

    fn handler(sink: &Arc<LogSink>, channel: HookChannel) -> ChannelLogger {
        ChannelLogger {
            sink: Arc::clone(sink),
            channel,
        }
    }

    #[test]
    fn test_provides_all_channels() {
        let hooks = LoggerHooks {
            sink: Arc::new(LogSink::new(NAME, LoggerSettings::default())),
        }
        .hooks();
        let names: Vec<&str> = hooks.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"before-command"));
        assert!(names.contains(&"on-success"));
    }

    #[tokio::test]
    async fn test_writes_json_lines() {
        let tmp = TempDir::new().unwrap();
        let sink = sink(tmp.path());
        let mut ctx = ExecutionContext::new(
            "hello-world",
            PluginKind::Command,
            Payload::Args(vec!["World".into()]),
        );

        handler(&sink, HookChannel::BeforeCommand)
            .handle(&ctx)
            .await
            .unwrap();
        ctx.result = Some(PluginOutput::ok().with("message", "Hello, World!"));
        handler(&sink, HookChannel::AfterCommand)
            .handle(&ctx)
            .await
            .unwrap();

        let entries = sink.recent(50).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["message"], "Command started");
        assert_eq!(entries[0]["context"]["args"], json!(["World"]));
        assert_eq!(entries[1]["context"]["result"]["message"], "Hello, World!");
        assert!(tmp.path().join(".logs/cli.log").is_file());
    }

    #[tokio::test]
    async fn test_error_entries_and_clear() {
        let tmp = TempDir::new().unwrap();
        let sink = sink(tmp.path());
        let mut ctx = ExecutionContext::new("a", PluginKind::Agent, Payload::Task("t".into()));
        ctx.error = Some("boom".into());

        handler(&sink, HookChannel::OnError).handle(&ctx).await.unwrap();
        let entries = sink.recent(1).await.unwrap();
        assert_eq!(entries[0]["level"], "ERROR");
        assert_eq!(entries[0]["context"]["error"], "boom");

        sink.clear().await.unwrap();
        assert!(sink.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_keeps_tail() {
        let tmp = TempDir::new().unwrap();
        let sink = sink(tmp.path());
        for i in 0..5 {
            sink.write("INFO", &format!("m{}", i), json!({})).await.unwrap();
        }
        let entries = sink.recent(2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["message"], "m3");
    }

    #[tokio::test]
    async fn test_uninitialized_sink_fails() {
        let sink = LogSink::new(NAME, LoggerSettings::default());
        assert!(sink.write("INFO", "x", json!({})).await.is_err());
    }
}
