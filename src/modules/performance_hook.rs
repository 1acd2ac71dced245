//! `performance-monitor`: times every plugin execution through the hook bus.
//!
//! `before-<kind>` opens a monitor operation keyed by `<kind>-<plugin>`;
//! the matching `after-<kind>` closes it with the result. `on-error` closes
//! any open operation as failed and records an error warning.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::Config;
use crate::error::{JdcError, Result};
use crate::hooks::{ExecutionContext, HookChannel, HookHandler};
use crate::monitor::{MonitorWarning, OperationCategory, PerformanceMonitor};
use crate::plugins::{
    BehaviorHandle, CleanUp, Enableable, HookProvider, Initializable, ModuleContext, PluginKind,
};

pub const NAME: &str = "performance-monitor";

/// Session files older than this are removed on cleanup.
const RETENTION_DAYS: u64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Overrides `monitor.enabled` from the config.
    pub enabled: Option<bool>,
    /// Overrides `monitor.log_dir` from the config.
    pub log_dir: Option<PathBuf>,
}

pub struct PerformanceHook {
    plugin: String,
    settings: PerformanceSettings,
    monitor: OnceCell<PerformanceMonitor>,
    /// Open operation ids keyed by `<kind>-<plugin>`.
    open: Mutex<HashMap<String, String>>,
}

pub fn build(ctx: &ModuleContext) -> Result<BehaviorHandle> {
    let module = Arc::new(PerformanceHook::new(&ctx.manifest.name, ctx.settings_as()?));
    Ok(BehaviorHandle::new()
        .with_init(module.clone())
        .with_toggle(module.clone())
        .with_cleanup(module.clone())
        .with_hooks(Arc::new(PerformanceHooks(module))))
}

fn operation_key(kind: PluginKind, plugin: &str) -> String {
    format!("{}-{}", kind, plugin)
}

impl PerformanceHook {
    pub fn new(plugin: &str, settings: PerformanceSettings) -> Self {
        Self {
            plugin: plugin.to_string(),
            settings,
            monitor: OnceCell::new(),
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn monitor(&self) -> Option<&PerformanceMonitor> {
        self.monitor.get()
    }

    fn open_ops(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.open.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, ctx: &ExecutionContext) {
        let Some(monitor) = self.monitor() else {
            return;
        };
        let category = OperationCategory::from(ctx.kind);
        let metadata = json!({ "payload": ctx.payload.to_value() });
        if let Some(id) = monitor.start_operation(category, &ctx.plugin, metadata) {
            self.open_ops()
                .insert(operation_key(ctx.kind, &ctx.plugin), id);
        }
    }

    fn finish(&self, ctx: &ExecutionContext) -> Result<()> {
        let Some(monitor) = self.monitor() else {
            return Ok(());
        };
        let Some(id) = self.open_ops().remove(&operation_key(ctx.kind, &ctx.plugin)) else {
            return Ok(());
        };

        let result = match (&ctx.result, &ctx.error) {
            (_, Some(error)) => json!({ "success": false, "error": error }),
            (Some(output), None) => serde_json::to_value(output)?,
            (None, None) => json!({ "success": true }),
        };
        monitor.end_operation(&id, result)?;
        Ok(())
    }

    fn record_error(&self, ctx: &ExecutionContext) -> Result<()> {
        self.finish(ctx)?;
        if let Some(monitor) = self.monitor() {
            let error = ctx.error.as_deref().unwrap_or("Unknown error");
            monitor.record_warning(MonitorWarning::error(&ctx.plugin, error))?;
        }
        Ok(())
    }

    fn end_session(&self) -> Result<()> {
        let Some(monitor) = self.monitor() else {
            return Ok(());
        };
        if let Some(analysis) = monitor.end_session(None)? {
            info!(
                plugin = %self.plugin,
                session = %analysis.session_id,
                operations = analysis.operation_count,
                bottlenecks = analysis.bottlenecks.len(),
                "Performance session closed"
            );
        }
        Ok(())
    }
}

impl Initializable for PerformanceHook {
    fn init(&self, config: &Config) -> Result<()> {
        let enabled = self.settings.enabled.unwrap_or(config.monitor.enabled);
        let log_dir = match &self.settings.log_dir {
            Some(dir) => config.resolve(dir),
            None => config.monitor_log_dir(),
        };

        let monitor = PerformanceMonitor::new(log_dir, config.monitor.thresholds_ms, enabled)?;
        monitor.start_session(None);
        self.monitor
            .set(monitor)
            .map_err(|_| JdcError::execution(format!("'{}' initialized twice", self.plugin)))?;
        Ok(())
    }
}

impl Enableable for PerformanceHook {
    fn enable(&self) -> Result<()> {
        if let Some(monitor) = self.monitor() {
            if monitor.current_session().is_none() {
                monitor.start_session(None);
            }
        }
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        self.end_session()
    }
}

impl CleanUp for PerformanceHook {
    fn cleanup(&self) -> Result<()> {
        self.end_session()?;
        if let Some(monitor) = self.monitor().filter(|m| m.is_enabled()) {
            monitor.cleanup(RETENTION_DAYS)?;
        }
        Ok(())
    }
}

struct MonitorChannel {
    hook: Arc<PerformanceHook>,
    channel: HookChannel,
}

#[async_trait]
impl HookHandler for MonitorChannel {
    async fn handle(&self, ctx: &ExecutionContext) -> Result<()> {
        match self.channel {
            HookChannel::OnError => self.hook.record_error(ctx),
            channel if channel == HookChannel::before(ctx.kind) => {
                self.hook.begin(ctx);
                Ok(())
            }
            channel if channel == HookChannel::after(ctx.kind) => self.hook.finish(ctx),
            _ => Ok(()),
        }
    }
}

/// Handlers for the before/after pairs and `on-error`.
struct PerformanceHooks(Arc<PerformanceHook>);

impl HookProvider for PerformanceHooks {
    fn hooks(&self) -> Vec<(String, Arc<dyn HookHandler>)> {
        HookChannel::ALL
            .into_iter()
            .filter(|c| *c != HookChannel::OnSuccess)
            .map(|channel| {
                let handler: Arc<dyn HookHandler> = Arc::new(MonitorChannel {
                    hook: Arc::clone(&self.0),
                    channel,
                });
                (channel.as_str().to_string(), handler)
            })
            .collect()
    }
}
