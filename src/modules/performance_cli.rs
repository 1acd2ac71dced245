//! `performance-cli`: inspect the data written by the performance monitor.
//!
//! ```text
//! jdc performance-cli report
//! jdc performance-cli bottlenecks --limit 5
//! jdc performance-cli export perf.json
//! jdc performance-cli clean --days 14
//! jdc performance-cli reset
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::{Config, ThresholdsConfig};
use crate::error::{JdcError, Result};
use crate::monitor::{render_bottlenecks, render_report, PerformanceMonitor};
use crate::plugins::{
    BehaviorHandle, Executable, Initializable, ModuleContext, Payload, PluginOutput,
};

pub const NAME: &str = "performance-cli";

const DEFAULT_LIMIT: usize = 10;
const DEFAULT_CLEAN_DAYS: u64 = 7;

#[derive(Debug, Clone)]
struct DataDir {
    log_dir: PathBuf,
    thresholds: ThresholdsConfig,
}

pub struct PerformanceCli {
    plugin: String,
    data: OnceCell<DataDir>,
}

pub fn build(ctx: &ModuleContext) -> Result<BehaviorHandle> {
    let module = Arc::new(PerformanceCli {
        plugin: ctx.manifest.name.clone(),
        data: OnceCell::new(),
    });
    Ok(BehaviorHandle::new()
        .with_init(module.clone())
        .with_execute(module))
}

/// Positional arguments plus `--key value` / `--flag` options.
#[derive(Debug, Default, PartialEq)]
struct ParsedArgs {
    positional: Vec<String>,
    options: HashMap<String, Option<String>>,
}

fn parse_args(args: &[String]) -> ParsedArgs {
    let mut parsed = ParsedArgs::default();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.strip_prefix("--") {
            Some(key) => {
                let value = iter.next_if(|next| !next.starts_with("--")).cloned();
                parsed.options.insert(key.to_string(), value);
            }
            None => parsed.positional.push(arg.clone()),
        }
    }
    parsed
}

impl ParsedArgs {
    fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_deref())
    }

    /// `--key value`, else the first positional argument.
    fn value(&self, key: &str) -> Option<&str> {
        self.option(key)
            .or_else(|| self.positional.first().map(String::as_str))
    }
}

impl PerformanceCli {
    /// A monitor over the on-disk data, reloaded on every call.
    fn monitor(&self) -> Result<PerformanceMonitor> {
        let data = self
            .data
            .get()
            .ok_or_else(|| JdcError::execution(format!("'{}' was not initialized", self.plugin)))?;
        PerformanceMonitor::new(data.log_dir.clone(), data.thresholds, true)
    }

    fn report(&self) -> Result<PluginOutput> {
        let monitor = self.monitor()?;
        let report = monitor.report(DEFAULT_LIMIT);
        if report.metrics.is_empty() {
            return Ok(PluginOutput::ok().with("message", "No performance data yet"));
        }
        Ok(PluginOutput::ok()
            .with("message", render_report(&report))
            .with("report", serde_json::to_value(&report)?))
    }

    fn bottlenecks(&self, args: &ParsedArgs) -> Result<PluginOutput> {
        let limit = args
            .option("limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_LIMIT);
        let monitor = self.monitor()?;
        let bottlenecks = monitor.top_bottlenecks(limit);
        let recommendations = monitor.recommendations();

        let message = if bottlenecks.is_empty() {
            "No performance data yet".to_string()
        } else {
            render_bottlenecks(&bottlenecks, &recommendations)
        };
        Ok(PluginOutput::ok()
            .with("message", message)
            .with("bottlenecks", serde_json::to_value(&bottlenecks)?))
    }

    fn export(&self, args: &ParsedArgs) -> Result<PluginOutput> {
        let file = args
            .value("output")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                PathBuf::from(format!("performance-report-{}.json", Utc::now().timestamp_millis()))
            });
        let path = self.monitor()?.export_report(&file)?;
        Ok(PluginOutput::ok()
            .with("message", format!("Report exported to {}", path.display()))
            .with("output_file", path.display().to_string()))
    }

    fn clean(&self, args: &ParsedArgs) -> Result<PluginOutput> {
        let days = args
            .value("days")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CLEAN_DAYS);
        let cleaned = self.monitor()?.cleanup(days)?;
        Ok(PluginOutput::ok()
            .with(
                "message",
                format!("Removed {} session file(s) older than {} day(s)", cleaned, days),
            )
            .with("cleaned", cleaned))
    }

    fn reset(&self) -> Result<PluginOutput> {
        let removed = self.monitor()?.reset()?;
        Ok(PluginOutput::ok()
            .with("message", "Performance data reset")
            .with("removed", removed))
    }
}

impl Initializable for PerformanceCli {
    fn init(&self, config: &Config) -> Result<()> {
        let _ = self.data.set(DataDir {
            log_dir: config.monitor_log_dir(),
            thresholds: config.monitor.thresholds_ms,
        });
        Ok(())
    }
}

#[async_trait]
impl Executable for PerformanceCli {
    async fn execute(&self, payload: &Payload) -> Result<PluginOutput> {
        let args = payload.as_args().unwrap_or_default();
        let (sub, rest) = match args.split_first() {
            Some((sub, rest)) => (sub.as_str(), rest),
            None => ("report", args),
        };
        let parsed = parse_args(rest);
        debug!(plugin = %self.plugin, subcommand = sub, "Running performance subcommand");

        match sub {
            "report" => self.report(),
            "bottlenecks" => self.bottlenecks(&parsed),
            "export" => self.export(&parsed),
            "clean" => self.clean(&parsed),
            "reset" => self.reset(),
            other => {
                let error = format!("Unknown subcommand: {}", other);
                let message = format!(
                    "{} (available: report, bottlenecks, export, clean, reset)",
                    error
                );
                Ok(PluginOutput::failed()
                    .with("message", message)
                    .with("error", error))
            }
        }
    }
}
