//! `custom-step`: a step plugin made of four sub-steps.
//!
//! 1. `dependency-check`: every path in the context's `requires` must exist
//! 2. `backup` (optional): copies the context's `files` into `.backup/<stamp>/`
//! 3. `main-logic`
//! 4. `validation`
//!
//! A failed dependency check or main logic stops the sequence; the result is
//! still returned as `{success: false, steps}` rather than an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::plugins::{
    BehaviorHandle, Executable, Initializable, ModuleContext, Payload, PluginOutput, StepReport,
};

pub const NAME: &str = "custom-step";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StepSettings {
    pub check_dependencies: bool,
    pub auto_backup: bool,
    /// Pause before each sub-step.
    pub delay_ms: u64,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            check_dependencies: true,
            auto_backup: true,
            delay_ms: 0,
        }
    }
}

pub struct CustomStep {
    plugin: String,
    settings: StepSettings,
    project_root: OnceCell<PathBuf>,
}

pub fn build(ctx: &ModuleContext) -> Result<BehaviorHandle> {
    let module = Arc::new(CustomStep {
        plugin: ctx.manifest.name.clone(),
        settings: ctx.settings_as()?,
        project_root: OnceCell::new(),
    });
    Ok(BehaviorHandle::new()
        .with_init(module.clone())
        .with_execute(module))
}

impl CustomStep {
    fn root(&self) -> &Path {
        self.project_root
            .get()
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new("."))
    }

    async fn pause(&self) {
        if self.settings.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.delay_ms)).await;
        }
    }

    fn check_dependencies(&self, context: &Value) -> StepReport {
        let missing: Vec<String> = string_list(context, "requires")
            .into_iter()
            .filter(|p| !self.root().join(p).exists())
            .collect();

        if missing.is_empty() {
            StepReport::new("dependency-check", true, "dependencies satisfied")
        } else {
            StepReport::new(
                "dependency-check",
                false,
                &format!("missing: {}", missing.join(", ")),
            )
        }
    }

    async fn backup(&self, context: &Value) -> StepReport {
        let dir = self
            .root()
            .join(".backup")
            .join(Utc::now().format("%Y%m%d%H%M%S").to_string());

        let result = async {
            tokio::fs::create_dir_all(&dir).await?;
            let mut copied = 0;
            for file in string_list(context, "files") {
                let src = self.root().join(&file);
                if !src.is_file() {
                    continue;
                }
                let dest = dir.join(&file);
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(&src, &dest).await?;
                copied += 1;
            }
            Ok::<usize, std::io::Error>(copied)
        }
        .await;

        match result {
            Ok(copied) => {
                let mut report =
                    StepReport::new("backup", true, &format!("{} file(s) backed up", copied));
                report
                    .extra
                    .insert("backup_path".into(), json!(dir.display().to_string()));
                report
            }
            Err(e) => StepReport::new("backup", false, &format!("backup failed: {}", e)),
        }
    }

    fn main_logic(&self, context: &Value) -> StepReport {
        let args = string_list(context, "args");
        let mut report = StepReport::new("main-logic", true, "step logic completed");
        report.extra.insert(
            "output".into(),
            json!({
                "args": args,
                "summary": format!("processed {} argument(s)", args.len()),
            }),
        );
        report
    }

    fn validate(&self, main: &StepReport) -> StepReport {
        if main.extra.contains_key("output") {
            StepReport::new("validation", true, "output verified")
        } else {
            StepReport::new("validation", false, "main logic produced no output")
        }
    }
}

fn string_list(context: &Value, key: &str) -> Vec<String> {
    context
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn finish(success: bool, steps: Vec<StepReport>) -> PluginOutput {
    let output = if success {
        PluginOutput::ok()
    } else {
        PluginOutput::failed()
    };
    output.with("steps", serde_json::to_value(steps).unwrap_or_default())
}

impl Initializable for CustomStep {
    fn init(&self, config: &Config) -> Result<()> {
        let _ = self.project_root.set(config.project_root.clone());
        info!(plugin = %self.plugin, "Plugin initialized");
        Ok(())
    }
}

#[async_trait]
impl Executable for CustomStep {
    async fn execute(&self, payload: &Payload) -> Result<PluginOutput> {
        let empty = Value::Null;
        let context = payload.as_context().unwrap_or(&empty);
        let mut steps = Vec::new();

        if self.settings.check_dependencies {
            self.pause().await;
            let report = self.check_dependencies(context);
            let ok = report.success;
            steps.push(report);
            if !ok {
                return Ok(finish(false, steps));
            }
        }

        if self.settings.auto_backup {
            self.pause().await;
            steps.push(self.backup(context).await);
        }

        self.pause().await;
        let main = self.main_logic(context);
        if !main.success {
            steps.push(main);
            return Ok(finish(false, steps));
        }

        self.pause().await;
        let validation = self.validate(&main);
        let ok = validation.success;
        steps.push(main);
        steps.push(validation);

        debug!(plugin = %self.plugin, steps = steps.len(), "Custom step finished");
        Ok(finish(ok, steps))
    }
}
