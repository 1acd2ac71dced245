//! `custom-agent`: an agent plugin driven by its own `AGENT.md`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::{debug, info};

use crate::assistant::AssistantInvoker;
use crate::config::Config;
use crate::error::{JdcError, Result};
use crate::plugins::{
    BehaviorHandle, Executable, Initializable, ModuleContext, Payload, PluginOutput,
};

pub const NAME: &str = "custom-agent";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Reported back in every result.
    pub model: String,
    /// Agent definition, relative to the plugin directory.
    pub agent_file: PathBuf,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "claude-3".to_string(),
            agent_file: PathBuf::from("AGENT.md"),
        }
    }
}

pub struct CustomAgent {
    plugin: String,
    plugin_dir: PathBuf,
    settings: AgentSettings,
    assistant: OnceCell<AssistantInvoker>,
}

pub fn build(ctx: &ModuleContext) -> Result<BehaviorHandle> {
    let module = Arc::new(CustomAgent {
        plugin: ctx.manifest.name.clone(),
        plugin_dir: ctx.plugin_dir.clone(),
        settings: ctx.settings_as()?,
        assistant: OnceCell::new(),
    });
    Ok(BehaviorHandle::new()
        .with_init(module.clone())
        .with_execute(module))
}

impl CustomAgent {
    /// Agent definition followed by the task.
    pub async fn prompt(&self, task: &str) -> String {
        let path = self.plugin_dir.join(&self.settings.agent_file);
        let definition = tokio::fs::read_to_string(&path).await.unwrap_or_default();

        format!(
            "{}\n\nTask: {}\n\nComplete this task following the responsibilities and workflow described above.",
            definition.trim(),
            task
        )
        .trim()
        .to_string()
    }
}

impl Initializable for CustomAgent {
    fn init(&self, config: &Config) -> Result<()> {
        let _ = self.assistant.set(AssistantInvoker::from_config(config));
        info!(plugin = %self.plugin, model = %self.settings.model, "Plugin initialized");
        Ok(())
    }
}

#[async_trait]
impl Executable for CustomAgent {
    async fn execute(&self, payload: &Payload) -> Result<PluginOutput> {
        let task = payload.as_task().unwrap_or_default();
        let assistant = self
            .assistant
            .get()
            .ok_or_else(|| JdcError::execution(format!("'{}' was not initialized", self.plugin)))?;

        let prompt = self.prompt(task).await;
        debug!(plugin = %self.plugin, prompt_len = prompt.len(), "Agent prompt built");
        let response = assistant.run_captured(&prompt).await?;

        Ok(PluginOutput::ok()
            .with("task", task)
            .with("response", response)
            .with("model", self.settings.model.as_str()))
    }
}
