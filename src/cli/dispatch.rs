//! Token resolution for the command dispatcher.

use jdc::plugins::{PluginRegistry, PluginType};

use super::builtins::{self, BuiltinAgent, BuiltinCommand, BuiltinStep};

pub(crate) const PLUGIN_PREFIX: &str = "plugin:";
pub(crate) const STEP_PREFIX: &str = "step:";
pub(crate) const AGENT_PREFIX: &str = "agent:";

/// What a command-line token resolves to.
#[derive(Debug, PartialEq)]
pub(crate) enum Action {
    /// `plugin:<sub>` management.
    Manage(String),
    PluginCommand(String),
    PluginStep(String),
    PluginAgent(String),
    BuiltinCommand(&'static BuiltinCommand),
    BuiltinStep(&'static BuiltinStep),
    BuiltinAgent(&'static BuiltinAgent),
    /// Registered but disabled; the runtime reports why it cannot run.
    DisabledPlugin(String),
    Unknown,
}

fn enabled_of_type(registry: &PluginRegistry, name: &str, plugin_type: PluginType) -> bool {
    registry
        .get(name)
        .map(|r| r.enabled && r.plugin_type() == plugin_type)
        .unwrap_or(false)
}

/// Resolve a token, first match wins:
/// management, command plugin, step, agent, built-in command, disabled plugin.
pub(crate) fn resolve(token: &str, registry: &PluginRegistry) -> Action {
    if let Some(sub) = token.strip_prefix(PLUGIN_PREFIX) {
        return Action::Manage(sub.to_string());
    }

    if enabled_of_type(registry, token, PluginType::Command) {
        return Action::PluginCommand(token.to_string());
    }

    if let Some(name) = token.strip_prefix(STEP_PREFIX) {
        return if registry.contains(name) {
            Action::PluginStep(name.to_string())
        } else {
            Action::Unknown
        };
    }
    if token.starts_with("step") {
        if let Some(step) = builtins::find_step(token) {
            return Action::BuiltinStep(step);
        }
    }

    if let Some(name) = token.strip_prefix(AGENT_PREFIX) {
        if enabled_of_type(registry, name, PluginType::Agent) {
            return Action::PluginAgent(name.to_string());
        }
        if let Some(agent) = builtins::find_agent(name) {
            return Action::BuiltinAgent(agent);
        }
        if registry.contains(name) {
            return Action::PluginAgent(name.to_string());
        }
        return Action::Unknown;
    }

    if let Some(command) = builtins::find_command(token) {
        return Action::BuiltinCommand(command);
    }

    match registry.get(token) {
        Some(record) if !record.enabled => Action::DisabledPlugin(token.to_string()),
        _ => Action::Unknown,
    }
}
