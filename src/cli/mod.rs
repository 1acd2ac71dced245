//! Command dispatcher for the `jdc` binary.

mod builtins;
mod dispatch;
mod plugin;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::debug;

use jdc::config::Config;
use jdc::plugins::{PluginOutput, PluginRuntime};

use dispatch::Action;

#[derive(Parser, Debug)]
#[command(name = "jdc")]
#[command(version)]
#[command(about = "Java development assistant CLI with plugin and hook dispatch")]
pub(crate) struct Cli {
    /// Print the assistant prompt instead of running it
    #[arg(long)]
    pub dry_run: bool,

    /// Verbose logging and full error chains
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file (defaults to ~/.jdc/config.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the plugins directory
    #[arg(long, value_name = "DIR")]
    pub plugins_dir: Option<PathBuf>,

    /// Command, `step<N>`, `agent:<name>`, `plugin:<sub>` or a plugin name
    pub token: Option<String>,

    /// Arguments passed to the resolved command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Honor `--dry-run` and `-v/--verbose` anywhere on the line, including
    /// after the command token where clap collects them into `args`.
    pub fn with_global_flags(mut self) -> Self {
        let mut rest = Vec::with_capacity(self.args.len());
        for arg in self.args.drain(..) {
            match arg.as_str() {
                "--dry-run" => self.dry_run = true,
                "--verbose" | "-v" => self.verbose = true,
                _ => rest.push(arg),
            }
        }
        self.args = rest;
        self
    }
}

/// Terminal output helpers.
pub(crate) mod output {
    pub fn header(title: &str) {
        let rule = "=".repeat(60);
        println!("\n{}\n{}\n{}", rule, title, rule);
    }

    pub fn success(msg: &str) {
        println!("✓ {}", msg);
    }

    pub fn error(msg: &str) {
        eprintln!("✗ {}", msg);
    }

    pub fn info(msg: &str) {
        println!("ℹ {}", msg);
    }

    pub fn warn(msg: &str) {
        println!("⚠ {}", msg);
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().with_context(|| "Failed to load configuration")?,
    };
    if let Some(dir) = &cli.plugins_dir {
        config.plugins_dir = dir.clone();
    }
    Ok(config)
}

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let root = config.plugins_path();

    let mut runtime = PluginRuntime::with_catalog(config);
    runtime
        .load_all(&root)
        .with_context(|| format!("Failed to scan plugins in {}", root.display()))?;

    let result = match cli.token.as_deref() {
        None => {
            print_help(&runtime);
            Ok(())
        }
        Some(token) => run_token(&mut runtime, token, &cli.args, cli.dry_run).await,
    };

    runtime.shutdown();
    result
}

async fn run_token(
    runtime: &mut PluginRuntime,
    token: &str,
    args: &[String],
    dry_run: bool,
) -> Result<()> {
    let action = dispatch::resolve(token, runtime.registry());
    debug!(token, ?action, "Resolved command");

    match action {
        Action::Manage(sub) => plugin::cmd_plugin(runtime, &sub, args),
        Action::PluginCommand(name) | Action::DisabledPlugin(name) => {
            let result = runtime.execute_command(&name, args.to_vec()).await?;
            report(&name, &result)
        }
        Action::PluginStep(name) => {
            let result = runtime
                .execute_step(&name, json!({ "args": args }))
                .await?;
            report(&name, &result)
        }
        Action::PluginAgent(name) => {
            let result = runtime.execute_agent(&name, &args.join(" ")).await?;
            report(&name, &result)
        }
        Action::BuiltinCommand(command) => {
            output::header(&format!("Command: {}", command.name));
            let file = runtime.config().commands_path().join(command.file);
            builtins::run_prompt(runtime.config(), &file, &command.prompt(args), dry_run).await
        }
        Action::BuiltinStep(step) => {
            output::header(&format!("Step {}: {}", step.number, step.description));
            let file = runtime.config().commands_path().join(builtins::STEPS_FILE);
            builtins::run_prompt(runtime.config(), &file, &step.prompt(args), dry_run).await
        }
        Action::BuiltinAgent(agent) => {
            output::header(&format!("Agent: {}", agent.description));
            let file = runtime.config().agents_path().join(agent.file());
            builtins::run_prompt(runtime.config(), &file, &agent.prompt(args), dry_run).await
        }
        Action::Unknown => {
            bail!("Unknown command '{}'. Run `jdc` without arguments for a list.", token)
        }
    }
}

/// Print a plugin result; a reported failure becomes an error exit.
fn report(name: &str, result: &PluginOutput) -> Result<()> {
    if let Some(message) = result.message() {
        println!("{}", message);
    }
    if let Some(response) = result.response() {
        println!("{}", response);
    }
    for step in result.steps() {
        let mark = if step.success { "✓" } else { "✗" };
        match &step.message {
            Some(message) => println!("  {} {}: {}", mark, step.name, message),
            None => println!("  {} {}", mark, step.name),
        }
    }

    if result.success {
        output::success(&format!("{} completed", name));
        Ok(())
    } else {
        let reason = result
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("plugin reported failure");
        bail!("{} failed: {}", name, reason)
    }
}

fn print_help(runtime: &PluginRuntime) {
    output::header("JDC - Java development assistant");
    println!("Usage: jdc [--dry-run] [-v] <command> [args...]\n");

    println!("Commands:");
    for command in builtins::COMMANDS {
        println!("  {:<20} {}", command.name, command.description);
    }

    println!("\nDevelopment steps:");
    for step in builtins::STEPS {
        println!("  {:<20} {}", step.name, step.description);
    }

    println!("\nAgents:");
    for agent in builtins::AGENTS {
        println!("  agent:{:<14} {}", agent.name, agent.description);
    }

    let plugins = runtime.list();
    if !plugins.is_empty() {
        println!("\nPlugins:");
        for plugin in &plugins {
            let mark = if plugin.enabled { "✓" } else { "✗" };
            println!(
                "  [{}] {:<16} ({}) {}",
                mark, plugin.name, plugin.plugin_type, plugin.description
            );
        }
    }

    println!("\nPlugin management: jdc plugin:list|info|enable|disable|reload|search");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_flags_and_trailing_args() {
        let cli = Cli::parse_from([
            "jdc",
            "--dry-run",
            "-v",
            "performance-cli",
            "bottlenecks",
            "--limit",
            "3",
        ])
        .with_global_flags();
        assert!(cli.dry_run);
        assert!(cli.verbose);
        assert_eq!(cli.token.as_deref(), Some("performance-cli"));
        assert_eq!(cli.args, vec!["bottlenecks", "--limit", "3"]);
    }

    #[test]
    fn test_global_flags_after_arguments() {
        let cli = Cli::parse_from(["jdc", "step1", "user module", "--dry-run"]).with_global_flags();
        assert!(cli.dry_run);
        assert!(!cli.verbose);
        assert_eq!(cli.token.as_deref(), Some("step1"));
        assert_eq!(cli.args, vec!["user module"]);

        let cli = Cli::parse_from(["jdc", "check", "--verbose"]).with_global_flags();
        assert!(cli.verbose);
        assert!(cli.args.is_empty());

        let cli = Cli::parse_from(["jdc", "next", "--dry-run"]).with_global_flags();
        assert!(cli.dry_run);
    }

    #[test]
    fn test_cli_without_token() {
        let cli = Cli::parse_from(["jdc", "--plugins-dir", "/tmp/plugins"]);
        assert!(cli.token.is_none());
        assert_eq!(cli.plugins_dir, Some(PathBuf::from("/tmp/plugins")));
    }

    #[test]
    fn test_report_failure_is_error() {
        let ok = PluginOutput::ok().with("message", "done");
        assert!(report("p", &ok).is_ok());

        let failed = PluginOutput::failed().with("error", "boom");
        let err = report("p", &failed).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
