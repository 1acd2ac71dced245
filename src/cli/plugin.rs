//! `plugin:*` management handlers.

use anyhow::{bail, Context, Result};

use jdc::plugins::{PluginRuntime, PluginSummary};

use super::output;

const USAGE: &str = "\
Usage:
  jdc plugin:list              List loaded plugins
  jdc plugin:info <name>       Show plugin details
  jdc plugin:enable <name>     Enable a plugin
  jdc plugin:disable <name>    Disable a plugin
  jdc plugin:reload <name>     Reload a plugin from disk
  jdc plugin:search <query>    Search plugins by name or description";

pub(crate) fn cmd_plugin(runtime: &mut PluginRuntime, sub: &str, args: &[String]) -> Result<()> {
    match sub {
        "list" => {
            list(runtime);
            Ok(())
        }
        "info" => info(runtime, required(args, "plugin name")?),
        "enable" => {
            let name = required(args, "plugin name")?;
            runtime
                .enable(name)
                .with_context(|| format!("Failed to enable plugin '{}'", name))?;
            output::success(&format!("Plugin '{}' enabled", name));
            Ok(())
        }
        "disable" => {
            let name = required(args, "plugin name")?;
            runtime
                .disable(name)
                .with_context(|| format!("Failed to disable plugin '{}'", name))?;
            output::success(&format!("Plugin '{}' disabled", name));
            Ok(())
        }
        "reload" => {
            let name = required(args, "plugin name")?;
            let loaded = runtime
                .reload(name)
                .with_context(|| format!("Failed to reload plugin '{}'", name))?;
            output::success(&format!("Plugin '{}' reloaded", loaded));
            Ok(())
        }
        "search" => {
            let query = required(args, "search query")?;
            search(runtime, query);
            Ok(())
        }
        other => {
            if !other.is_empty() {
                output::error(&format!("Unknown plugin subcommand: {}", other));
            }
            println!("{}", USAGE);
            bail!("Invalid plugin subcommand '{}'", other)
        }
    }
}

fn required<'a>(args: &'a [String], what: &str) -> Result<&'a str> {
    match args.first() {
        Some(value) => Ok(value.as_str()),
        None => bail!("Missing {}", what),
    }
}

fn print_summary(summary: &PluginSummary) {
    let mark = if summary.enabled { "✓" } else { "✗" };
    println!("  [{}] {} v{}", mark, summary.name, summary.version);
    println!("      Type: {}", summary.plugin_type);
    println!("      Description: {}", summary.description);
    if let Some(author) = &summary.author {
        println!("      Author: {}", author);
    }
}

fn list(runtime: &PluginRuntime) {
    output::header("Plugins");
    let plugins = runtime.list();
    if plugins.is_empty() {
        output::info("No plugins loaded");
    }
    for summary in &plugins {
        print_summary(summary);
    }

    let failures = runtime.failures();
    if !failures.is_empty() {
        println!();
        output::warn(&format!("{} plugin(s) failed to load:", failures.len()));
        for failure in failures {
            let name = failure.plugin.as_deref().unwrap_or("?");
            println!("  {} ({}): {}", name, failure.path.display(), failure.error);
        }
    }
}

fn info(runtime: &PluginRuntime, name: &str) -> Result<()> {
    let info = runtime
        .info(name)
        .with_context(|| format!("No plugin named '{}'", name))?;

    output::header(&format!("Plugin: {}", info.summary.name));
    println!("  Name:        {}", info.summary.name);
    println!("  Version:     {}", info.summary.version);
    println!("  Type:        {}", info.summary.plugin_type);
    println!("  Description: {}", info.summary.description);
    println!(
        "  Author:      {}",
        info.summary.author.as_deref().unwrap_or("unknown")
    );
    println!("  Status:      {}", info.summary.status);
    println!("  Path:        {}", info.path.display());
    if let Some(error) = &info.last_error {
        println!("  Last error:  {}", error);
    }
    Ok(())
}

fn search(runtime: &PluginRuntime, query: &str) {
    let results = runtime.search(query);
    if results.is_empty() {
        output::info(&format!("No plugins match '{}'", query));
        return;
    }
    output::header(&format!("Search results for '{}'", query));
    for summary in &results {
        print_summary(summary);
    }
}
