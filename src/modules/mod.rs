//! Compiled-in plugin modules.
//!
//! Each module exposes a `build(&ModuleContext)` factory registered with the
//! [`ModuleCatalog`] under the name an entry bundle refers to:
//!
//! | Module | Kind | Purpose |
//! |---|---|---|
//! | `hello-world` | command | minimal greeting command |
//! | `custom-step` | step | dependency check, backup, main logic, validation |
//! | `custom-agent` | agent | `AGENT.md` + task sent to the assistant |
//! | `logger-hook` | hook | JSON-lines event log |
//! | `performance-monitor` | hook | times executions via the monitor |
//! | `performance-cli` | command | reports over monitor data |
//!
//! The `shell` module is not registered by name; entry bundles declare it
//! inline with a `"shell"` section.

pub mod custom_agent;
pub mod custom_step;
pub mod hello_world;
pub mod logger_hook;
pub mod performance_cli;
pub mod performance_hook;
pub mod shell;

use crate::plugins::ModuleCatalog;

/// Register every built-in module factory.
pub fn register_builtin(catalog: &mut ModuleCatalog) {
    catalog.register(hello_world::NAME, hello_world::build);
    catalog.register(custom_step::NAME, custom_step::build);
    catalog.register(custom_agent::NAME, custom_agent::build);
    catalog.register(logger_hook::NAME, logger_hook::build);
    catalog.register(performance_hook::NAME, performance_hook::build);
    catalog.register(performance_cli::NAME, performance_cli::build);
}
