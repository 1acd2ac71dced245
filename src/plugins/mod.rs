//! Plugin system for JDC
//!
//! This module loads plugins from directories on disk, keeps them in a
//! registry and executes them with lifecycle hooks. Each plugin is a
//! directory containing a `plugin.json` manifest and an entry bundle that
//! names the module implementing it.
//!
//! # Architecture
//!
//! - **types**: Core data structures (`PluginManifest`, `PluginRecord`, `Payload`, `PluginOutput`)
//! - **behavior**: Capability traits and the cached `BehaviorHandle`
//! - **loader**: Manifest reading, validation, entry resolution and the `ModuleLoader` seam
//! - **catalog**: `ModuleCatalog`, the default loader over compiled-in modules
//! - **registry**: Name-keyed plugin store preserving load order
//! - **runtime**: `PluginRuntime`, lifecycle management and typed execution
//!
//! # Plugin Directory Structure
//!
//! ```text
//! .claude/cli/plugins/
//! ├── hello-world/
//! │   ├── plugin.json
//! │   └── index.json
//! ├── code-reviewer/
//! │   ├── plugin.json
//! │   ├── index.json
//! │   └── AGENT.md
//! └── run-tests/
//!     ├── plugin.json
//!     └── index.json        { "shell": { "command": "mvn -q test {{args}}" } }
//! ```
//!
//! # Example plugin.json
//!
//! ```json
//! {
//!   "name": "hello-world",
//!   "version": "1.0.0",
//!   "type": "command",
//!   "description": "Greets the caller",
//!   "author": "JDC",
//!   "main": "index.json"
//! }
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use jdc::config::Config;
//! use jdc::plugins::PluginRuntime;
//!
//! let config = Config::load().unwrap();
//! let root = config.plugins_path();
//! let mut runtime = PluginRuntime::with_catalog(config);
//! let report = runtime.load_all(&root).unwrap();
//!
//! println!("Loaded {} plugins, {} failed", report.loaded.len(), report.failed.len());
//! ```

pub mod behavior;
pub mod catalog;
pub mod loader;
pub mod registry;
pub mod runtime;
pub mod types;

pub use behavior::{
    BehaviorHandle, Capabilities, CleanUp, Enableable, Executable, HookProvider, Initializable,
};
pub use catalog::{EntryBundle, ModuleCatalog, ModuleContext, ModuleFactory};
pub use loader::{read_manifest, resolve_entry, validate_manifest, ModuleLoader, MANIFEST_FILE};
pub use registry::PluginRegistry;
pub use runtime::PluginRuntime;
pub use types::{
    LoadFailure, LoadReport, Payload, PluginInfo, PluginKind, PluginManifest, PluginOutput,
    PluginRecord, PluginStatus, PluginSummary, PluginType, StepReport,
};
