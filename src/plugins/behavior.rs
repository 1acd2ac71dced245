//! Plugin capabilities.
//!
//! A loaded module exposes the subset of operations it supports through
//! small capability traits. The loader resolves them once and caches them in
//! a [`BehaviorHandle`]; the runtime only ever asks the handle whether a slot
//! is filled.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::hooks::HookHandler;

use super::types::{Payload, PluginOutput};

/// One-time setup with the process-wide configuration.
pub trait Initializable: Send + Sync {
    fn init(&self, config: &Config) -> Result<()>;
}

/// The invocable operation of command, step and agent plugins.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn execute(&self, payload: &Payload) -> Result<PluginOutput>;
}

/// Callbacks fired when the plugin is enabled or disabled at runtime.
pub trait Enableable: Send + Sync {
    fn enable(&self) -> Result<()>;
    fn disable(&self) -> Result<()>;
}

/// Release resources before the plugin is unloaded.
pub trait CleanUp: Send + Sync {
    fn cleanup(&self) -> Result<()>;
}

/// Hook table of a `hook` plugin: channel name to handler.
///
/// Channel names are plain strings so a plugin can declare channels this
/// runtime does not know; those are skipped at registration.
pub trait HookProvider: Send + Sync {
    fn hooks(&self) -> Vec<(String, Arc<dyn HookHandler>)>;
}

/// Which capability slots a behavior handle fills.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub init: bool,
    pub execute: bool,
    pub enable: bool,
    pub cleanup: bool,
    pub hooks: bool,
}

impl Capabilities {
    /// Names of the filled slots, in a stable order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.init {
            names.push("init");
        }
        if self.execute {
            names.push("execute");
        }
        if self.enable {
            names.push("enable/disable");
        }
        if self.cleanup {
            names.push("cleanup");
        }
        if self.hooks {
            names.push("hooks");
        }
        names
    }
}

/// The loaded module's operations, resolved once at load time.
#[derive(Clone, Default)]
pub struct BehaviorHandle {
    init: Option<Arc<dyn Initializable>>,
    execute: Option<Arc<dyn Executable>>,
    toggle: Option<Arc<dyn Enableable>>,
    cleanup: Option<Arc<dyn CleanUp>>,
    hooks: Option<Arc<dyn HookProvider>>,
}

impl BehaviorHandle {
    /// An empty handle with no capabilities.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init<T: Initializable + 'static>(mut self, module: Arc<T>) -> Self {
        let slot: Arc<dyn Initializable> = module;
        self.init = Some(slot);
        self
    }

    pub fn with_execute<T: Executable + 'static>(mut self, module: Arc<T>) -> Self {
        let slot: Arc<dyn Executable> = module;
        self.execute = Some(slot);
        self
    }

    pub fn with_toggle<T: Enableable + 'static>(mut self, module: Arc<T>) -> Self {
        let slot: Arc<dyn Enableable> = module;
        self.toggle = Some(slot);
        self
    }

    pub fn with_cleanup<T: CleanUp + 'static>(mut self, module: Arc<T>) -> Self {
        let slot: Arc<dyn CleanUp> = module;
        self.cleanup = Some(slot);
        self
    }

    pub fn with_hooks<T: HookProvider + 'static>(mut self, module: Arc<T>) -> Self {
        let slot: Arc<dyn HookProvider> = module;
        self.hooks = Some(slot);
        self
    }

    pub fn initializer(&self) -> Option<&Arc<dyn Initializable>> {
        self.init.as_ref()
    }

    pub fn executor(&self) -> Option<&Arc<dyn Executable>> {
        self.execute.as_ref()
    }

    pub fn toggle(&self) -> Option<&Arc<dyn Enableable>> {
        self.toggle.as_ref()
    }

    pub fn cleaner(&self) -> Option<&Arc<dyn CleanUp>> {
        self.cleanup.as_ref()
    }

    pub fn hook_provider(&self) -> Option<&Arc<dyn HookProvider>> {
        self.hooks.as_ref()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            init: self.init.is_some(),
            execute: self.execute.is_some(),
            enable: self.toggle.is_some(),
            cleanup: self.cleanup.is_some(),
            hooks: self.hooks.is_some(),
        }
    }
}

impl fmt::Debug for BehaviorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BehaviorHandle")
            .field(&self.capabilities())
            .finish()
    }
}
