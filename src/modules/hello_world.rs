//! `hello-world`: the minimal command plugin.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::plugins::{
    BehaviorHandle, CleanUp, Enableable, Executable, Initializable, ModuleContext, Payload,
    PluginOutput,
};

pub const NAME: &str = "hello-world";

pub struct HelloWorld {
    plugin: String,
}

pub fn build(ctx: &ModuleContext) -> Result<BehaviorHandle> {
    let module = Arc::new(HelloWorld {
        plugin: ctx.manifest.name.clone(),
    });
    Ok(BehaviorHandle::new()
        .with_init(module.clone())
        .with_execute(module.clone())
        .with_toggle(module.clone())
        .with_cleanup(module))
}

/// `Hello, <args[0] or World>!`, upper-cased when `--uppercase` is passed.
pub fn greet(args: &[String]) -> String {
    let name = args
        .first()
        .filter(|a| !a.starts_with("--"))
        .map(String::as_str)
        .unwrap_or("World");
    let message = format!("Hello, {}!", name);
    if args.iter().any(|a| a == "--uppercase") {
        message.to_uppercase()
    } else {
        message
    }
}

impl Initializable for HelloWorld {
    fn init(&self, _config: &Config) -> Result<()> {
        info!(plugin = %self.plugin, "Plugin initialized");
        Ok(())
    }
}

#[async_trait]
impl Executable for HelloWorld {
    async fn execute(&self, payload: &Payload) -> Result<PluginOutput> {
        let message = greet(payload.as_args().unwrap_or_default());
        Ok(PluginOutput::ok().with("message", message))
    }
}

impl Enableable for HelloWorld {
    fn enable(&self) -> Result<()> {
        info!(plugin = %self.plugin, "Plugin enabled");
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        info!(plugin = %self.plugin, "Plugin disabled");
        Ok(())
    }
}

impl CleanUp for HelloWorld {
    fn cleanup(&self) -> Result<()> {
        info!(plugin = %self.plugin, "Plugin cleaned up");
        Ok(())
    }
}
