//! Hook bus for JDC plugin execution.
//!
//! Lifecycle events fire on a fixed set of channels:
//!
//! - `before-command` / `after-command`
//! - `before-step` / `after-step`
//! - `before-agent` / `after-agent`
//! - `on-error`: the plugin's execute failed
//! - `on-success`: the plugin's execute returned a result
//!
//! Each channel keeps its subscribers in registration order. Dispatch awaits
//! every handler before starting the next one, so a logger registered first
//! observes an event before a monitor registered later. A failing handler is
//! logged and skipped; dispatch never fails the caller.
//!
//! # Example
//!
//! ```rust
//! use jdc::hooks::{hook_fn, ExecutionContext, HookBus, HookChannel};
//! use jdc::plugins::{Payload, PluginKind};
//!
//! # tokio_test::block_on(async {
//! let mut bus = HookBus::new();
//! bus.subscribe(
//!     HookChannel::BeforeCommand,
//!     "audit",
//!     hook_fn(|ctx| async move {
//!         println!("running {}", ctx.plugin);
//!         Ok(())
//!     }),
//! );
//! let ctx = ExecutionContext::new("hello", PluginKind::Command, Payload::Args(vec![]));
//! let summary = bus.dispatch(HookChannel::BeforeCommand, &ctx).await;
//! assert_eq!(summary.invoked, 1);
//! # });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{JdcError, Result};
use crate::plugins::types::{Payload, PluginKind, PluginOutput};

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// The closed set of lifecycle channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookChannel {
    BeforeCommand,
    AfterCommand,
    BeforeStep,
    AfterStep,
    BeforeAgent,
    AfterAgent,
    OnError,
    OnSuccess,
}

impl HookChannel {
    pub const ALL: [HookChannel; 8] = [
        HookChannel::BeforeCommand,
        HookChannel::AfterCommand,
        HookChannel::BeforeStep,
        HookChannel::AfterStep,
        HookChannel::BeforeAgent,
        HookChannel::AfterAgent,
        HookChannel::OnError,
        HookChannel::OnSuccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookChannel::BeforeCommand => "before-command",
            HookChannel::AfterCommand => "after-command",
            HookChannel::BeforeStep => "before-step",
            HookChannel::AfterStep => "after-step",
            HookChannel::BeforeAgent => "before-agent",
            HookChannel::AfterAgent => "after-agent",
            HookChannel::OnError => "on-error",
            HookChannel::OnSuccess => "on-success",
        }
    }

    pub fn before(kind: PluginKind) -> Self {
        match kind {
            PluginKind::Command => HookChannel::BeforeCommand,
            PluginKind::Step => HookChannel::BeforeStep,
            PluginKind::Agent => HookChannel::BeforeAgent,
        }
    }

    pub fn after(kind: PluginKind) -> Self {
        match kind {
            PluginKind::Command => HookChannel::AfterCommand,
            PluginKind::Step => HookChannel::AfterStep,
            PluginKind::Agent => HookChannel::AfterAgent,
        }
    }
}

impl fmt::Display for HookChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookChannel {
    type Err = JdcError;

    fn from_str(s: &str) -> Result<Self> {
        HookChannel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| JdcError::Config(format!("Unknown hook channel: {}", s)))
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// What a hook handler sees about one invocation.
///
/// Built once per `execute_typed` call and passed by reference through the
/// before, after and error dispatches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionContext {
    pub plugin: String,
    pub kind: PluginKind,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PluginOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionContext {
    pub fn new(plugin: &str, kind: PluginKind, payload: Payload) -> Self {
        Self {
            plugin: plugin.to_string(),
            kind,
            payload,
            result: None,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// A subscriber callback.
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, ctx: &ExecutionContext) -> Result<()>;
}

/// Adapter turning an async closure into a [`HookHandler`].
pub struct FnHook<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> HookHandler for FnHook<F>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: &ExecutionContext) -> Result<()> {
        (self.f)(ctx.clone()).await
    }
}

/// Wrap an async closure as a shareable hook handler.
pub fn hook_fn<F, Fut>(f: F) -> Arc<dyn HookHandler>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHook { f })
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

struct Subscriber {
    plugin: String,
    handler: Arc<dyn HookHandler>,
    active: bool,
}

/// Counts from one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub invoked: usize,
    pub failed: usize,
}

/// Named lifecycle channels with ordered subscriber lists.
pub struct HookBus {
    channels: HashMap<HookChannel, Vec<Subscriber>>,
}

impl HookBus {
    /// Create a bus with every channel present and empty.
    pub fn new() -> Self {
        let channels = HookChannel::ALL
            .into_iter()
            .map(|c| (c, Vec::new()))
            .collect();
        Self { channels }
    }

    /// Register a handler by channel name.
    ///
    /// Unknown channel names are ignored with a warning so that one plugin
    /// declaring a bad channel does not block the others. Returns whether the
    /// handler was registered.
    pub fn register(&mut self, channel: &str, plugin: &str, handler: Arc<dyn HookHandler>) -> bool {
        match channel.parse::<HookChannel>() {
            Ok(channel) => {
                self.subscribe(channel, plugin, handler);
                true
            }
            Err(_) => {
                warn!(
                    plugin = plugin,
                    channel = channel,
                    "Ignoring hook for unknown channel"
                );
                false
            }
        }
    }

    /// Append a handler to a channel.
    pub fn subscribe(&mut self, channel: HookChannel, plugin: &str, handler: Arc<dyn HookHandler>) {
        debug!(plugin = plugin, channel = %channel, "Hook registered");
        self.channels.entry(channel).or_default().push(Subscriber {
            plugin: plugin.to_string(),
            handler,
            active: true,
        });
    }

    /// Invoke every active subscriber of `channel` in registration order.
    pub async fn dispatch(&self, channel: HookChannel, ctx: &ExecutionContext) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let Some(subscribers) = self.channels.get(&channel) else {
            return summary;
        };

        for sub in subscribers.iter().filter(|s| s.active) {
            summary.invoked += 1;
            if let Err(e) = sub.handler.handle(ctx).await {
                summary.failed += 1;
                let err = JdcError::HookHandlerFailed {
                    plugin: sub.plugin.clone(),
                    channel: channel.to_string(),
                    message: e.to_string(),
                };
                warn!(
                    plugin = %sub.plugin,
                    channel = %channel,
                    error = %err,
                    "Hook handler failed, continuing"
                );
            }
        }

        summary
    }

    /// Mute or unmute every subscriber owned by `plugin`, keeping positions.
    pub fn set_plugin_active(&mut self, plugin: &str, active: bool) {
        for subs in self.channels.values_mut() {
            for sub in subs.iter_mut().filter(|s| s.plugin == plugin) {
                sub.active = active;
            }
        }
    }

    /// Drop every subscriber owned by `plugin`. Returns how many were removed.
    pub fn remove_plugin(&mut self, plugin: &str) -> usize {
        let mut removed = 0;
        for subs in self.channels.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.plugin != plugin);
            removed += before - subs.len();
        }
        removed
    }

    /// Plugin names subscribed to `channel`, in dispatch order.
    pub fn subscribers(&self, channel: HookChannel) -> Vec<&str> {
        self.channels
            .get(&channel)
            .map(|subs| subs.iter().map(|s| s.plugin.as_str()).collect())
            .unwrap_or_default()
    }

    /// Total subscriber count across all channels.
    pub fn len(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        for subs in self.channels.values_mut() {
            subs.clear();
        }
    }
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new()
    }
}
