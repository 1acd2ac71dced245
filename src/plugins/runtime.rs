//! Plugin runtime for JDC
//!
//! `PluginRuntime` owns the registry and the hook bus and drives every
//! plugin through its lifecycle:
//!
//! ```text
//! unloaded -> loaded(enabled) <-> loaded(disabled) -> unloaded
//!          \-> error (kept in failures() until a later load succeeds)
//! ```
//!
//! Typed execution wraps each plugin call in `before-<kind>`, then
//! `after-<kind>` + `on-success`, or `on-error`. Hook failures are logged by
//! the bus; the plugin's own error always reaches the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use jdc::config::Config;
//! use jdc::plugins::PluginRuntime;
//!
//! # tokio_test::block_on(async {
//! let config = Config::load().unwrap();
//! let root = config.plugins_path();
//! let mut runtime = PluginRuntime::with_catalog(config);
//! runtime.load_all(&root).unwrap();
//!
//! let output = runtime
//!     .execute_command("hello-world", vec!["World".into()])
//!     .await
//!     .unwrap();
//! println!("{}", output.message().unwrap_or_default());
//! # });
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{JdcError, Result};
use crate::hooks::{ExecutionContext, HookBus, HookChannel};

use super::behavior::BehaviorHandle;
use super::catalog::ModuleCatalog;
use super::loader::{self, ModuleLoader};
use super::registry::PluginRegistry;
use super::types::{
    LoadFailure, LoadReport, Payload, PluginInfo, PluginKind, PluginManifest, PluginOutput,
    PluginRecord, PluginStatus, PluginSummary, PluginType,
};

/// Registry, hook bus and module loader behind one explicit handle.
pub struct PluginRuntime {
    config: Config,
    loader: Arc<dyn ModuleLoader>,
    registry: PluginRegistry,
    hooks: HookBus,
    failures: Vec<LoadFailure>,
}

impl PluginRuntime {
    pub fn new(config: Config, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            config,
            loader,
            registry: PluginRegistry::new(),
            hooks: HookBus::new(),
            failures: Vec::new(),
        }
    }

    /// A runtime backed by the built-in module catalog.
    pub fn with_catalog(config: Config) -> Self {
        Self::new(config, Arc::new(ModuleCatalog::builtin()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn hooks(&self) -> &HookBus {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookBus {
        &mut self.hooks
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load every immediate subdirectory of `root` as a plugin.
    ///
    /// A plugin that fails to load is logged and skipped. A missing `root`
    /// is created and yields an empty report.
    pub fn load_all(&mut self, root: &Path) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        if !root.exists() {
            fs::create_dir_all(root)?;
            debug!(root = %root.display(), "Created plugins directory");
            return Ok(report);
        }

        for dir in loader::plugin_dirs(root)? {
            match self.load(&dir) {
                Ok(name) => report.loaded.push(name),
                Err(e) => {
                    warn!(
                        path = %dir.display(),
                        error = %e,
                        "Failed to load plugin, skipping"
                    );
                    if let Some(failure) = self.failures.iter().find(|f| f.path == dir) {
                        report.failed.push(failure.clone());
                    }
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Plugins loaded"
        );
        Ok(report)
    }

    /// Load one plugin directory and register it. Returns the plugin name.
    pub fn load(&mut self, dir: &Path) -> Result<String> {
        let manifest = match loader::read_manifest(dir) {
            Ok(manifest) => manifest,
            Err(e) => return Err(self.record_failure(dir, None, e)),
        };

        let name = manifest.name.clone();
        match self.install(dir, manifest) {
            Ok(()) => {
                self.failures.retain(|f| f.path != dir);
                Ok(name)
            }
            Err(e) => Err(self.record_failure(dir, Some(name), e)),
        }
    }

    fn install(&mut self, dir: &Path, manifest: PluginManifest) -> Result<()> {
        let entry = loader::resolve_entry(dir, &manifest)?;

        if self.registry.contains(&manifest.name) {
            return Err(JdcError::PluginAlreadyLoaded(manifest.name));
        }

        let behavior = match self.loader.load(&manifest, &entry) {
            Ok(behavior) => behavior,
            Err(e) => {
                self.loader.release(&entry);
                return Err(e);
            }
        };

        if let Some(init) = behavior.initializer() {
            if let Err(e) = init.init(&self.config) {
                self.loader.release(&entry);
                return Err(JdcError::ModuleLoad {
                    plugin: manifest.name.clone(),
                    message: format!("init failed: {}", e),
                });
            }
        }

        if manifest.plugin_type == PluginType::Hook {
            self.register_hooks(&manifest.name, &behavior);
        }

        let record = PluginRecord::new(manifest, dir.to_path_buf(), entry, behavior);
        if !record.enabled {
            self.hooks.set_plugin_active(record.name(), false);
        }

        info!(
            plugin = %record.name(),
            plugin_type = %record.plugin_type(),
            status = %record.status,
            "Plugin loaded"
        );
        self.registry.insert(record)
    }

    fn register_hooks(&mut self, plugin: &str, behavior: &BehaviorHandle) {
        let Some(provider) = behavior.hook_provider() else {
            warn!(plugin = plugin, "Hook plugin exposes no hook table");
            return;
        };

        let mut registered = 0;
        for (channel, handler) in provider.hooks() {
            if self.hooks.register(&channel, plugin, handler) {
                registered += 1;
            }
        }
        debug!(plugin = plugin, hooks = registered, "Hooks registered");
    }

    fn record_failure(&mut self, dir: &Path, plugin: Option<String>, error: JdcError) -> JdcError {
        self.failures.retain(|f| f.path != dir);
        self.failures.push(LoadFailure {
            path: dir.to_path_buf(),
            plugin,
            status: PluginStatus::Error,
            error: error.to_string(),
        });
        error
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Option<&PluginRecord> {
        self.registry.get(name)
    }

    /// Summaries of every loaded plugin, in load order.
    pub fn list(&self) -> Vec<PluginSummary> {
        self.registry.list().iter().map(|r| r.summary()).collect()
    }

    pub fn by_type(&self, plugin_type: PluginType) -> Vec<PluginSummary> {
        self.registry
            .by_type(plugin_type)
            .iter()
            .map(|r| r.summary())
            .collect()
    }

    pub fn search(&self, query: &str) -> Vec<PluginSummary> {
        self.registry
            .search(query)
            .iter()
            .map(|r| r.summary())
            .collect()
    }

    pub fn info(&self, name: &str) -> Result<PluginInfo> {
        self.registry
            .get(name)
            .map(PluginRecord::info)
            .ok_or_else(|| JdcError::PluginNotFound(name.to_string()))
    }

    /// Directories that failed to load, with their errors.
    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn enable(&mut self, name: &str) -> Result<()> {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> Result<()> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let record = self
            .registry
            .get_mut(name)
            .ok_or_else(|| JdcError::PluginNotFound(name.to_string()))?;

        record.enabled = enabled;
        record.status = if enabled {
            PluginStatus::Enabled
        } else {
            PluginStatus::Disabled
        };

        if let Some(toggle) = record.behavior.toggle() {
            let outcome = if enabled {
                toggle.enable()
            } else {
                toggle.disable()
            };
            if let Err(e) = outcome {
                warn!(plugin = name, enabled, error = %e, "Plugin toggle callback failed");
                record.last_error = Some(e.to_string());
            }
        }

        self.hooks.set_plugin_active(name, enabled);
        info!(plugin = name, enabled, "Plugin state changed");
        Ok(())
    }

    /// Run the plugin's cleanup, drop its hooks and forget it.
    pub fn unload(&mut self, name: &str) -> Result<()> {
        let record = self
            .registry
            .remove(name)
            .ok_or_else(|| JdcError::PluginNotFound(name.to_string()))?;

        self.retire(&record);
        info!(plugin = name, "Plugin unloaded");
        Ok(())
    }

    /// Unload and load again from the same directory.
    ///
    /// If the second load fails the plugin stays absent and the load error
    /// is returned.
    pub fn reload(&mut self, name: &str) -> Result<String> {
        let dir = self
            .registry
            .get(name)
            .map(|r| r.source_path.clone())
            .ok_or_else(|| JdcError::PluginNotFound(name.to_string()))?;

        self.unload(name)?;
        self.load(&dir)
    }

    /// Unload every plugin in load order and clear the hook bus.
    pub fn shutdown(&mut self) {
        let records = self.registry.drain();
        let count = records.len();
        for record in &records {
            self.retire(record);
        }
        self.hooks.clear();
        debug!(plugins = count, "Plugin runtime shut down");
    }

    fn retire(&mut self, record: &PluginRecord) {
        if let Some(cleaner) = record.behavior.cleaner() {
            if let Err(e) = cleaner.cleanup() {
                warn!(plugin = %record.name(), error = %e, "Plugin cleanup failed");
            }
        }
        self.hooks.remove_plugin(record.name());
        self.loader.release(&record.entry_path);
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Invoke a plugin of the given kind, with hook dispatch around it.
    pub async fn execute_typed(
        &self,
        kind: PluginKind,
        name: &str,
        payload: Payload,
    ) -> Result<PluginOutput> {
        let record = self
            .registry
            .get(name)
            .ok_or_else(|| JdcError::PluginNotFound(name.to_string()))?;

        if !record.enabled {
            return Err(JdcError::PluginDisabled(name.to_string()));
        }

        if record.plugin_type() != kind.plugin_type() {
            return Err(JdcError::TypeMismatch {
                plugin: name.to_string(),
                expected: kind.to_string(),
                actual: record.plugin_type().to_string(),
            });
        }

        if payload.kind() != kind {
            return Err(JdcError::TypeMismatch {
                plugin: name.to_string(),
                expected: format!("{} payload", kind),
                actual: format!("{} payload", payload.kind()),
            });
        }

        let executor = record
            .behavior
            .executor()
            .cloned()
            .ok_or_else(|| JdcError::MissingExecuteContract(name.to_string()))?;

        let mut ctx = ExecutionContext::new(name, kind, payload);
        self.hooks.dispatch(HookChannel::before(kind), &ctx).await;

        match executor.execute(&ctx.payload).await {
            Ok(output) => {
                ctx.result = Some(output.clone());
                self.hooks.dispatch(HookChannel::after(kind), &ctx).await;
                self.hooks.dispatch(HookChannel::OnSuccess, &ctx).await;
                Ok(output)
            }
            Err(e) => {
                ctx.error = Some(e.to_string());
                self.hooks.dispatch(HookChannel::OnError, &ctx).await;
                Err(e)
            }
        }
    }

    pub async fn execute_command(&self, name: &str, args: Vec<String>) -> Result<PluginOutput> {
        self.execute_typed(PluginKind::Command, name, Payload::Args(args))
            .await
    }

    pub async fn execute_step(&self, name: &str, context: Value) -> Result<PluginOutput> {
        self.execute_typed(PluginKind::Step, name, Payload::Context(context))
            .await
    }

    pub async fn execute_agent(&self, name: &str, task: &str) -> Result<PluginOutput> {
        self.execute_typed(PluginKind::Agent, name, Payload::Task(task.to_string()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{hook_fn, HookHandler};
    use crate::plugins::behavior::{CleanUp, Enableable, Executable, HookProvider, Initializable};
    use crate::plugins::loader::MockModuleLoader;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    type Log = Arc<Mutex<Vec<String>>>;

    fn new_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn write_plugin(root: &Path, dir: &str, manifest: Value) -> std::path::PathBuf {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("plugin.json"), manifest.to_string()).unwrap();
        fs::write(path.join("index.json"), "{}").unwrap();
        path
    }

    fn manifest(name: &str, plugin_type: &str) -> Value {
        json!({
            "name": name,
            "version": "1.0",
            "type": plugin_type,
            "description": "x"
        })
    }

    /// Test module recording every callback it receives.
    struct Probe {
        log: Log,
        fail_execute: bool,
        fail_init: bool,
    }

    impl Probe {
        fn new(log: &Log) -> Arc<Self> {
            Arc::new(Self {
                log: Arc::clone(log),
                fail_execute: false,
                fail_init: false,
            })
        }

        fn push(&self, entry: &str) {
            self.log.lock().unwrap().push(entry.to_string());
        }
    }

    impl Initializable for Probe {
        fn init(&self, config: &Config) -> Result<()> {
            self.push(&format!("init:{}", config.assistant.command));
            if self.fail_init {
                return Err(JdcError::execution("cannot init"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Executable for Probe {
        async fn execute(&self, payload: &Payload) -> Result<PluginOutput> {
            self.push("execute");
            if self.fail_execute {
                return Err(JdcError::execution("boom"));
            }
            let who = payload
                .as_args()
                .and_then(|a| a.first().cloned())
                .unwrap_or_else(|| "World".to_string());
            Ok(PluginOutput::ok().with("message", format!("Hello, {}!", who)))
        }
    }

    impl Enableable for Probe {
        fn enable(&self) -> Result<()> {
            self.push("enable");
            Ok(())
        }

        fn disable(&self) -> Result<()> {
            self.push("disable");
            Err(JdcError::execution("disable callback failed"))
        }
    }

    impl CleanUp for Probe {
        fn cleanup(&self) -> Result<()> {
            self.push("cleanup");
            Ok(())
        }
    }

    fn full_handle(probe: Arc<Probe>) -> BehaviorHandle {
        BehaviorHandle::new()
            .with_init(probe.clone())
            .with_execute(probe.clone())
            .with_toggle(probe.clone())
            .with_cleanup(probe)
    }

    struct Hooks(Vec<(String, Arc<dyn HookHandler>)>);

    impl HookProvider for Hooks {
        fn hooks(&self) -> Vec<(String, Arc<dyn HookHandler>)> {
            self.0.clone()
        }
    }

    fn recorder(log: &Log, label: &str) -> Arc<dyn HookHandler> {
        let log = Arc::clone(log);
        let label = label.to_string();
        hook_fn(move |_ctx| {
            let log = Arc::clone(&log);
            let label = label.clone();
            async move {
                log.lock().unwrap().push(label);
                Ok(())
            }
        })
    }

    fn hook_handle(log: &Log, channels: &[&str]) -> BehaviorHandle {
        let table = channels
            .iter()
            .map(|c| (c.to_string(), recorder(log, c)))
            .collect();
        BehaviorHandle::new().with_hooks(Arc::new(Hooks(table)))
    }

    /// Loader that hands out a fresh handle per manifest name.
    fn loader_for(log: &Log) -> MockModuleLoader {
        let log = Arc::clone(log);
        let mut loader = MockModuleLoader::new();
        loader.expect_load().returning(move |manifest, _entry| {
            Ok(match manifest.plugin_type {
                PluginType::Hook => hook_handle(
                    &log,
                    &["before-command", "after-command", "on-success", "on-error"],
                ),
                _ => full_handle(Probe::new(&log)),
            })
        });
        loader.expect_release().returning(|_| ());
        loader
    }

    fn runtime(loader: MockModuleLoader) -> PluginRuntime {
        PluginRuntime::new(Config::default(), Arc::new(loader))
    }

    // ---- loading ----

    #[test]
    fn test_load_registers_enabled_record_and_calls_init() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "hello", manifest("hello", "command"));
        let log = new_log();
        let mut rt = runtime(loader_for(&log));

        assert_eq!(rt.load(&dir).unwrap(), "hello");

        let record = rt.get("hello").unwrap();
        assert_eq!(record.status, PluginStatus::Enabled);
        assert!(record.enabled);
        assert_eq!(record.source_path, dir);
        assert_eq!(entries(&log), vec!["init:claude"]);
    }

    #[test]
    fn test_load_disabled_manifest() {
        let tmp = TempDir::new().unwrap();
        let mut m = manifest("quiet", "command");
        m["enabled"] = json!(false);
        let dir = write_plugin(tmp.path(), "quiet", m);
        let mut rt = runtime(loader_for(&new_log()));

        rt.load(&dir).unwrap();
        let record = rt.get("quiet").unwrap();
        assert_eq!(record.status, PluginStatus::Disabled);
        assert!(!record.enabled);
    }

    #[test]
    fn test_load_invalid_manifest_registers_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut m = manifest("broken", "command");
        m.as_object_mut().unwrap().remove("version");
        let dir = write_plugin(tmp.path(), "broken", m);

        let mut loader = MockModuleLoader::new();
        loader.expect_load().never();
        let mut rt = runtime(loader);

        let err = rt.load(&dir).unwrap_err();
        assert!(matches!(err, JdcError::ManifestInvalid(_)));
        assert!(rt.list().is_empty());
        assert_eq!(rt.failures().len(), 1);
        assert_eq!(rt.failures()[0].status, PluginStatus::Error);
        assert!(rt.failures()[0].plugin.is_none());
    }

    #[test]
    fn test_load_missing_entry() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "p", manifest("p", "command"));
        fs::remove_file(dir.join("index.json")).unwrap();
        let mut rt = runtime(MockModuleLoader::new());

        let err = rt.load(&dir).unwrap_err();
        assert!(matches!(err, JdcError::EntryMissing(_)));
        assert_eq!(rt.failures()[0].plugin.as_deref(), Some("p"));
    }

    #[test]
    fn test_load_module_error_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "bad", manifest("bad", "step"));

        let mut loader = MockModuleLoader::new();
        loader.expect_load().times(1).returning(|m, _| {
            Err(JdcError::ModuleLoad {
                plugin: m.name.clone(),
                message: "unknown module".into(),
            })
        });
        loader.expect_release().times(1).returning(|_| ());
        let mut rt = runtime(loader);

        let err = rt.load(&dir).unwrap_err();
        assert!(matches!(err, JdcError::ModuleLoad { .. }));
        assert!(rt.get("bad").is_none());
        assert!(rt.failures()[0].error.contains("unknown module"));
    }

    #[test]
    fn test_init_failure_releases_entry() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "p", manifest("p", "command"));
        let log = new_log();

        let mut loader = MockModuleLoader::new();
        let probe_log = Arc::clone(&log);
        loader.expect_load().returning(move |_, _| {
            let probe = Arc::new(Probe {
                log: Arc::clone(&probe_log),
                fail_execute: false,
                fail_init: true,
            });
            Ok(BehaviorHandle::new().with_init(probe))
        });
        loader.expect_release().times(1).returning(|_| ());
        let mut rt = runtime(loader);

        let err = rt.load(&dir).unwrap_err();
        assert!(err.to_string().contains("init failed"));
        assert!(rt.get("p").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let tmp = TempDir::new().unwrap();
        let a = write_plugin(tmp.path(), "a", manifest("same", "command"));
        let b = write_plugin(tmp.path(), "b", manifest("same", "agent"));
        let mut rt = runtime(loader_for(&new_log()));

        rt.load(&a).unwrap();
        let err = rt.load(&b).unwrap_err();
        assert!(matches!(err, JdcError::PluginAlreadyLoaded(_)));
        assert_eq!(rt.get("same").unwrap().plugin_type(), PluginType::Command);
    }

    #[test]
    fn test_load_all_isolates_failures() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "a-good", manifest("good", "command"));
        write_plugin(tmp.path(), "b-bad", json!({"name": "bad"}));
        fs::create_dir(tmp.path().join("c-empty")).unwrap();
        write_plugin(tmp.path(), "d-other", manifest("other", "agent"));
        let mut rt = runtime(loader_for(&new_log()));

        let report = rt.load_all(tmp.path()).unwrap();
        assert_eq!(report.loaded, vec!["good", "other"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(rt.list().len(), 2);
    }

    #[test]
    fn test_load_all_creates_missing_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("plugins");
        let mut rt = runtime(MockModuleLoader::new());

        let report = rt.load_all(&root).unwrap();
        assert!(report.loaded.is_empty());
        assert!(root.is_dir());
    }

    #[test]
    fn test_successful_load_clears_failure() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "p", json!({"name": "p"}));
        let mut rt = runtime(loader_for(&new_log()));

        assert!(rt.load(&dir).is_err());
        assert_eq!(rt.failures().len(), 1);

        fs::write(dir.join("plugin.json"), manifest("p", "command").to_string()).unwrap();
        rt.load(&dir).unwrap();
        assert!(rt.failures().is_empty());
    }

    #[test]
    fn test_hook_plugin_registers_known_channels_only() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "hooks", manifest("hooks", "hook"));
        let log = new_log();

        let mut loader = MockModuleLoader::new();
        let hook_log = Arc::clone(&log);
        loader
            .expect_load()
            .returning(move |_, _| Ok(hook_handle(&hook_log, &["before-step", "before-deploy"])));
        let mut rt = runtime(loader);

        rt.load(&dir).unwrap();
        assert_eq!(rt.hooks().len(), 1);
        assert_eq!(rt.hooks().subscribers(HookChannel::BeforeStep), vec!["hooks"]);
    }

    #[test]
    fn test_non_hook_plugin_hooks_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "c", manifest("c", "custom"));
        let log = new_log();

        let mut loader = MockModuleLoader::new();
        let hook_log = Arc::clone(&log);
        loader
            .expect_load()
            .returning(move |_, _| Ok(hook_handle(&hook_log, &["on-error"])));
        let mut rt = runtime(loader);

        rt.load(&dir).unwrap();
        assert!(rt.hooks().is_empty());
    }

    // ---- lifecycle ----

    #[test]
    fn test_enable_disable_flip_state_and_call_back() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "p", manifest("p", "command"));
        let log = new_log();
        let mut rt = runtime(loader_for(&log));
        rt.load(&dir).unwrap();

        // The disable callback fails; the transition still applies.
        rt.disable("p").unwrap();
        let record = rt.get("p").unwrap();
        assert!(!record.enabled);
        assert_eq!(record.status, PluginStatus::Disabled);
        assert!(record.last_error.as_deref().unwrap().contains("disable callback"));

        rt.enable("p").unwrap();
        assert_eq!(rt.get("p").unwrap().status, PluginStatus::Enabled);
        assert_eq!(entries(&log), vec!["init:claude", "disable", "enable"]);
    }

    #[test]
    fn test_lifecycle_on_unknown_name() {
        let mut rt = runtime(MockModuleLoader::new());
        assert!(matches!(rt.enable("nope"), Err(JdcError::PluginNotFound(_))));
        assert!(matches!(rt.disable("nope"), Err(JdcError::PluginNotFound(_))));
        assert!(matches!(rt.reload("nope"), Err(JdcError::PluginNotFound(_))));
        assert!(matches!(rt.info("nope"), Err(JdcError::PluginNotFound(_))));
    }

    #[test]
    fn test_unload_unknown_leaves_registry_unchanged() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "p", manifest("p", "command"));
        let mut rt = runtime(loader_for(&new_log()));
        rt.load(&dir).unwrap();

        let before = rt.list();
        assert!(matches!(rt.unload("ghost"), Err(JdcError::PluginNotFound(_))));
        assert_eq!(rt.list(), before);
    }

    #[test]
    fn test_unload_runs_cleanup_releases_and_drops_hooks() {
        let tmp = TempDir::new().unwrap();
        let cmd = write_plugin(tmp.path(), "a", manifest("cmd", "command"));
        let hooks = write_plugin(tmp.path(), "b", manifest("hooks", "hook"));
        let log = new_log();

        let mut loader = MockModuleLoader::new();
        let load_log = Arc::clone(&log);
        loader.expect_load().returning(move |m, _| {
            Ok(match m.plugin_type {
                PluginType::Hook => hook_handle(&load_log, &["on-success"]),
                _ => full_handle(Probe::new(&load_log)),
            })
        });
        loader
            .expect_release()
            .withf(|entry| entry.ends_with("a/index.json"))
            .times(1)
            .returning(|_| ());
        loader
            .expect_release()
            .withf(|entry| entry.ends_with("b/index.json"))
            .times(1)
            .returning(|_| ());
        let mut rt = runtime(loader);
        rt.load(&cmd).unwrap();
        rt.load(&hooks).unwrap();

        rt.unload("cmd").unwrap();
        assert!(entries(&log).contains(&"cleanup".to_string()));
        assert!(rt.get("cmd").is_none());

        rt.unload("hooks").unwrap();
        assert!(rt.hooks().is_empty());
    }

    #[test]
    fn test_reload_failure_leaves_plugin_absent() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "p", manifest("p", "command"));
        let log = new_log();

        let mut loader = MockModuleLoader::new();
        let load_log = Arc::clone(&log);
        let mut seq = mockall::Sequence::new();
        loader
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(full_handle(Probe::new(&load_log))));
        loader
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|m, _| {
                Err(JdcError::ModuleLoad {
                    plugin: m.name.clone(),
                    message: "entry changed".into(),
                })
            });
        loader.expect_release().returning(|_| ());
        let mut rt = runtime(loader);

        rt.load(&dir).unwrap();
        let err = rt.reload("p").unwrap_err();
        assert!(matches!(err, JdcError::ModuleLoad { .. }));
        assert!(rt.list().iter().all(|s| s.name != "p"));
        assert_eq!(rt.failures().len(), 1);
    }

    #[test]
    fn test_reload_picks_up_manifest_changes() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "p", manifest("p", "command"));
        let mut rt = runtime(loader_for(&new_log()));
        rt.load(&dir).unwrap();

        let mut m = manifest("p", "command");
        m["version"] = json!("2.0");
        fs::write(dir.join("plugin.json"), m.to_string()).unwrap();

        assert_eq!(rt.reload("p").unwrap(), "p");
        assert_eq!(rt.get("p").unwrap().manifest.version, "2.0");
    }

    #[test]
    fn test_shutdown_cleans_everything() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "a", manifest("a", "command"));
        write_plugin(tmp.path(), "b", manifest("b", "hook"));
        let log = new_log();
        let mut rt = runtime(loader_for(&log));
        rt.load_all(tmp.path()).unwrap();

        rt.shutdown();
        assert!(rt.list().is_empty());
        assert!(rt.hooks().is_empty());
        assert!(entries(&log).contains(&"cleanup".to_string()));
    }

    // ---- execution ----

    #[tokio::test]
    async fn test_execute_fires_hooks_in_order() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "a", manifest("hello", "command"));
        write_plugin(tmp.path(), "b", manifest("watch", "hook"));
        let log = new_log();
        let mut rt = runtime(loader_for(&log));
        rt.load_all(tmp.path()).unwrap();
        log.lock().unwrap().clear();

        let output = rt
            .execute_command("hello", vec!["World".into()])
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.message(), Some("Hello, World!"));
        assert_eq!(
            entries(&log),
            vec!["before-command", "execute", "after-command", "on-success"]
        );
    }

    #[tokio::test]
    async fn test_execute_disabled_never_fires_before() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "a", manifest("hello", "command"));
        write_plugin(tmp.path(), "b", manifest("watch", "hook"));
        let log = new_log();
        let mut rt = runtime(loader_for(&log));
        rt.load_all(tmp.path()).unwrap();
        rt.disable("hello").unwrap();
        log.lock().unwrap().clear();

        let err = rt.execute_command("hello", vec![]).await.unwrap_err();
        assert!(matches!(err, JdcError::PluginDisabled(_)));
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_execute_type_mismatch_skips_hooks_and_body() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "a", manifest("hello", "command"));
        write_plugin(tmp.path(), "b", manifest("watch", "hook"));
        let log = new_log();
        let mut rt = runtime(loader_for(&log));
        rt.load_all(tmp.path()).unwrap();
        log.lock().unwrap().clear();

        let err = rt.execute_agent("hello", "do it").await.unwrap_err();
        assert!(matches!(
            err,
            JdcError::TypeMismatch { ref expected, ref actual, .. }
                if expected == "agent" && actual == "command"
        ));

        let err = rt
            .execute_typed(PluginKind::Command, "hello", Payload::Task("x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, JdcError::TypeMismatch { .. }));
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_execute_unknown_and_missing_contract() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "s", manifest("s", "step"));

        let mut loader = MockModuleLoader::new();
        loader
            .expect_load()
            .returning(|_, _| Ok(BehaviorHandle::new()));
        let mut rt = runtime(loader);
        rt.load(&dir).unwrap();

        let err = rt.execute_step("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, JdcError::PluginNotFound(_)));

        let err = rt.execute_step("s", json!({})).await.unwrap_err();
        assert!(matches!(err, JdcError::MissingExecuteContract(_)));
    }

    #[tokio::test]
    async fn test_execute_error_propagates_past_failing_on_error_hook() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "p", manifest("p", "command"));
        let log = new_log();

        let mut loader = MockModuleLoader::new();
        let load_log = Arc::clone(&log);
        loader.expect_load().returning(move |_, _| {
            let probe = Arc::new(Probe {
                log: Arc::clone(&load_log),
                fail_execute: true,
                fail_init: false,
            });
            Ok(BehaviorHandle::new().with_execute(probe))
        });
        let mut rt = runtime(loader);
        rt.load(&dir).unwrap();

        rt.hooks_mut().subscribe(
            HookChannel::OnError,
            "angry",
            hook_fn(|_ctx| async { Err(JdcError::execution("handler exploded")) }),
        );
        rt.hooks_mut()
            .subscribe(HookChannel::OnError, "calm", recorder(&log, "on-error"));
        rt.hooks_mut()
            .subscribe(HookChannel::OnSuccess, "calm", recorder(&log, "on-success"));

        let err = rt.execute_command("p", vec![]).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(entries(&log), vec!["execute", "on-error"]);
    }

    #[tokio::test]
    async fn test_unsuccessful_result_takes_success_path() {
        struct Sad;

        #[async_trait]
        impl Executable for Sad {
            async fn execute(&self, _payload: &Payload) -> Result<PluginOutput> {
                Ok(PluginOutput::failed().with("response", "no"))
            }
        }

        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "sad", manifest("sad", "agent"));
        let mut loader = MockModuleLoader::new();
        loader
            .expect_load()
            .returning(|_, _| Ok(BehaviorHandle::new().with_execute(Arc::new(Sad))));
        let mut rt = runtime(loader);
        rt.load(&dir).unwrap();

        let log = new_log();
        rt.hooks_mut()
            .subscribe(HookChannel::AfterAgent, "w", recorder(&log, "after-agent"));
        rt.hooks_mut()
            .subscribe(HookChannel::OnSuccess, "w", recorder(&log, "on-success"));

        let output = rt.execute_agent("sad", "task").await.unwrap();
        assert!(!output.success);
        assert_eq!(output.response(), Some("no"));
        assert_eq!(entries(&log), vec!["after-agent", "on-success"]);
    }

    #[tokio::test]
    async fn test_disabled_hook_plugin_is_muted() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "a", manifest("hello", "command"));
        let mut m = manifest("watch", "hook");
        m["enabled"] = json!(false);
        write_plugin(tmp.path(), "b", m);
        let log = new_log();
        let mut rt = runtime(loader_for(&log));
        rt.load_all(tmp.path()).unwrap();
        log.lock().unwrap().clear();

        rt.execute_command("hello", vec![]).await.unwrap();
        assert_eq!(entries(&log), vec!["execute"]);

        rt.enable("watch").unwrap();
        log.lock().unwrap().clear();
        rt.execute_command("hello", vec![]).await.unwrap();
        assert_eq!(entries(&log).len(), 4);
    }

    #[test]
    fn test_info_reports_capabilities() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "p", manifest("p", "command"));
        let mut rt = runtime(loader_for(&new_log()));
        rt.load(&dir).unwrap();

        let info = rt.info("p").unwrap();
        assert_eq!(info.path, dir);
        assert!(info.capabilities.execute);
        assert!(info.capabilities.cleanup);
        assert!(!info.capabilities.hooks);
        assert_eq!(rt.search("P").len(), 1);
        assert_eq!(rt.by_type(PluginType::Command).len(), 1);
    }
}
