//! Module catalog: the default [`ModuleLoader`].
//!
//! A plugin's entry module is a small JSON bundle naming what to build:
//!
//! ```json
//! { "module": "hello-world", "settings": { "greeting": "Hello" } }
//! ```
//!
//! or a data-driven shell module:
//!
//! ```json
//! { "shell": { "command": "mvn -q test {{args}}", "timeout_secs": 600 } }
//! ```
//!
//! Compiled-in modules are registered by name as factories. Parsed bundles
//! are cached per entry path until [`ModuleLoader::release`] evicts them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{JdcError, Result};
use crate::modules::shell::{ShellModule, ShellSpec};

use super::behavior::BehaviorHandle;
use super::loader::ModuleLoader;
use super::types::PluginManifest;

/// Parsed entry bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryBundle {
    /// Name of a registered module factory.
    #[serde(default)]
    pub module: Option<String>,
    /// Module-specific settings handed to the factory.
    #[serde(default)]
    pub settings: Value,
    /// Inline shell module definition.
    #[serde(default)]
    pub shell: Option<ShellSpec>,
}

/// Everything a factory gets to build a module instance.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub manifest: PluginManifest,
    pub plugin_dir: PathBuf,
    pub entry_path: PathBuf,
    pub settings: Value,
}

impl ModuleContext {
    /// Deserialize the settings into a module's own settings type.
    /// Missing settings yield the type's defaults.
    pub fn settings_as<T>(&self) -> Result<T>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        if self.settings.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.settings.clone()).map_err(|e| JdcError::ModuleLoad {
            plugin: self.manifest.name.clone(),
            message: format!("invalid settings: {}", e),
        })
    }
}

/// Builds a behavior handle for one plugin instance.
pub type ModuleFactory = Arc<dyn Fn(&ModuleContext) -> Result<BehaviorHandle> + Send + Sync>;

/// Registry of compiled-in module factories plus the entry bundle cache.
pub struct ModuleCatalog {
    factories: HashMap<String, ModuleFactory>,
    cache: Mutex<HashMap<PathBuf, EntryBundle>>,
}

impl ModuleCatalog {
    /// A catalog with no registered modules. Shell bundles still load.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A catalog with every built-in module registered.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        crate::modules::register_builtin(&mut catalog);
        catalog
    }

    /// Register a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ModuleContext) -> Result<BehaviorHandle> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Registered module names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_cached(&self, entry: &Path) -> bool {
        self.lock_cache().contains_key(entry)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, EntryBundle>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bundle(&self, manifest: &PluginManifest, entry: &Path) -> Result<EntryBundle> {
        if let Some(bundle) = self.lock_cache().get(entry) {
            return Ok(bundle.clone());
        }

        let load_err = |message: String| JdcError::ModuleLoad {
            plugin: manifest.name.clone(),
            message,
        };

        let content = fs::read_to_string(entry)
            .map_err(|e| load_err(format!("cannot read {}: {}", entry.display(), e)))?;
        let bundle: EntryBundle = serde_json::from_str(&content)
            .map_err(|e| load_err(format!("cannot parse {}: {}", entry.display(), e)))?;

        debug!(plugin = %manifest.name, entry = %entry.display(), "Entry bundle parsed");
        self.lock_cache()
            .insert(entry.to_path_buf(), bundle.clone());
        Ok(bundle)
    }
}

impl Default for ModuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModuleLoader for ModuleCatalog {
    fn load(&self, manifest: &PluginManifest, entry: &Path) -> Result<BehaviorHandle> {
        let bundle = self.bundle(manifest, entry)?;
        let ctx = ModuleContext {
            manifest: manifest.clone(),
            plugin_dir: entry
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            entry_path: entry.to_path_buf(),
            settings: bundle.settings.clone(),
        };

        let built = match (bundle.module.as_deref(), bundle.shell) {
            (Some(_), Some(_)) => Err(JdcError::ModuleLoad {
                plugin: manifest.name.clone(),
                message: "entry declares both 'module' and 'shell'".to_string(),
            }),
            (None, Some(spec)) => ShellModule::handle(spec, &ctx),
            (Some(name), None) => {
                let factory = self.factories.get(name).ok_or_else(|| JdcError::ModuleLoad {
                    plugin: manifest.name.clone(),
                    message: format!("unknown module '{}'", name),
                })?;
                factory(&ctx)
            }
            (None, None) => Err(JdcError::ModuleLoad {
                plugin: manifest.name.clone(),
                message: "entry declares neither 'module' nor 'shell'".to_string(),
            }),
        };

        // Only bundles that produced a handle stay cached.
        if built.is_err() {
            self.release(entry);
        }
        built
    }

    fn release(&self, entry: &Path) {
        if self.lock_cache().remove(entry).is_some() {
            debug!(entry = %entry.display(), "Entry bundle released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::behavior::Initializable;
    use crate::config::Config;
    use tempfile::TempDir;

    struct Noop;

    impl Initializable for Noop {
        fn init(&self, _config: &Config) -> Result<()> {
            Ok(())
        }
    }

    fn manifest() -> PluginManifest {
        serde_json::from_str(r#"{"name":"p","version":"1","type":"custom","description":"d"}"#)
            .unwrap()
    }

    fn catalog_with_noop() -> ModuleCatalog {
        let mut catalog = ModuleCatalog::new();
        catalog.register("noop", |_ctx| {
            Ok(BehaviorHandle::new().with_init(Arc::new(Noop)))
        });
        catalog
    }

    #[test]
    fn test_builtin_catalog_names() {
        let catalog = ModuleCatalog::builtin();
        let names = catalog.names();
        for expected in [
            "custom-agent",
            "custom-step",
            "hello-world",
            "logger-hook",
            "performance-cli",
            "performance-monitor",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_load_registered_module() {
        let tmp = TempDir::new().unwrap();
        let entry = tmp.path().join("index.json");
        fs::write(&entry, r#"{"module": "noop"}"#).unwrap();

        let handle = catalog_with_noop().load(&manifest(), &entry).unwrap();
        assert!(handle.capabilities().init);
        assert!(!handle.capabilities().execute);
    }

    #[test]
    fn test_load_unknown_module() {
        let tmp = TempDir::new().unwrap();
        let entry = tmp.path().join("index.json");
        fs::write(&entry, r#"{"module": "nope"}"#).unwrap();

        let err = catalog_with_noop().load(&manifest(), &entry).unwrap_err();
        assert!(matches!(err, JdcError::ModuleLoad { .. }));
        assert!(err.to_string().contains("unknown module 'nope'"));
    }

    #[test]
    fn test_load_unparsable_entry() {
        let tmp = TempDir::new().unwrap();
        let entry = tmp.path().join("index.js");
        fs::write(&entry, "module.exports = {}").unwrap();

        let err = catalog_with_noop().load(&manifest(), &entry).unwrap_err();
        assert!(matches!(err, JdcError::ModuleLoad { .. }));
    }

    #[test]
    fn test_load_entry_without_module_or_shell() {
        let tmp = TempDir::new().unwrap();
        let entry = tmp.path().join("index.json");
        fs::write(&entry, r#"{"settings": {}}"#).unwrap();

        let err = catalog_with_noop().load(&manifest(), &entry).unwrap_err();
        assert!(err.to_string().contains("neither"));
    }

    #[test]
    fn test_cache_until_release() {
        let tmp = TempDir::new().unwrap();
        let entry = tmp.path().join("index.json");
        fs::write(&entry, r#"{"module": "noop"}"#).unwrap();
        let catalog = catalog_with_noop();

        catalog.load(&manifest(), &entry).unwrap();
        assert!(catalog.is_cached(&entry));

        // A cached bundle is served even after the file changes on disk.
        fs::write(&entry, r#"{"module": "nope"}"#).unwrap();
        assert!(catalog.load(&manifest(), &entry).is_ok());

        catalog.release(&entry);
        assert!(!catalog.is_cached(&entry));
        assert!(catalog.load(&manifest(), &entry).is_err());
    }

    #[test]
    fn test_failed_bundle_is_not_cached() {
        let tmp = TempDir::new().unwrap();
        let entry = tmp.path().join("index.json");
        fs::write(&entry, r#"{"module": "noop-typo"}"#).unwrap();
        let catalog = catalog_with_noop();

        assert!(catalog.load(&manifest(), &entry).is_err());
        assert!(!catalog.is_cached(&entry));

        fs::write(&entry, r#"{"module": "noop"}"#).unwrap();
        assert!(catalog.load(&manifest(), &entry).is_ok());
        assert!(catalog.is_cached(&entry));
    }

    #[test]
    fn test_settings_as_defaults_when_absent() {
        #[derive(Debug, Default, Deserialize, PartialEq)]
        #[serde(default)]
        struct S {
            level: String,
        }

        let ctx = ModuleContext {
            manifest: manifest(),
            plugin_dir: PathBuf::from("/p"),
            entry_path: PathBuf::from("/p/index.json"),
            settings: Value::Null,
        };
        assert_eq!(ctx.settings_as::<S>().unwrap(), S::default());

        let ctx = ModuleContext {
            settings: serde_json::json!({"level": "warn"}),
            ..ctx
        };
        assert_eq!(ctx.settings_as::<S>().unwrap().level, "warn");
    }
}
