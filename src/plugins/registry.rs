//! Plugin registry for JDC
//!
//! This module provides the `PluginRegistry` struct that owns every loaded
//! `PluginRecord`. Names are unique; iteration follows load order so that
//! listings and shutdown are deterministic.

use std::collections::HashMap;

use tracing::info;

use crate::error::{JdcError, Result};

use super::types::{PluginRecord, PluginType};

/// Name-keyed store of loaded plugins.
///
/// # Example
///
/// ```rust
/// use jdc::plugins::{BehaviorHandle, PluginManifest, PluginRecord, PluginRegistry};
/// use std::path::PathBuf;
///
/// let manifest: PluginManifest = serde_json::from_str(
///     r#"{"name":"hello","version":"1.0","type":"command","description":"x"}"#,
/// ).unwrap();
/// let record = PluginRecord::new(
///     manifest,
///     PathBuf::from("/tmp/hello"),
///     PathBuf::from("/tmp/hello/index.json"),
///     BehaviorHandle::new(),
/// );
///
/// let mut registry = PluginRegistry::new();
/// registry.insert(record).unwrap();
/// assert_eq!(registry.len(), 1);
/// assert!(registry.contains("hello"));
/// ```
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, PluginRecord>,
    /// Names in load order.
    order: Vec<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record under its manifest name.
    ///
    /// # Errors
    /// `JdcError::PluginAlreadyLoaded` if the name is taken; the existing
    /// record is left untouched.
    pub fn insert(&mut self, record: PluginRecord) -> Result<()> {
        let name = record.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(JdcError::PluginAlreadyLoaded(name));
        }

        info!(
            plugin = %name,
            plugin_type = %record.plugin_type(),
            status = %record.status,
            "Registered plugin"
        );

        self.order.push(name.clone());
        self.plugins.insert(name, record);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PluginRecord> {
        self.plugins.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PluginRecord> {
        self.plugins.get_mut(name)
    }

    /// Remove and return a record.
    pub fn remove(&mut self, name: &str) -> Option<PluginRecord> {
        let record = self.plugins.remove(name)?;
        self.order.retain(|n| n != name);
        Some(record)
    }

    /// All records in load order.
    pub fn list(&self) -> Vec<&PluginRecord> {
        self.order
            .iter()
            .filter_map(|name| self.plugins.get(name))
            .collect()
    }

    /// Names in load order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Records of one declared type, in load order.
    pub fn by_type(&self, plugin_type: PluginType) -> Vec<&PluginRecord> {
        self.list()
            .into_iter()
            .filter(|r| r.plugin_type() == plugin_type)
            .collect()
    }

    /// Case-insensitive substring match on name, description and author.
    pub fn search(&self, query: &str) -> Vec<&PluginRecord> {
        let needle = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|r| {
                let m = &r.manifest;
                m.name.to_lowercase().contains(&needle)
                    || m.description.to_lowercase().contains(&needle)
                    || m
                        .author
                        .as_deref()
                        .is_some_and(|a| a.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Remove every record, returning them in load order.
    pub fn drain(&mut self) -> Vec<PluginRecord> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|name| self.plugins.remove(&name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::behavior::BehaviorHandle;
    use crate::plugins::types::PluginManifest;
    use std::path::PathBuf;

    fn make_record(name: &str, plugin_type: &str, author: Option<&str>) -> PluginRecord {
        let mut manifest: PluginManifest = serde_json::from_value(serde_json::json!({
            "name": name,
            "version": "1.0.0",
            "type": plugin_type,
            "description": format!("Plugin {}", name),
        }))
        .unwrap();
        manifest.author = author.map(str::to_string);

        PluginRecord::new(
            manifest,
            PathBuf::from(format!("/tmp/{}", name)),
            PathBuf::from(format!("/tmp/{}/index.json", name)),
            BehaviorHandle::new(),
        )
    }

    #[test]
    fn test_registry_new_is_empty() {
        let registry = PluginRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_insert_and_get() {
        let mut registry = PluginRegistry::new();
        registry
            .insert(make_record("hello", "command", None))
            .unwrap();

        let found = registry.get("hello").unwrap();
        assert_eq!(found.name(), "hello");
        assert_eq!(found.plugin_type(), PluginType::Command);
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected_and_original_kept() {
        let mut registry = PluginRegistry::new();
        registry.insert(make_record("dup", "command", None)).unwrap();

        let err = registry.insert(make_record("dup", "step", None)).unwrap_err();
        assert!(matches!(err, JdcError::PluginAlreadyLoaded(ref n) if n == "dup"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("dup").unwrap().plugin_type(), PluginType::Command);
    }

    #[test]
    fn test_list_preserves_load_order() {
        let mut registry = PluginRegistry::new();
        for name in ["gamma", "alpha", "beta"] {
            registry.insert(make_record(name, "custom", None)).unwrap();
        }
        assert_eq!(registry.names(), vec!["gamma", "alpha", "beta"]);

        registry.remove("alpha").unwrap();
        let names: Vec<&str> = registry.list().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["gamma", "beta"]);
    }

    #[test]
    fn test_remove_missing_returns_none() {
        let mut registry = PluginRegistry::new();
        registry.insert(make_record("a", "hook", None)).unwrap();
        assert!(registry.remove("b").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_by_type() {
        let mut registry = PluginRegistry::new();
        registry.insert(make_record("c1", "command", None)).unwrap();
        registry.insert(make_record("h1", "hook", None)).unwrap();
        registry.insert(make_record("c2", "command", None)).unwrap();

        let commands: Vec<&str> = registry
            .by_type(PluginType::Command)
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(commands, vec!["c1", "c2"]);
        assert!(registry.by_type(PluginType::Agent).is_empty());
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let mut registry = PluginRegistry::new();
        registry
            .insert(make_record("Logger", "hook", Some("Ops Team")))
            .unwrap();
        registry
            .insert(make_record("hello", "command", None))
            .unwrap();

        assert_eq!(registry.search("logger").len(), 1);
        assert_eq!(registry.search("ops").len(), 1);
        // Descriptions are "Plugin <name>".
        assert_eq!(registry.search("PLUGIN").len(), 2);
        assert!(registry.search("zzz").is_empty());
    }

    #[test]
    fn test_drain_returns_load_order() {
        let mut registry = PluginRegistry::new();
        registry.insert(make_record("b", "custom", None)).unwrap();
        registry.insert(make_record("a", "custom", None)).unwrap();

        let drained: Vec<String> = registry
            .drain()
            .into_iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(drained, vec!["b", "a"]);
        assert!(registry.is_empty());
    }
}
