//! Manifest loading for JDC plugins
//!
//! This module reads and validates a plugin directory's `plugin.json`,
//! resolves its entry module, and defines the [`ModuleLoader`] seam that
//! turns an entry module into a [`BehaviorHandle`].

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::error::Category;

use crate::error::{JdcError, Result};

use super::behavior::BehaviorHandle;
use super::types::PluginManifest;

/// Descriptor file every plugin directory must contain.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Turns a resolved entry module into the plugin's behavior.
///
/// Implementations may cache whatever they parse from the entry; `release`
/// is called on unload so the next `load` of the same entry re-reads it.
#[cfg_attr(test, mockall::automock)]
pub trait ModuleLoader: Send + Sync {
    fn load(&self, manifest: &PluginManifest, entry: &Path) -> Result<BehaviorHandle>;

    fn release(&self, _entry: &Path) {}
}

/// Read, parse and validate `<dir>/plugin.json`.
///
/// # Errors
/// - `JdcError::ManifestMissing` if `plugin.json` does not exist
/// - `JdcError::ManifestMalformed` if the file is not valid JSON
/// - `JdcError::ManifestInvalid` if a required field is missing or empty,
///   a field has the wrong JSON type, or `type` is not a known plugin type
pub fn read_manifest(dir: &Path) -> Result<PluginManifest> {
    let manifest_path = dir.join(MANIFEST_FILE);

    if !manifest_path.is_file() {
        return Err(JdcError::ManifestMissing(dir.to_path_buf()));
    }

    let content = fs::read_to_string(&manifest_path)?;

    let manifest: PluginManifest = serde_json::from_str(&content).map_err(|e| match e.classify() {
        Category::Data => JdcError::ManifestInvalid(format!(
            "{}: {}",
            manifest_path.display(),
            e
        )),
        Category::Io | Category::Syntax | Category::Eof => JdcError::ManifestMalformed {
            path: manifest_path.clone(),
            source: e,
        },
    })?;

    validate_manifest(&manifest)?;

    Ok(manifest)
}

/// Check that every required field carries a non-blank value.
///
/// `type` membership in the closed set is already enforced when the manifest
/// is deserialized.
pub fn validate_manifest(manifest: &PluginManifest) -> Result<()> {
    let required = [
        ("name", manifest.name.as_str()),
        ("version", manifest.version.as_str()),
        ("description", manifest.description.as_str()),
    ];

    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(JdcError::ManifestInvalid(format!(
                "Plugin manifest is missing required field: {}",
                field
            )));
        }
    }

    if let Some(main) = &manifest.main {
        if main.trim().is_empty() {
            return Err(JdcError::ManifestInvalid(format!(
                "Plugin '{}' declares an empty main entry",
                manifest.name
            )));
        }
    }

    Ok(())
}

/// Locate the entry module for a plugin.
///
/// `<dir>/<main>` is used when it exists. An extension-less entry (such as
/// the default `index`) also resolves to `<dir>/<main>.json`.
pub fn resolve_entry(dir: &Path, manifest: &PluginManifest) -> Result<PathBuf> {
    let entry = dir.join(manifest.entry());
    if entry.is_file() {
        return Ok(entry);
    }

    if entry.extension().is_none() {
        let with_json = entry.with_extension("json");
        if with_json.is_file() {
            return Ok(with_json);
        }
    }

    Err(JdcError::EntryMissing(entry))
}

/// Immediate subdirectories of `root`, sorted by name.
pub fn plugin_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}
