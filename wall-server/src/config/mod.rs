/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wall configuration and module catalog.
//!
//! The expected YAML structure is:
//! ```yaml
//! module_asset_prefix: /module/
//! tick_interval_ms: 16
//! geometry:
//!   points:
//!     - { x: 0, y: 0 }
//!     - { x: 2, y: 0 }
//!     - { x: 2, y: 1 }
//!     - { x: 0, y: 1 }
//! modules:
//!   clock:
//!     root: builtin/clock
//!     server_path: server
//!     client_path: clock.js
//!     config:
//!       face: analog
//!     credit:
//!       author: "Wall team"
//! ```
//!
//! Every top-level key is optional.  Without `geometry` the wall is a
//! single 1x1 screen; without `modules` the built-in modules are offered.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::builtin;
use crate::definition::{ModuleDefinition, DEFAULT_MODULE_ASSET_PREFIX};
use crate::geometry::{Point, WallGeometry};

/// Frame interval used when the file does not set one (~60 fps).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 16;

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WallConfigFile {
    module_asset_prefix: Option<String>,
    tick_interval_ms: Option<u64>,
    geometry: Option<GeometryEntry>,
    #[serde(default)]
    modules: HashMap<String, ModuleEntry>,
}

#[derive(Debug, Deserialize)]
struct GeometryEntry {
    points: Vec<Point>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModuleEntry {
    /// Defaults to a directory named after the module.
    root: Option<PathBuf>,
    server_path: Option<PathBuf>,
    client_path: Option<String>,
    config: Option<serde_json::Value>,
    credit: Option<serde_json::Value>,
}

// ── ModuleCatalog ─────────────────────────────────────────────────────────────

/// Module definitions by name.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, ModuleDefinition>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the modules compiled into the binary.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for def in builtin::definitions() {
            catalog.insert(def);
        }
        catalog
    }

    /// Add `def`, replacing any definition with the same name.
    pub fn insert(&mut self, def: ModuleDefinition) -> Option<ModuleDefinition> {
        self.modules.insert(def.name.clone(), def)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleDefinition> {
        self.modules.get(name)
    }

    /// Module names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ModuleDefinition> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

// ── WallConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WallConfig {
    pub module_asset_prefix: String,
    pub tick_interval: Duration,
    pub geometry: WallGeometry,
    pub catalog: ModuleCatalog,
}

impl Default for WallConfig {
    /// 1x1 wall offering the built-in modules.
    fn default() -> Self {
        Self {
            module_asset_prefix: DEFAULT_MODULE_ASSET_PREFIX.to_string(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            geometry: WallGeometry::unit(),
            catalog: ModuleCatalog::builtin(),
        }
    }
}

impl WallConfig {
    /// Parse `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is
    /// structurally invalid, or a value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading wall configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty map.
        let file: WallConfigFile = if content.trim().is_empty() {
            WallConfigFile::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };

        let tick_interval_ms = file.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS);
        if tick_interval_ms == 0 {
            bail!("tick_interval_ms must be greater than zero");
        }

        let geometry = match file.geometry {
            Some(entry) if !entry.points.is_empty() => WallGeometry::new(entry.points),
            _ => {
                warn!("No wall geometry specified, assuming 1x1");
                WallGeometry::unit()
            }
        };

        let mut catalog = ModuleCatalog::new();
        for (name, entry) in file.modules {
            if name.is_empty() {
                bail!("module names must not be empty");
            }
            let root = entry.root.unwrap_or_else(|| PathBuf::from(&name));
            let def = ModuleDefinition {
                name: name.clone(),
                root,
                server_path: entry.server_path,
                client_path: entry.client_path,
                config: entry.config,
                credit: entry.credit,
            };
            debug!(
                module = %def.name,
                root = %def.root().display(),
                server = def.server_path.is_some(),
                "catalog entry"
            );
            catalog.insert(def);
        }

        if catalog.is_empty() {
            warn!("No modules found in configuration, offering built-in modules");
            catalog = ModuleCatalog::builtin();
        }

        let config = Self {
            module_asset_prefix: file
                .module_asset_prefix
                .unwrap_or_else(|| DEFAULT_MODULE_ASSET_PREFIX.to_string()),
            tick_interval: Duration::from_millis(tick_interval_ms),
            geometry,
            catalog,
        };

        info!(
            modules = config.catalog.len(),
            geometry = %config.geometry.fingerprint(),
            tick_interval_ms,
            "wall configuration loaded"
        );
        Ok(config)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
module_asset_prefix: /assets/
tick_interval_ms: 20
geometry:
  points:
    - { x: 0, y: 0 }
    - { x: 2, y: 0 }
    - { x: 2, y: 1 }
    - { x: 0, y: 1 }
modules:
  clock:
    root: builtin/clock
    server_path: server
    client_path: clock.js
    config:
      face: analog
    credit:
      author: "Wall team"
  slides:
    client_path: slides.js
"#;
        let f = yaml_tempfile(yaml);
        let cfg = WallConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.module_asset_prefix, "/assets/");
        assert_eq!(cfg.tick_interval, Duration::from_millis(20));
        assert_eq!(cfg.geometry.fingerprint().as_str(), "0,0,2,1");
        assert_eq!(cfg.catalog.names(), vec!["clock", "slides"]);

        let clock = cfg.catalog.get("clock").unwrap();
        assert_eq!(clock.server_entry(), Some(PathBuf::from("builtin/clock/server")));
        assert_eq!(clock.config, Some(json!({"face": "analog"})));
        assert_eq!(clock.credit, Some(json!({"author": "Wall team"})));
        assert_eq!(clock.client_load_path(&cfg.module_asset_prefix), "/assets/clock/clock.js");

        let slides = cfg.catalog.get("slides").unwrap();
        assert_eq!(slides.root(), Path::new("slides"));
        assert!(slides.server_path.is_none());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let f = yaml_tempfile("");
        let cfg = WallConfig::load_from_file(f.path()).unwrap();
        assert_eq!(cfg.module_asset_prefix, DEFAULT_MODULE_ASSET_PREFIX);
        assert_eq!(cfg.tick_interval, Duration::from_millis(DEFAULT_TICK_INTERVAL_MS));
        assert_eq!(cfg.geometry, WallGeometry::unit());
        assert_eq!(cfg.catalog.names(), vec!["clock"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = WallConfig::load_from_file(Path::new("/nonexistent/wall.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("Cannot open configuration file"));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let f = yaml_tempfile("modules: [not, a, map");
        assert!(WallConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let f = yaml_tempfile("modules:\n  clock:\n    serverpath: server\n");
        assert!(WallConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let err = WallConfig::from_yaml_str("tick_interval_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn default_config_offers_builtins() {
        let cfg = WallConfig::default();
        assert!(cfg.catalog.get("clock").is_some());
        assert!(cfg.catalog.get("nope").is_none());
    }
}
