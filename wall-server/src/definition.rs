/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Module definitions: the immutable description of one runnable module.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Name reserved for the built-in blank module.
pub const EMPTY_MODULE_NAME: &str = "_empty";

/// URL prefix under which module client assets are served.
pub const DEFAULT_MODULE_ASSET_PREFIX: &str = "/module/";

/// Opaque per-module configuration, handed unchanged to the server
/// constructor and to every client.
pub type ModuleConfig = serde_json::Value;

/// Description of a module as produced by the playlist / catalog layer.
///
/// `server_path` absent means the module has no server-side behaviour; it
/// is purely client-rendered (or blank).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub name: String,
    /// Directory holding the module's files.  Also the root of its static
    /// asset route while the module is active.
    pub root: PathBuf,
    #[serde(default)]
    pub server_path: Option<PathBuf>,
    #[serde(default)]
    pub client_path: Option<String>,
    #[serde(default)]
    pub config: Option<ModuleConfig>,
    #[serde(default)]
    pub credit: Option<serde_json::Value>,
}

impl ModuleDefinition {
    /// A definition with no server entry, config, or credit.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            server_path: None,
            client_path: None,
            config: None,
            credit: None,
        }
    }

    /// The built-in blank module.
    pub fn empty() -> Self {
        Self::new(EMPTY_MODULE_NAME, "")
    }

    pub fn with_server(mut self, server_path: impl Into<PathBuf>) -> Self {
        self.server_path = Some(server_path.into());
        self
    }

    pub fn with_client(mut self, client_path: impl Into<String>) -> Self {
        self.client_path = Some(client_path.into());
        self
    }

    pub fn with_config(mut self, config: ModuleConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_credit(mut self, credit: serde_json::Value) -> Self {
        self.credit = Some(credit);
        self
    }

    pub fn is_empty_module(&self) -> bool {
        self.name == EMPTY_MODULE_NAME
    }

    /// `root/server_path`, or `None` for modules without server code.
    pub fn server_entry(&self) -> Option<PathBuf> {
        self.server_path.as_deref().map(|p| self.root.join(p))
    }

    /// Path clients load the module's code from.
    ///
    /// Empty for the blank module and for definitions without a client
    /// entry; clients treat the empty path as "render nothing".
    pub fn client_load_path(&self, asset_prefix: &str) -> String {
        match &self.client_path {
            Some(client) if !self.is_empty_module() && !client.is_empty() => {
                join_url(&[asset_prefix, &self.name, client])
            }
            _ => String::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Joins URL segments with exactly one `/` between them.  The first
/// segment keeps its leading slash; an empty first segment yields a
/// rooted path.
fn join_url(segments: &[&str]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        let trimmed = if i == 0 {
            seg.trim_end_matches('/')
        } else {
            seg.trim_matches('/')
        };
        if trimmed.is_empty() {
            continue;
        }
        if i > 0 {
            out.push('/');
        }
        out.push_str(trimmed);
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
