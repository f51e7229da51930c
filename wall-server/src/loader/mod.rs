/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Two-phase loader for module server code.
//!
//! Server entry points are registered ahead of time in a
//! [`ModuleRegistry`], keyed by the path a [`ModuleDefinition`] resolves
//! to (`root/server_path`).  Loading an entry point calls its load function
//! with a [`ModuleContext`]; the function returns the [`ServerExports`] it
//! provides, which are then checked against the server contract.
//!
//! ```text
//!                ┌──────────── validate (inert context) ───────────┐
//!  definition ──►│ resolve ─► load fn ─► conform ─► valid / invalid │
//!                └─────────────────────────────────────────────────┘
//!                ┌──────────── activate (live context) ──────────────────────┐
//!  definition ──►│ resolve ─► load fn ─► conform ─► construct(config, deadline)│──► Box<dyn ServerModule>
//!                └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Both the load function and the constructor run under `catch_unwind`, so
//! a panicking module is reported as a [`LoadError::Panicked`] instead of
//! tearing down the caller.

pub mod conform;
pub mod context;
pub mod error;

pub use conform::{conform, MemberSignature, SERVER_CONTRACT};
pub use context::{LoadPhase, ModuleAssert, ModuleContext, ModuleLog, MODULE_LOG_TARGET};
pub use error::{ConformanceError, LoadError, Violation};

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, info};

use crate::definition::{ModuleConfig, ModuleDefinition};
use crate::geometry::WallGeometry;
use crate::resources::LiveHandles;
use crate::server::{ModuleError, ServerModule};
use crate::time::Deadline;

// ── Exports ───────────────────────────────────────────────────────────────────

/// Entry point of a module's server code.
pub type LoadFn = fn(&ModuleContext) -> Result<ServerExports, ModuleError>;

/// Builds the server instance from the module's config and the run's
/// deadline.
pub type Constructor =
    Box<dyn FnOnce(&ModuleConfig, Deadline) -> Result<Box<dyn ServerModule>, ModuleError> + Send>;

/// What an entry point hands back when it is loaded.
pub struct ServerExports {
    constructor: Option<Constructor>,
    members: Vec<MemberSignature>,
}

impl ServerExports {
    /// Exports declaring `constructor` and the full server contract.
    ///
    /// Every [`ServerModule`] implementation satisfies the contract, so
    /// this is what entry points written in Rust normally return.
    pub fn new<F>(constructor: F) -> Self
    where
        F: FnOnce(&ModuleConfig, Deadline) -> Result<Box<dyn ServerModule>, ModuleError>
            + Send
            + 'static,
    {
        Self {
            constructor: Some(Box::new(constructor)),
            members: SERVER_CONTRACT.to_vec(),
        }
    }

    /// Exports with nothing declared.
    pub fn bare() -> Self {
        Self {
            constructor: None,
            members: Vec::new(),
        }
    }

    pub fn with_constructor<F>(mut self, constructor: F) -> Self
    where
        F: FnOnce(&ModuleConfig, Deadline) -> Result<Box<dyn ServerModule>, ModuleError>
            + Send
            + 'static,
    {
        self.constructor = Some(Box::new(constructor));
        self
    }

    /// Declare `signature`, replacing any earlier member with the same name.
    pub fn with_member(mut self, signature: MemberSignature) -> Self {
        self.members.retain(|m| m.name != signature.name);
        self.members.push(signature);
        self
    }

    /// Remove a declared member.
    pub fn without_member(mut self, name: &str) -> Self {
        self.members.retain(|m| m.name != name);
        self
    }

    pub fn member(&self, name: &str) -> Option<&MemberSignature> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn members(&self) -> &[MemberSignature] {
        &self.members
    }

    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    fn into_constructor(self) -> Option<Constructor> {
        self.constructor
    }
}

impl fmt::Debug for ServerExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerExports")
            .field("constructor", &self.constructor.is_some())
            .field("members", &self.members)
            .finish()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Table of server entry points by path.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    entries: HashMap<PathBuf, LoadFn>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `load` at `path`.  Returns the entry it replaced, if any.
    pub fn register(&mut self, path: impl AsRef<Path>, load: LoadFn) -> Option<LoadFn> {
        self.entries.insert(normalize(path.as_ref()), load)
    }

    pub fn resolve(&self, path: &Path) -> Option<LoadFn> {
        self.entries.get(&normalize(path)).copied()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries.contains_key(&normalize(path.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<_> = self.entries.keys().collect();
        paths.sort();
        f.debug_struct("ModuleRegistry").field("entries", &paths).finish()
    }
}

/// Drops `.` components so `./a/b` and `a/b` resolve alike.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

// ── Loader ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ModuleLoader {
    registry: ModuleRegistry,
}

impl ModuleLoader {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Resolve the definition's server entry, load it with `ctx` and check
    /// the result against the server contract.
    pub fn load(
        &self,
        def: &ModuleDefinition,
        ctx: &ModuleContext,
    ) -> Result<ServerExports, LoadError> {
        let path = def.server_entry().ok_or_else(|| LoadError::NoServerEntry {
            module: def.name.clone(),
        })?;
        let load = self
            .registry
            .resolve(&path)
            .ok_or_else(|| LoadError::EntryPointNotFound {
                module: def.name.clone(),
                path: path.clone(),
            })?;

        let exports = match catch_unwind(AssertUnwindSafe(|| load(ctx))) {
            Ok(Ok(exports)) => exports,
            Ok(Err(source)) => {
                return Err(LoadError::LoadFailed {
                    module: def.name.clone(),
                    path,
                    source,
                })
            }
            Err(_) => {
                return Err(LoadError::Panicked {
                    module: def.name.clone(),
                    stage: "load",
                })
            }
        };

        conform(&exports).map_err(|source| LoadError::Conformance {
            module: def.name.clone(),
            source,
        })?;
        debug!(module = %def.name, path = %path.display(), phase = ?ctx.phase, "entry point loaded");
        Ok(exports)
    }

    /// Dry run: load the entry point with inert capabilities.
    ///
    /// Never fails; problems are logged and reported as `false`.  A
    /// definition without server code is trivially valid.
    pub fn validate(&self, def: &ModuleDefinition, wall_geometry: WallGeometry) -> bool {
        if def.server_path.is_none() {
            return true;
        }
        let ctx = ModuleContext::inert(&def.name, wall_geometry);
        match self.load(def, &ctx) {
            Ok(_) => {
                info!(module = %def.name, "server entry verified");
                true
            }
            Err(e) => {
                error!(module = %def.name, error = %e, "module failed validation");
                false
            }
        }
    }

    /// Load the entry point with the run's live handles and construct the
    /// server instance.
    pub fn activate(
        &self,
        def: &ModuleDefinition,
        deadline: Deadline,
        wall_geometry: WallGeometry,
        handles: LiveHandles,
    ) -> Result<Box<dyn ServerModule>, LoadError> {
        let ctx = ModuleContext::live(&def.name, wall_geometry, handles);
        let exports = self.load(def, &ctx)?;
        let constructor = exports
            .into_constructor()
            .ok_or_else(|| LoadError::Conformance {
                module: def.name.clone(),
                source: ConformanceError(vec![Violation::MissingConstructor]),
            })?;

        let config = def.config.clone().unwrap_or(ModuleConfig::Null);
        match catch_unwind(AssertUnwindSafe(move || constructor(&config, deadline))) {
            Ok(Ok(instance)) => {
                info!(module = %def.name, %deadline, "server instance constructed");
                Ok(instance)
            }
            Ok(Err(source)) => Err(LoadError::ConstructFailed {
                module: def.name.clone(),
                source,
            }),
            Err(_) => Err(LoadError::Panicked {
                module: def.name.clone(),
                stage: "constructor",
            }),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
