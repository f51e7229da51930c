/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The capability set visible to module server code.
//!
//! Module code reaches the outside world only through a [`ModuleContext`].
//! During validation the network, game and state capabilities are inert
//! placeholders, so loading an entry point for a dry run has no side
//! effects.  During activation they are the live handles of the run.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::geometry::WallGeometry;
use crate::resources::{
    InertGame, InertNetwork, InertState, LiveHandles, ModuleGame, ModuleNetwork, ModuleState,
};
use crate::server::ModuleError;

/// Tracing target for everything logged by module code.
pub const MODULE_LOG_TARGET: &str = "wall::module";

/// Which of the two load phases a context belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Validation,
    Activation,
}

/// Capabilities passed to a module's load function.
#[derive(Clone)]
pub struct ModuleContext {
    pub network: Arc<dyn ModuleNetwork>,
    pub game: Arc<dyn ModuleGame>,
    pub state: Arc<dyn ModuleState>,
    pub wall_geometry: WallGeometry,
    pub log: ModuleLog,
    pub assert: ModuleAssert,
    pub phase: LoadPhase,
}

impl ModuleContext {
    /// Context for the validation dry run.
    pub fn inert(module: &str, wall_geometry: WallGeometry) -> Self {
        Self {
            network: Arc::new(InertNetwork),
            game: Arc::new(InertGame),
            state: Arc::new(InertState),
            wall_geometry,
            log: ModuleLog::new(module),
            assert: ModuleAssert::new(module),
            phase: LoadPhase::Validation,
        }
    }

    /// Context for a real run, wired to that run's resources.
    pub fn live(module: &str, wall_geometry: WallGeometry, handles: LiveHandles) -> Self {
        Self {
            network: handles.network,
            game: handles.game,
            state: handles.state,
            wall_geometry,
            log: ModuleLog::new(module),
            assert: ModuleAssert::new(module),
            phase: LoadPhase::Activation,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.phase == LoadPhase::Validation
    }
}

// ── Logging ───────────────────────────────────────────────────────────────────

/// Logger named after the module.  Records carry a `module` field and the
/// [`MODULE_LOG_TARGET`] target.
#[derive(Debug, Clone)]
pub struct ModuleLog {
    module: Arc<str>,
}

impl ModuleLog {
    pub fn new(module: &str) -> Self {
        Self {
            module: Arc::from(module),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn debug(&self, msg: &str) {
        debug!(target: MODULE_LOG_TARGET, module = %self.module, "{msg}");
    }

    pub fn info(&self, msg: &str) {
        info!(target: MODULE_LOG_TARGET, module = %self.module, "{msg}");
    }

    pub fn warn(&self, msg: &str) {
        warn!(target: MODULE_LOG_TARGET, module = %self.module, "{msg}");
    }

    pub fn error(&self, msg: &str) {
        error!(target: MODULE_LOG_TARGET, module = %self.module, "{msg}");
    }
}

// ── Assertions ────────────────────────────────────────────────────────────────

/// Assertion helper.  A failed check is logged and returned as
/// [`ModuleError::Assertion`] so module code can propagate it with `?`.
#[derive(Debug, Clone)]
pub struct ModuleAssert {
    log: ModuleLog,
}

impl ModuleAssert {
    pub fn new(module: &str) -> Self {
        Self {
            log: ModuleLog::new(module),
        }
    }

    pub fn that(&self, condition: bool, msg: &str) -> Result<(), ModuleError> {
        if condition {
            return Ok(());
        }
        self.log.error(&format!("assertion failed: {msg}"));
        Err(ModuleError::Assertion(msg.to_string()))
    }
}
