/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Server modules compiled into the binary.
//!
//! | Entry path              | Module                    |
//! |-------------------------|---------------------------|
//! | `builtin/clock/server`  | [`clock`] – wall clock    |

pub mod clock;

use crate::definition::ModuleDefinition;
use crate::loader::ModuleRegistry;

/// Register every built-in entry point.
pub fn register(registry: &mut ModuleRegistry) {
    registry.register(clock::ENTRY, clock::load);
}

/// Registry holding only the built-in entry points.
pub fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    register(&mut registry);
    registry
}

/// Definitions for the built-ins, used when no catalog is configured.
pub fn definitions() -> Vec<ModuleDefinition> {
    vec![ModuleDefinition::new("clock", "builtin/clock")
        .with_server("server")
        .with_client("clock.js")
        .with_credit(serde_json::json!({ "author": "Wall team" }))]
}
