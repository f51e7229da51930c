/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Static asset routes for active modules.
//!
//! While a module is active its directory is served to clients under
//! `<asset prefix><name>/`.  The HTTP side lives elsewhere; this table is
//! what it consults.
//!
//! Each registration is owned by the run that made it and is removed by
//! its [`RouteId`].  Two runs of the same module overlap during a
//! transition; removing the outgoing run's route leaves the incoming
//! run's route in place.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Handle of one route registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId(u64);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route#{}", self.0)
    }
}

/// Registration surface for per-module asset routes.
pub trait RouteRegistry: Send + Sync {
    /// Serve `root` under `name` until `unregister_route` is called with
    /// the returned id.
    fn register_route(&self, name: &str, root: &Path) -> RouteId;

    /// No-op if `id` is not registered.
    fn unregister_route(&self, id: RouteId);
}

#[derive(Debug, Default)]
struct RouteTable {
    next_id: u64,
    /// Registrations per module name, oldest first.
    by_name: HashMap<String, Vec<(RouteId, PathBuf)>>,
}

/// In-memory route table.
#[derive(Debug, Clone, Default)]
pub struct AssetRoutes {
    table: Arc<Mutex<RouteTable>>,
}

impl AssetRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory served for `name`.  The newest registration wins.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.table
            .lock()
            .by_name
            .get(name)
            .and_then(|regs| regs.last())
            .map(|(_, root)| root.clone())
    }

    /// Number of module names with at least one route.
    pub fn len(&self) -> usize {
        self.table.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().by_name.is_empty()
    }
}

impl RouteRegistry for AssetRoutes {
    fn register_route(&self, name: &str, root: &Path) -> RouteId {
        let mut table = self.table.lock();
        let id = RouteId(table.next_id);
        table.next_id += 1;
        table
            .by_name
            .entry(name.to_string())
            .or_default()
            .push((id, root.to_path_buf()));
        debug!(module = name, root = %root.display(), %id, "asset route registered");
        id
    }

    fn unregister_route(&self, id: RouteId) {
        let mut table = self.table.lock();
        let owner = table.by_name.iter_mut().find_map(|(name, regs)| {
            let pos = regs.iter().position(|(rid, _)| *rid == id)?;
            regs.remove(pos);
            Some((name.clone(), regs.is_empty()))
        });
        if let Some((name, now_empty)) = owner {
            if now_empty {
                table.by_name.remove(&name);
            }
            debug!(module = %name, %id, "asset route removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_resolve_unregister() {
        let routes = AssetRoutes::new();
        let id = routes.register_route("clock", Path::new("modules/clock"));
        assert_eq!(routes.resolve("clock"), Some(PathBuf::from("modules/clock")));

        routes.unregister_route(id);
        routes.unregister_route(id);
        assert!(routes.resolve("clock").is_none());
        assert!(routes.is_empty());
    }

    #[test]
    fn overlapping_registrations_of_one_name_are_independent() {
        let routes = AssetRoutes::new();
        let outgoing = routes.register_route("clock", Path::new("modules/clock"));
        let incoming = routes.register_route("clock", Path::new("modules/clock-v2"));
        assert_ne!(outgoing, incoming);
        assert_eq!(routes.resolve("clock"), Some(PathBuf::from("modules/clock-v2")));

        routes.unregister_route(outgoing);
        assert_eq!(routes.resolve("clock"), Some(PathBuf::from("modules/clock-v2")));
        assert_eq!(routes.len(), 1);

        routes.unregister_route(incoming);
        assert!(routes.is_empty());
    }
}
