/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-run isolated resources.
//!
//! Every instantiated module gets its own network, game, and state
//! managers, namespaced by an [`InstantiationId`].  The id combines the
//! wall-geometry fingerprint with the run's deadline, so two runs of the
//! same module definition never share a namespace.
//!
//! ```text
//!                      ┌─► NetworkProvider::for_module ─► NetworkManager ─open()─► ModuleNetwork
//! InstantiationId ─────┼─► GameProvider::for_module    ─► GameManager    ─handle()► ModuleGame
//!                      └─► StateProvider::for_module   ─► StateManager   ─open()─► ModuleState
//! ```
//!
//! Every `close` / `dispose` on the managers is idempotent on its own;
//! [`ModuleResources::release`] does not rely on ordering between them.

pub mod game;
pub mod network;
pub mod state;

pub use game::{GameManager, GameProvider, InertGame, LocalGameProvider, ModuleGame};
pub use network::{InertNetwork, LocalNetworkProvider, ModuleNetwork, NetworkManager, NetworkProvider};
pub use state::{InertState, LocalStateProvider, ModuleState, StateManager, StateProvider};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::geometry::GeometryFingerprint;
use crate::time::Deadline;

// ── InstantiationId ───────────────────────────────────────────────────────────

/// Composite key scoping one run's resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstantiationId {
    pub geometry: GeometryFingerprint,
    pub deadline: Deadline,
}

impl InstantiationId {
    pub fn new(geometry: GeometryFingerprint, deadline: Deadline) -> Self {
        Self { geometry, deadline }
    }
}

impl fmt::Display for InstantiationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.geometry, self.deadline)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Which of the three per-run resources an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Network,
    Game,
    State,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Network => "network",
            ResourceKind::Game => "game",
            ResourceKind::State => "state",
        })
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    /// Another live run already owns this namespace.
    #[error("{kind} namespace '{id}' is already in use")]
    NamespaceInUse {
        kind: ResourceKind,
        id: InstantiationId,
    },

    /// `open()` was called after the manager was closed.
    #[error("{kind} manager for '{id}' is closed")]
    Closed {
        kind: ResourceKind,
        id: InstantiationId,
    },
}

// ── Namespace bookkeeping ─────────────────────────────────────────────────────

/// Set of namespaces currently held by live managers of one provider.
#[derive(Debug, Clone)]
pub struct Namespaces {
    kind: ResourceKind,
    live: Arc<Mutex<HashSet<InstantiationId>>>,
}

impl Namespaces {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            live: Arc::default(),
        }
    }

    /// Claim `id`, failing if it is already held.
    pub fn claim(&self, id: &InstantiationId) -> Result<NamespaceClaim, ResourceError> {
        if !self.live.lock().insert(id.clone()) {
            return Err(ResourceError::NamespaceInUse {
                kind: self.kind,
                id: id.clone(),
            });
        }
        Ok(NamespaceClaim {
            id: id.clone(),
            live: Some(Arc::clone(&self.live)),
        })
    }

    pub fn contains(&self, id: &InstantiationId) -> bool {
        self.live.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }
}

/// A held namespace.  Released once, on [`release`](Self::release) or drop.
#[derive(Debug)]
pub struct NamespaceClaim {
    id: InstantiationId,
    live: Option<Arc<Mutex<HashSet<InstantiationId>>>>,
}

impl NamespaceClaim {
    pub fn id(&self) -> &InstantiationId {
        &self.id
    }

    pub fn release(&mut self) {
        if let Some(live) = self.live.take() {
            live.lock().remove(&self.id);
        }
    }
}

impl Drop for NamespaceClaim {
    fn drop(&mut self) {
        self.release();
    }
}

// ── ModuleResources ───────────────────────────────────────────────────────────

/// Live handles handed to a module's activation-phase context.
#[derive(Clone)]
pub struct LiveHandles {
    pub network: Arc<dyn ModuleNetwork>,
    pub game: Arc<dyn ModuleGame>,
    pub state: Arc<dyn ModuleState>,
}

/// The three managers one run owns.
pub struct ModuleResources {
    id: InstantiationId,
    network: Box<dyn NetworkManager>,
    game: Box<dyn GameManager>,
    state: Box<dyn StateManager>,
    released: bool,
}

impl ModuleResources {
    /// Request a manager of each kind for `id`.
    ///
    /// If a later request fails, managers already obtained are closed
    /// before the error is returned.
    pub fn allocate(
        id: &InstantiationId,
        network: &dyn NetworkProvider,
        game: &dyn GameProvider,
        state: &dyn StateProvider,
    ) -> Result<Self, ResourceError> {
        let mut net = network.for_module(id)?;
        let mut gm = match game.for_module(id) {
            Ok(gm) => gm,
            Err(e) => {
                net.close();
                return Err(e);
            }
        };
        let st = match state.for_module(id) {
            Ok(st) => st,
            Err(e) => {
                gm.dispose();
                net.close();
                return Err(e);
            }
        };

        debug!(instantiation = %id, "allocated module resources");
        Ok(Self {
            id: id.clone(),
            network: net,
            game: gm,
            state: st,
            released: false,
        })
    }

    pub fn id(&self) -> &InstantiationId {
        &self.id
    }

    /// Open the live handles for the activation phase.
    pub fn open(&mut self) -> Result<LiveHandles, ResourceError> {
        Ok(LiveHandles {
            network: self.network.open()?,
            game: self.game.handle(),
            state: self.state.open()?,
        })
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Close state, dispose game, close network.  Only the first call has
    /// any effect.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.state.close();
        self.game.dispose();
        self.network.close();
        info!(instantiation = %self.id, "released module resources");
    }
}

impl Drop for ModuleResources {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ClientRegistry;
    use crate::geometry::WallGeometry;
    use crate::time::Timestamp;

    fn id_at(deadline: u64) -> InstantiationId {
        InstantiationId::new(
            WallGeometry::unit().fingerprint(),
            Timestamp::from_millis(deadline),
        )
    }

    struct Providers {
        network: LocalNetworkProvider,
        game: LocalGameProvider,
        state: LocalStateProvider,
    }

    fn providers() -> Providers {
        Providers {
            network: LocalNetworkProvider::new(ClientRegistry::new()),
            game: LocalGameProvider::new(),
            state: LocalStateProvider::new(),
        }
    }

    #[test]
    fn display_joins_fingerprint_and_deadline() {
        assert_eq!(id_at(1000).to_string(), "0,0,1,1-1000");
    }

    #[test]
    fn different_deadlines_give_distinct_ids() {
        assert_ne!(id_at(1000), id_at(2000));
    }

    #[test]
    fn concurrent_runs_do_not_collide() {
        let p = providers();
        let a = ModuleResources::allocate(&id_at(1000), &p.network, &p.game, &p.state).unwrap();
        let b = ModuleResources::allocate(&id_at(2000), &p.network, &p.game, &p.state).unwrap();
        assert_eq!(p.state.namespaces().len(), 2);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn same_namespace_twice_is_rejected_and_rolled_back() {
        let p = providers();
        let _held = p.state.namespaces().claim(&id_at(1000)).unwrap();

        let err = ModuleResources::allocate(&id_at(1000), &p.network, &p.game, &p.state)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ResourceError::NamespaceInUse {
                kind: ResourceKind::State,
                ..
            }
        ));
        // network and game claims were given back
        assert!(p.network.namespaces().is_empty());
        assert!(p.game.namespaces().is_empty());
    }

    #[test]
    fn release_is_idempotent_and_frees_namespaces() {
        let p = providers();
        let mut res = ModuleResources::allocate(&id_at(7), &p.network, &p.game, &p.state).unwrap();
        let live = res.open().unwrap();
        live.state.store("k", Timestamp::from_millis(1), serde_json::json!(1));

        res.release();
        res.release();
        assert!(res.is_released());
        assert!(p.network.namespaces().is_empty());
        assert!(p.game.namespaces().is_empty());
        assert!(p.state.namespaces().is_empty());
        assert_eq!(live.state.get("k"), None, "store cleared on close");

        // a fresh run may now reuse the namespace
        assert!(ModuleResources::allocate(&id_at(7), &p.network, &p.game, &p.state).is_ok());
    }
}
