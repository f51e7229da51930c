/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-run shared state: timestamped values a module publishes for its
//! clients to interpolate.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{InstantiationId, NamespaceClaim, Namespaces, ResourceError, ResourceKind};
use crate::time::Timestamp;

/// What module code sees of the state service.
pub trait ModuleState: Send + Sync {
    /// Record `value` for `key` as of `time`.  Older writes than the stored
    /// one are ignored.
    fn store(&self, key: &str, time: Timestamp, value: serde_json::Value);

    fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Value and its write time.
    fn latest(&self, key: &str) -> Option<(Timestamp, serde_json::Value)>;
}

/// Creates a [`StateManager`] per run.
pub trait StateProvider: Send + Sync {
    fn for_module(&self, id: &InstantiationId) -> Result<Box<dyn StateManager>, ResourceError>;
}

/// Owns one run's state namespace.
pub trait StateManager: Send {
    fn open(&mut self) -> Result<Arc<dyn ModuleState>, ResourceError>;

    /// Idempotent.  Drops every stored value.
    fn close(&mut self);
}

/// Placeholder used during validation.  Stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertState;

impl ModuleState for InertState {
    fn store(&self, _key: &str, _time: Timestamp, _value: serde_json::Value) {}

    fn get(&self, _key: &str) -> Option<serde_json::Value> {
        None
    }

    fn latest(&self, _key: &str) -> Option<(Timestamp, serde_json::Value)> {
        None
    }
}

// ── In-process implementation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LocalStateProvider {
    namespaces: Namespaces,
}

impl LocalStateProvider {
    pub fn new() -> Self {
        Self {
            namespaces: Namespaces::new(ResourceKind::State),
        }
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }
}

impl Default for LocalStateProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StateProvider for LocalStateProvider {
    fn for_module(&self, id: &InstantiationId) -> Result<Box<dyn StateManager>, ResourceError> {
        let claim = self.namespaces.claim(id)?;
        Ok(Box::new(LocalStateManager {
            claim,
            store: None,
            closed: false,
        }))
    }
}

struct LocalStateManager {
    claim: NamespaceClaim,
    store: Option<Arc<LocalState>>,
    closed: bool,
}

impl StateManager for LocalStateManager {
    fn open(&mut self) -> Result<Arc<dyn ModuleState>, ResourceError> {
        if self.closed {
            return Err(ResourceError::Closed {
                kind: ResourceKind::State,
                id: self.claim.id().clone(),
            });
        }
        let store = self.store.get_or_insert_with(Arc::default);
        Ok(Arc::clone(store) as Arc<dyn ModuleState>)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(store) = self.store.take() {
            let mut values = store.values.lock();
            values.clear();
            store.closed.store(true, Ordering::Release);
        }
        self.claim.release();
        debug!(instantiation = %self.claim.id(), "state closed");
    }
}

#[derive(Default)]
struct LocalState {
    values: Mutex<BTreeMap<String, (Timestamp, serde_json::Value)>>,
    closed: AtomicBool,
}

impl ModuleState for LocalState {
    fn store(&self, key: &str, time: Timestamp, value: serde_json::Value) {
        let mut values = self.values.lock();
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        match values.get(key) {
            Some((stored, _)) if *stored > time => {}
            _ => {
                values.insert(key.to_string(), (time, value));
            }
        }
    }

    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.lock().get(key).map(|(_, v)| v.clone())
    }

    fn latest(&self, key: &str) -> Option<(Timestamp, serde_json::Value)> {
        self.values.lock().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::WallGeometry;
    use serde_json::json;

    fn open_state() -> (Box<dyn StateManager>, Arc<dyn ModuleState>) {
        let provider = LocalStateProvider::new();
        let id = InstantiationId::new(WallGeometry::unit().fingerprint(), Timestamp::from_millis(3));
        let mut mgr = provider.for_module(&id).unwrap();
        let state = mgr.open().unwrap();
        (mgr, state)
    }

    #[test]
    fn older_writes_do_not_overwrite_newer_ones() {
        let (_mgr, state) = open_state();
        state.store("pos", Timestamp::from_millis(20), json!(2));
        state.store("pos", Timestamp::from_millis(10), json!(1));
        assert_eq!(
            state.latest("pos"),
            Some((Timestamp::from_millis(20), json!(2)))
        );
    }

    #[test]
    fn writes_after_close_are_ignored() {
        let (mut mgr, state) = open_state();
        state.store("a", Timestamp::from_millis(1), json!("x"));
        mgr.close();
        state.store("a", Timestamp::from_millis(2), json!("y"));
        assert_eq!(state.get("a"), None);
        assert!(mgr.open().is_err());
    }
}
