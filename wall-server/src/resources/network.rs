/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-run network namespace: module events fanned out to the clients.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use super::{InstantiationId, NamespaceClaim, Namespaces, ResourceError, ResourceKind};
use crate::broadcast::{ClientMessage, ClientRegistry, ModuleEventMessage};

/// What module code sees of the network.
pub trait ModuleNetwork: Send + Sync {
    /// Send `event` to every client displaying this run.
    fn emit(&self, event: &str, payload: serde_json::Value);
}

/// Creates a [`NetworkManager`] per run.
pub trait NetworkProvider: Send + Sync {
    fn for_module(&self, id: &InstantiationId) -> Result<Box<dyn NetworkManager>, ResourceError>;
}

/// Owns one run's network namespace.
pub trait NetworkManager: Send {
    fn open(&mut self) -> Result<Arc<dyn ModuleNetwork>, ResourceError>;

    /// Idempotent.  Handles returned by `open` go silent afterwards.
    fn close(&mut self);
}

/// Placeholder used during validation.  Sends nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertNetwork;

impl ModuleNetwork for InertNetwork {
    fn emit(&self, _event: &str, _payload: serde_json::Value) {}
}

// ── In-process implementation ─────────────────────────────────────────────────

/// Network namespaces backed by the [`ClientRegistry`].
#[derive(Debug, Clone)]
pub struct LocalNetworkProvider {
    clients: ClientRegistry,
    namespaces: Namespaces,
}

impl LocalNetworkProvider {
    pub fn new(clients: ClientRegistry) -> Self {
        Self {
            clients,
            namespaces: Namespaces::new(ResourceKind::Network),
        }
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }
}

impl NetworkProvider for LocalNetworkProvider {
    fn for_module(&self, id: &InstantiationId) -> Result<Box<dyn NetworkManager>, ResourceError> {
        let claim = self.namespaces.claim(id)?;
        Ok(Box::new(LocalNetworkManager {
            clients: self.clients.clone(),
            claim,
            handle: None,
            closed: false,
        }))
    }
}

struct LocalNetworkManager {
    clients: ClientRegistry,
    claim: NamespaceClaim,
    handle: Option<Arc<LocalNetwork>>,
    closed: bool,
}

impl NetworkManager for LocalNetworkManager {
    fn open(&mut self) -> Result<Arc<dyn ModuleNetwork>, ResourceError> {
        if self.closed {
            return Err(ResourceError::Closed {
                kind: ResourceKind::Network,
                id: self.claim.id().clone(),
            });
        }
        let handle = self.handle.get_or_insert_with(|| {
            Arc::new(LocalNetwork {
                instance: self.claim.id().to_string(),
                clients: self.clients.clone(),
                open: AtomicBool::new(true),
            })
        });
        Ok(Arc::clone(handle) as Arc<dyn ModuleNetwork>)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(handle) = self.handle.take() {
            handle.open.store(false, Ordering::Release);
        }
        self.claim.release();
        debug!(instantiation = %self.claim.id(), "network closed");
    }
}

struct LocalNetwork {
    instance: String,
    clients: ClientRegistry,
    open: AtomicBool,
}

impl ModuleNetwork for LocalNetwork {
    fn emit(&self, event: &str, payload: serde_json::Value) {
        if !self.open.load(Ordering::Acquire) {
            trace!(instance = %self.instance, event, "emit after close dropped");
            return;
        }
        self.clients
            .send_all(&ClientMessage::ModuleEvent(ModuleEventMessage {
                instance: self.instance.clone(),
                event: event.to_string(),
                payload,
            }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::WallGeometry;
    use crate::time::Timestamp;
    use serde_json::json;

    fn id() -> InstantiationId {
        InstantiationId::new(WallGeometry::unit().fingerprint(), Timestamp::from_millis(5))
    }

    #[test]
    fn emit_reaches_clients_until_closed() {
        let clients = ClientRegistry::new();
        let (_, mut rx) = clients.connect();
        let provider = LocalNetworkProvider::new(clients);

        let mut mgr = provider.for_module(&id()).unwrap();
        let net = mgr.open().unwrap();
        net.emit("tick", json!({"n": 1}));

        match rx.try_recv().unwrap() {
            ClientMessage::ModuleEvent(ev) => {
                assert_eq!(ev.instance, "0,0,1,1-5");
                assert_eq!(ev.event, "tick");
                assert_eq!(ev.payload, json!({"n": 1}));
            }
            other => panic!("unexpected {other:?}"),
        }

        mgr.close();
        mgr.close();
        net.emit("tick", json!({"n": 2}));
        assert!(rx.try_recv().is_err());
        assert!(mgr.open().is_err());
    }
}
