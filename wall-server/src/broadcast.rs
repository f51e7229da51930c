/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Connected clients and the synchronized "load module" broadcast.
//!
//! Each instantiation sends exactly one [`LoadModuleMessage`] to every
//! connected client.  Delivery is fire-and-forget: the server never waits
//! for an acknowledgement, and every client switches on its own at the
//! absolute `time` carried in the message.
//!
//! ```text
//! RunningModule::instantiate()
//!        │
//!        ▼
//!   broadcast_load ──► ClientHandle #1 ──(mpsc)──► transport ──► screen
//!                  ──► ClientHandle #2 ──(mpsc)──► transport ──► screen
//!                  ──► ...
//! ```
//!
//! The transport underneath each channel (sockets, accept/drop) is owned
//! elsewhere; it drains the receiver returned by [`ClientRegistry::connect`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::definition::ModuleDefinition;
use crate::geometry::{Point, WallGeometry};
use crate::time::Deadline;

// ── Wire messages ─────────────────────────────────────────────────────────────

/// The module part of a load instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulePayload {
    pub name: String,
    /// Client entry URL; empty for blank modules.
    pub path: String,
    pub config: Option<serde_json::Value>,
    pub credit: Option<serde_json::Value>,
}

/// Instruction to load a module and show it at `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadModuleMessage {
    pub module: ModulePayload,
    pub time: Deadline,
    pub geo: Vec<Point>,
}

impl LoadModuleMessage {
    pub fn new(
        def: &ModuleDefinition,
        deadline: Deadline,
        geometry: &WallGeometry,
        asset_prefix: &str,
    ) -> Self {
        Self {
            module: ModulePayload {
                name: def.name.clone(),
                path: def.client_load_path(asset_prefix),
                config: def.config.clone(),
                credit: def.credit.clone(),
            },
            time: deadline,
            geo: geometry.points.clone(),
        }
    }
}

/// Event emitted by a running module on its own network namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEventMessage {
    /// Display form of the emitting run's instantiation id.
    pub instance: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Everything the server sends down a client channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    LoadModule(LoadModuleMessage),
    ModuleEvent(ModuleEventMessage),
}

// ── Clients ───────────────────────────────────────────────────────────────────

/// Identifier assigned to a client when it connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// The channel was dropped by the transport (client gone).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientGone(pub ClientId);

/// Sending half of one client's message channel.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    tx: UnboundedSender<ClientMessage>,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn send(&self, msg: ClientMessage) -> Result<(), ClientGone> {
        self.tx.send(msg).map_err(|_| ClientGone(self.id))
    }
}

/// The set of currently connected clients.
///
/// Cloning yields another handle onto the same set.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<BTreeMap<ClientId, ClientHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client.  The transport drains the returned receiver.
    pub fn connect(&self) -> (ClientId, UnboundedReceiver<ClientMessage>) {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.write().insert(id, ClientHandle { id, tx });
        debug!(client = %id, "client connected");
        (id, rx)
    }

    /// Returns `false` if `id` was not connected.
    pub fn disconnect(&self, id: ClientId) -> bool {
        let removed = self.clients.write().remove(&id).is_some();
        if removed {
            debug!(client = %id, "client disconnected");
        }
        removed
    }

    pub fn get(&self, id: ClientId) -> Option<ClientHandle> {
        self.clients.read().get(&id).cloned()
    }

    /// Snapshot of the connected clients, ordered by id.
    pub fn connected(&self) -> Vec<ClientHandle> {
        self.clients.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Send `msg` to every connected client; returns how many accepted it.
    pub fn send_all(&self, msg: &ClientMessage) -> usize {
        let mut delivered = 0usize;
        for client in self.connected() {
            match client.send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(ClientGone(id)) => warn!(client = %id, "client channel closed, skipping"),
            }
        }
        delivered
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Tell one client to load `def` and show it at `deadline`.
///
/// Returns `false` when the client's channel is already closed.
pub fn tell_client_to_play(
    client: &ClientHandle,
    def: &ModuleDefinition,
    deadline: Deadline,
    geometry: &WallGeometry,
    asset_prefix: &str,
) -> bool {
    let msg = LoadModuleMessage::new(def, deadline, geometry, asset_prefix);
    match client.send(ClientMessage::LoadModule(msg)) {
        Ok(()) => {
            debug!(client = %client.id(), module = %def.name, %deadline, "load instruction sent");
            true
        }
        Err(ClientGone(id)) => {
            warn!(client = %id, module = %def.name, "client channel closed, load instruction dropped");
            false
        }
    }
}

/// Send the load instruction for `def` to every connected client.
///
/// One message per client, identical `time` and `geo` for all of them.
/// Returns the number of clients the message was handed to.
pub fn broadcast_load(
    clients: &ClientRegistry,
    def: &ModuleDefinition,
    deadline: Deadline,
    geometry: &WallGeometry,
    asset_prefix: &str,
) -> usize {
    let msg = ClientMessage::LoadModule(LoadModuleMessage::new(
        def,
        deadline,
        geometry,
        asset_prefix,
    ));
    let delivered = clients.send_all(&msg);
    info!(
        module = %def.name,
        %deadline,
        clients = delivered,
        "load instruction broadcast"
    );
    delivered
}

// ── Tests ─────────────────────────────────────────────────────────────────────
