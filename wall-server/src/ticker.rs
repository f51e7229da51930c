/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Shared per-frame tick loop.
//!
//! Every active module registers a [`TickTarget`] with the ticker.  Once
//! per frame the ticker walks its targets in registration order and calls
//! `tick(now, delta)` on each, synchronously.  One slow target delays the
//! rest of the frame.
//!
//! A target that panics is logged and skipped for that frame; the other
//! targets still tick.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::server::ServerModule;
use crate::time::{Clock, Timestamp};

/// Slot holding a run's server instance.  Empty until instantiation
/// succeeds and again after disposal.
pub type InstanceSlot = Arc<Mutex<Option<Box<dyn ServerModule>>>>;

// ── TickTarget ────────────────────────────────────────────────────────────────

/// Handle the ticker calls into.  Cloning shares the same slot; two
/// targets are equal when they share a slot.
#[derive(Clone)]
pub struct TickTarget {
    name: Arc<str>,
    slot: InstanceSlot,
}

impl TickTarget {
    pub fn new(name: &str, slot: InstanceSlot) -> Self {
        Self {
            name: Arc::from(name),
            slot,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forward to the instance if there is one.
    pub fn tick(&self, now: Timestamp, delta: Duration) {
        if let Some(instance) = self.slot.lock().as_mut() {
            instance.tick(now, delta);
        }
    }

    pub fn same_slot(&self, other: &TickTarget) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl std::fmt::Debug for TickTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickTarget").field("name", &self.name).finish()
    }
}

// ── Ticker ────────────────────────────────────────────────────────────────────

/// Registration surface of the tick loop.
pub trait Ticker: Send + Sync {
    fn add(&self, target: TickTarget);

    /// Remove `target`.  No-op if it is not registered.
    fn remove(&self, target: &TickTarget);
}

/// In-process ticker.
#[derive(Debug, Default)]
pub struct ModuleTicker {
    targets: Mutex<Vec<TickTarget>>,
    last: Mutex<Option<Timestamp>>,
}

impl ModuleTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.targets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.lock().is_empty()
    }

    /// Tick every registered target once with the same `now` and `delta`.
    pub fn tick_all(&self, now: Timestamp, delta: Duration) {
        // Snapshot so targets may add or remove themselves mid-frame.
        let targets = self.targets.lock().clone();
        for target in &targets {
            if catch_unwind(AssertUnwindSafe(|| target.tick(now, delta))).is_err() {
                error!(module = target.name(), "tick panicked");
            }
        }
        trace!(%now, targets = targets.len(), "frame ticked");
    }

    /// Tick at `now`, with `delta` measured from the previous call.  The
    /// first call reports a zero delta.
    pub fn frame(&self, now: Timestamp) {
        let delta = {
            let mut last = self.last.lock();
            let delta = last.map(|prev| prev.until(now)).unwrap_or(Duration::ZERO);
            *last = Some(now);
            delta
        };
        self.tick_all(now, delta);
    }

    /// Drive frames every `interval` until the task is dropped.
    pub async fn run(self: Arc<Self>, clock: Arc<dyn Clock>, interval: Duration) {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        debug!(?interval, "ticker started");
        loop {
            timer.tick().await;
            self.frame(clock.now());
        }
    }
}

impl Ticker for ModuleTicker {
    fn add(&self, target: TickTarget) {
        debug!(module = target.name(), "ticker: added");
        self.targets.lock().push(target);
    }

    fn remove(&self, target: &TickTarget) {
        let mut targets = self.targets.lock();
        let before = targets.len();
        targets.retain(|t| !t.same_slot(target));
        if targets.len() != before {
            debug!(module = target.name(), "ticker: removed");
        }
    }
}
