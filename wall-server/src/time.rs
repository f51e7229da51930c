/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wall-clock timestamps and the clock abstraction.
//!
//! Every client switches modules at an absolute [`Timestamp`] (the
//! *deadline*).  Timestamps are milliseconds since the Unix epoch so the
//! value broadcast to clients is a bare number they can compare against
//! their own synchronized clocks.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ── Timestamp ─────────────────────────────────────────────────────────────────

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

/// The absolute instant at which all clients switch to a module.
pub type Deadline = Timestamp;

impl Timestamp {
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// `self + d`, saturating at `u64::MAX` milliseconds.
    pub fn saturating_add(self, d: Duration) -> Self {
        let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(ms))
    }

    /// Time left from `self` until `later`; zero when `later` is not after `self`.
    pub fn until(self, later: Timestamp) -> Duration {
        Duration::from_millis(later.0.saturating_sub(self.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(ms: u64) -> Self {
        Self(ms)
    }
}

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Timestamp(ms)
    }
}

/// Wall clock derived from `tokio::time::Instant`.
///
/// When the tokio clock is paused (`#[tokio::test(start_paused = true)]`)
/// this clock only moves when tokio time is advanced, which makes
/// deadline-driven code deterministic under test.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    origin_ts: Timestamp,
}

impl TokioClock {
    /// Anchor the clock so that "now" reads as `origin_ts`.
    pub fn starting_at(origin_ts: Timestamp) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            origin_ts,
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        self.origin_ts.saturating_add(self.origin.elapsed())
    }
}

/// Time remaining until `deadline` according to `clock`.
pub fn until(clock: &dyn Clock, deadline: Deadline) -> Duration {
    clock.now().until(deadline)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
