/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The server capability contract every loaded module must satisfy.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::time::{Deadline, Timestamp};

/// Error raised by module code (load functions, constructors, hooks).
#[derive(Debug, Error)]
pub enum ModuleError {
    /// A check made through [`ModuleAssert`](crate::loader::ModuleAssert) failed.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// The module's config blob did not have the shape the module expects.
    #[error("invalid module config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Work a module performs before it becomes visible.
///
/// The future is `'static` so the caller can release the instance before
/// awaiting it; ticks keep flowing while a module prefetches.
pub type Preparation = Pin<Box<dyn Future<Output = Result<(), ModuleError>> + Send + 'static>>;

/// A preparation that completes immediately.
pub fn ready() -> Preparation {
    Box::pin(std::future::ready(Ok(())))
}

/// Server side of a module.
///
/// `tick` runs on the shared per-frame cadence and must return promptly:
/// a slow tick delays every other active module for that frame.
pub trait ServerModule: Send {
    fn tick(&mut self, now: Timestamp, delta: Duration);

    fn dispose(&mut self);

    fn will_be_shown_soon(&mut self, deadline: Deadline) -> Preparation;
}

/// Server used for modules with no server code.  Does nothing.
#[derive(Debug, Default)]
pub struct NoopServer;

impl ServerModule for NoopServer {
    fn tick(&mut self, _now: Timestamp, _delta: Duration) {}

    fn dispose(&mut self) {}

    fn will_be_shown_soon(&mut self, _deadline: Deadline) -> Preparation {
        ready()
    }
}
