/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wall clock module.
//!
//! Publishes the current time to the run's state every frame and emits a
//! `second` event to the clients whenever the displayed second changes.
//!
//! Config (all optional):
//!
//! ```yaml
//! face: digital      # or analog
//! utc_offset_minutes: 60
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::definition::ModuleConfig;
use crate::loader::{ModuleContext, ModuleLog, ServerExports};
use crate::resources::{ModuleNetwork, ModuleState};
use crate::server::{ModuleError, Preparation, ServerModule};
use crate::time::{Deadline, Timestamp};

pub const ENTRY: &str = "builtin/clock/server";

/// State key holding the latest published time.
pub const STATE_KEY: &str = "time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    #[default]
    Digital,
    Analog,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClockConfig {
    #[serde(default)]
    face: Face,
    #[serde(default)]
    utc_offset_minutes: i64,
}

impl ClockConfig {
    fn parse(config: &ModuleConfig) -> Result<Self, ModuleError> {
        if config.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(config.clone())
            .map_err(|e| ModuleError::InvalidConfig(e.to_string()))
    }
}

pub fn load(ctx: &ModuleContext) -> Result<ServerExports, ModuleError> {
    ctx.assert.that(
        !ctx.wall_geometry.points.is_empty(),
        "clock needs a wall to draw on",
    )?;
    let network = Arc::clone(&ctx.network);
    let state = Arc::clone(&ctx.state);
    let log = ctx.log.clone();

    Ok(ServerExports::new(move |config, deadline| {
        let config = ClockConfig::parse(config)?;
        log.info(&format!("clock face {:?}, showing at {deadline}", config.face));
        Ok(Box::new(ClockServer {
            network,
            state,
            log,
            face: config.face,
            offset_ms: config.utc_offset_minutes * 60_000,
            last_second: None,
        }) as Box<dyn ServerModule>)
    }))
}

struct ClockServer {
    network: Arc<dyn ModuleNetwork>,
    state: Arc<dyn ModuleState>,
    log: ModuleLog,
    face: Face,
    offset_ms: i64,
    last_second: Option<u64>,
}

impl ClockServer {
    fn local_millis(&self, now: Timestamp) -> u64 {
        let local = i128::from(now.as_millis()) + i128::from(self.offset_ms);
        u64::try_from(local.max(0)).unwrap_or(u64::MAX)
    }
}

impl ServerModule for ClockServer {
    fn tick(&mut self, now: Timestamp, _delta: Duration) {
        let local = self.local_millis(now);
        self.state.store(STATE_KEY, now, json!(local));

        let second = local / 1000;
        if self.last_second != Some(second) {
            self.last_second = Some(second);
            self.network.emit("second", json!({"second": second}));
        }
    }

    fn dispose(&mut self) {
        self.log.debug("clock stopped");
    }

    fn will_be_shown_soon(&mut self, deadline: Deadline) -> Preparation {
        let network = Arc::clone(&self.network);
        let face = self.face;
        Box::pin(async move {
            network.emit(
                "face",
                json!({
                    "face": match face {
                        Face::Digital => "digital",
                        Face::Analog => "analog",
                    },
                    "at": deadline.as_millis(),
                }),
            );
            Ok(())
        })
    }
}
