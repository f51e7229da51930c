/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wall server – module lifecycle and deadline-synchronized switching
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── time          – timestamps, deadlines, clocks
//! ├── geometry      – wall geometry snapshot + fingerprint
//! ├── definition    – module definitions
//! ├── server        – server capability contract, no-op server
//! ├── loader/       – entry-point registry, capability context, conformance check
//! ├── resources/    – per-run network / game / state namespaces
//! ├── broadcast     – connected clients + load-module broadcast
//! ├── routes        – static asset routes of active modules
//! ├── ticker        – shared per-frame tick loop
//! ├── services      – bundle of the collaborators above
//! ├── running/      – RunningModule lifecycle
//! ├── builtin/      – server modules compiled into the binary
//! └── config/       – YAML wall configuration + module catalog
//! ```

pub mod broadcast;
pub mod builtin;
pub mod config;
pub mod definition;
pub mod geometry;
pub mod loader;
pub mod resources;
pub mod routes;
pub mod running;
pub mod server;
pub mod services;
pub mod ticker;
pub mod time;
