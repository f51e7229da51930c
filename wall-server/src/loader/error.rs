/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Error types for loading module server code.
//!
//! * [`ConformanceError`]: the entry point loaded, but what it exports
//!   does not match the server contract.
//! * [`LoadError`]: any failure on the resolve → load → check → construct
//!   path.  During validation these are logged and turned into
//!   `valid = false`; during activation they propagate to the caller.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::server::ModuleError;

// ── Conformance ───────────────────────────────────────────────────────────────

/// One way an entry point's exports deviate from the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    MissingConstructor,
    MissingMember {
        member: &'static str,
    },
    ArityMismatch {
        member: &'static str,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingConstructor => write!(f, "no constructor (config, deadline)"),
            Violation::MissingMember { member } => write!(f, "missing member '{member}'"),
            Violation::ArityMismatch {
                member,
                expected,
                found,
            } => write!(
                f,
                "member '{member}' takes {found} parameter(s), expected {expected}"
            ),
        }
    }
}

/// Every violation found in one conformance check, in contract order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("exports do not satisfy the server contract: {}", join_violations(.0))]
pub struct ConformanceError(pub Vec<Violation>);

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Load ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LoadError {
    /// The definition has no `server_path`; there is nothing to load.
    #[error("module '{module}' has no server entry point")]
    NoServerEntry { module: String },

    /// Nothing is registered at the resolved entry path.
    #[error("module '{module}': no entry point registered at {}", .path.display())]
    EntryPointNotFound { module: String, path: PathBuf },

    /// The entry point's load function returned an error.
    #[error("module '{module}': loading {} failed: {source}", .path.display())]
    LoadFailed {
        module: String,
        path: PathBuf,
        #[source]
        source: ModuleError,
    },

    /// The entry point (load function or constructor) panicked.
    #[error("module '{module}': {stage} panicked")]
    Panicked {
        module: String,
        stage: &'static str,
    },

    #[error("module '{module}': {source}")]
    Conformance {
        module: String,
        #[source]
        source: ConformanceError,
    },

    /// The server constructor rejected `(config, deadline)`.
    #[error("module '{module}': constructing server failed: {source}")]
    ConstructFailed {
        module: String,
        #[source]
        source: ModuleError,
    },
}
