/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structural check of an entry point's exports against the server
//! contract.
//!
//! An entry point declares what it exports as a list of
//! [`MemberSignature`]s plus an optional constructor.  The check passes
//! only if the constructor is present and every contract member is
//! declared with the contract's parameter count.  Extra members are
//! allowed.

use super::error::{ConformanceError, Violation};
use super::ServerExports;

/// Name and parameter list of one exported operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSignature {
    pub name: &'static str,
    pub params: &'static [&'static str],
}

impl MemberSignature {
    pub const fn new(name: &'static str, params: &'static [&'static str]) -> Self {
        Self { name, params }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Operations every server must export.
pub const SERVER_CONTRACT: &[MemberSignature] = &[
    MemberSignature::new("tick", &["now", "delta"]),
    MemberSignature::new("dispose", &[]),
    MemberSignature::new("will_be_shown_soon", &["deadline"]),
];

/// Check `exports` against [`SERVER_CONTRACT`].
pub fn conform(exports: &ServerExports) -> Result<(), ConformanceError> {
    let mut violations = Vec::new();

    if !exports.has_constructor() {
        violations.push(Violation::MissingConstructor);
    }

    for required in SERVER_CONTRACT {
        match exports.member(required.name) {
            None => violations.push(Violation::MissingMember {
                member: required.name,
            }),
            Some(found) if found.arity() != required.arity() => {
                violations.push(Violation::ArityMismatch {
                    member: required.name,
                    expected: required.arity(),
                    found: found.arity(),
                })
            }
            Some(_) => {}
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConformanceError(violations))
    }
}
