/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use thiserror::Error;

use crate::loader::LoadError;
use crate::resources::ResourceError;

/// Failure of [`RunningModule::instantiate`](super::RunningModule::instantiate)
/// on a valid module.  The slot is lost; callers substitute the blank
/// module for the same deadline.
#[derive(Debug, Error)]
pub enum InstantiateError {
    #[error("resource allocation failed: {0}")]
    Resource(#[from] ResourceError),

    #[error("activation failed: {0}")]
    Load(#[from] LoadError),

    /// The activation task was cancelled or could not be joined.
    #[error("activation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("module '{module}' was already instantiated")]
    AlreadyInstantiated { module: String },

    #[error("module '{module}' was disposed and cannot be instantiated")]
    Disposed { module: String },
}
