/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-run game namespace: the roster of players taking part in an
//! interactive module.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{InstantiationId, NamespaceClaim, Namespaces, ResourceError, ResourceKind};

/// What module code sees of the game service.
pub trait ModuleGame: Send + Sync {
    /// Returns `false` if the player was already present or the game is
    /// disposed.
    fn join(&self, player: &str) -> bool;

    fn leave(&self, player: &str) -> bool;

    fn players(&self) -> Vec<String>;
}

/// Creates a [`GameManager`] per run.
pub trait GameProvider: Send + Sync {
    fn for_module(&self, id: &InstantiationId) -> Result<Box<dyn GameManager>, ResourceError>;
}

/// Owns one run's game namespace.
pub trait GameManager: Send {
    /// The game handle is usable as soon as the manager exists; there is
    /// no separate open step.
    fn handle(&self) -> Arc<dyn ModuleGame>;

    /// Idempotent.
    fn dispose(&mut self);
}

/// Placeholder used during validation.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertGame;

impl ModuleGame for InertGame {
    fn join(&self, _player: &str) -> bool {
        false
    }

    fn leave(&self, _player: &str) -> bool {
        false
    }

    fn players(&self) -> Vec<String> {
        Vec::new()
    }
}

// ── In-process implementation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LocalGameProvider {
    namespaces: Namespaces,
}

impl LocalGameProvider {
    pub fn new() -> Self {
        Self {
            namespaces: Namespaces::new(ResourceKind::Game),
        }
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }
}

impl Default for LocalGameProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GameProvider for LocalGameProvider {
    fn for_module(&self, id: &InstantiationId) -> Result<Box<dyn GameManager>, ResourceError> {
        let claim = self.namespaces.claim(id)?;
        Ok(Box::new(LocalGameManager {
            claim,
            game: Arc::new(LocalGame::default()),
            disposed: false,
        }))
    }
}

struct LocalGameManager {
    claim: NamespaceClaim,
    game: Arc<LocalGame>,
    disposed: bool,
}

impl GameManager for LocalGameManager {
    fn handle(&self) -> Arc<dyn ModuleGame> {
        Arc::clone(&self.game) as Arc<dyn ModuleGame>
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        let mut roster = self.game.roster.lock();
        roster.disposed = true;
        roster.players.clear();
        drop(roster);
        self.claim.release();
        debug!(instantiation = %self.claim.id(), "game disposed");
    }
}

#[derive(Default)]
struct Roster {
    players: BTreeSet<String>,
    disposed: bool,
}

#[derive(Default)]
struct LocalGame {
    roster: Mutex<Roster>,
}

impl ModuleGame for LocalGame {
    fn join(&self, player: &str) -> bool {
        let mut roster = self.roster.lock();
        !roster.disposed && roster.players.insert(player.to_string())
    }

    fn leave(&self, player: &str) -> bool {
        self.roster.lock().players.remove(player)
    }

    fn players(&self) -> Vec<String> {
        self.roster.lock().players.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::WallGeometry;
    use crate::time::Timestamp;

    #[test]
    fn roster_is_cleared_and_frozen_on_dispose() {
        let provider = LocalGameProvider::new();
        let id = InstantiationId::new(WallGeometry::unit().fingerprint(), Timestamp::from_millis(9));
        let mut mgr = provider.for_module(&id).unwrap();
        let game = mgr.handle();

        assert!(game.join("ada"));
        assert!(!game.join("ada"));
        assert!(game.join("bob"));
        assert_eq!(game.players(), vec!["ada".to_string(), "bob".to_string()]);

        mgr.dispose();
        mgr.dispose();
        assert!(game.players().is_empty());
        assert!(!game.join("carol"));
        assert!(!provider.namespaces().contains(&id));
    }
}
