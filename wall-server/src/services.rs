/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The collaborators a [`RunningModule`](crate::running::RunningModule)
//! talks to, bundled so they can be passed around and swapped in tests.

use std::sync::Arc;

use crate::broadcast::ClientRegistry;
use crate::definition::DEFAULT_MODULE_ASSET_PREFIX;
use crate::geometry::{GeometrySource, SharedGeometry, WallGeometry};
use crate::loader::{ModuleLoader, ModuleRegistry};
use crate::resources::{
    GameProvider, LocalGameProvider, LocalNetworkProvider, LocalStateProvider, NetworkProvider,
    StateProvider,
};
use crate::routes::{AssetRoutes, RouteRegistry};
use crate::ticker::{ModuleTicker, Ticker};
use crate::time::{Clock, SystemClock};

#[derive(Clone)]
pub struct WallServices {
    pub loader: Arc<ModuleLoader>,
    pub geometry: Arc<dyn GeometrySource>,
    pub clients: ClientRegistry,
    pub network: Arc<dyn NetworkProvider>,
    pub game: Arc<dyn GameProvider>,
    pub state: Arc<dyn StateProvider>,
    pub ticker: Arc<dyn Ticker>,
    pub routes: Arc<dyn RouteRegistry>,
    pub clock: Arc<dyn Clock>,
    /// URL prefix client code is served under, e.g. `/module/`.
    pub asset_prefix: String,
}

/// In-process services plus typed handles to the concrete parts, for
/// callers (the binary, tests) that need to drive or inspect them.
pub struct LocalServices {
    pub services: WallServices,
    pub geometry: SharedGeometry,
    pub ticker: Arc<ModuleTicker>,
    pub routes: AssetRoutes,
    pub network: LocalNetworkProvider,
    pub game: LocalGameProvider,
    pub state: LocalStateProvider,
}

impl LocalServices {
    pub fn new(registry: ModuleRegistry, geometry: WallGeometry, clock: Arc<dyn Clock>) -> Self {
        let clients = ClientRegistry::new();
        let shared_geometry = SharedGeometry::new(geometry);
        let ticker = Arc::new(ModuleTicker::new());
        let routes = AssetRoutes::new();
        let network = LocalNetworkProvider::new(clients.clone());
        let game = LocalGameProvider::new();
        let state = LocalStateProvider::new();

        let services = WallServices {
            loader: Arc::new(ModuleLoader::new(registry)),
            geometry: Arc::new(shared_geometry.clone()),
            clients,
            network: Arc::new(network.clone()),
            game: Arc::new(game.clone()),
            state: Arc::new(state.clone()),
            ticker: Arc::clone(&ticker) as Arc<dyn Ticker>,
            routes: Arc::new(routes.clone()),
            clock,
            asset_prefix: DEFAULT_MODULE_ASSET_PREFIX.to_string(),
        };

        Self {
            services,
            geometry: shared_geometry,
            ticker,
            routes,
            network,
            game,
            state,
        }
    }

    /// Local services on the system clock.
    pub fn system(registry: ModuleRegistry, geometry: WallGeometry) -> Self {
        Self::new(registry, geometry, Arc::new(SystemClock))
    }

    pub fn with_asset_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.services.asset_prefix = prefix.into();
        self
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.services.clients
    }
}
