/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! One scheduled run of a module on the wall.
//!
//! A [`RunningModule`] is created by the orchestrator for every slot in
//! the schedule and walks through this lifecycle:
//!
//! ```text
//!  new() ──► Validating ──► Valid ───► instantiate() ──► Instantiated
//!                      └──► Invalid ─► instantiate() ──► (clients told, no instance)
//!
//!  Instantiated ── begin_transition_in ──► Active ── begin_transition_out ──► TransitioningOut
//!                                                                        │
//!                                  finish_transition_out, dispose() ◄────┘
//! ```
//!
//! | Step                   | Effect                                                   |
//! |------------------------|----------------------------------------------------------|
//! | `new`                  | starts validation on the blocking pool                    |
//! | `instantiate`          | waits for validation, broadcasts, allocates, activates    |
//! | `begin_transition_in`  | registers with the ticker                                 |
//! | `finish_transition_out`| unregisters from the ticker                               |
//! | `dispose`              | instance hook, release resources, drop asset route (once) |
//!
//! The instance, the three resource handles and the asset route exist
//! together or not at all.  A failed activation releases whatever was
//! already allocated before the error is returned.

mod error;

pub use error::InstantiateError;

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::broadcast::{broadcast_load, tell_client_to_play, ClientHandle};
use crate::definition::ModuleDefinition;
use crate::loader::LoadError;
use crate::resources::{InstantiationId, ModuleResources};
use crate::routes::RouteId;
use crate::server::{ModuleError, NoopServer, ServerModule};
use crate::services::WallServices;
use crate::ticker::{InstanceSlot, TickTarget};
use crate::time::{self, Deadline, Timestamp};

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// Where a [`RunningModule`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Validating,
    Valid,
    Invalid,
    Instantiated,
    Active,
    TransitioningOut,
    Disposed,
}

/// Progress past validation.  Validation itself is read off the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Pending,
    Instantiated,
    Active,
    TransitioningOut,
    Disposed,
}

// ── RunningModule ─────────────────────────────────────────────────────────────

pub struct RunningModule {
    services: WallServices,
    def: Arc<ModuleDefinition>,
    deadline: Deadline,
    /// `None` until validation finishes, then the verdict.  Written once.
    validation: watch::Receiver<Option<bool>>,
    instance: InstanceSlot,
    target: TickTarget,
    resources: Option<ModuleResources>,
    instantiation_id: Option<InstantiationId>,
    route: Option<RouteId>,
    ticking: bool,
    stage: Stage,
}

impl RunningModule {
    /// Create the run and start validating its server code.
    ///
    /// Modules with server code are validated on the Tokio blocking pool,
    /// so this must be called from within a Tokio runtime.  Modules
    /// without server code are valid immediately.
    ///
    /// # Panics
    ///
    /// If `def.name` is empty.
    pub fn new(services: WallServices, def: ModuleDefinition, deadline: Deadline) -> Self {
        assert!(
            !def.name.is_empty(),
            "RunningModule requires a named module definition"
        );
        let def = Arc::new(def);

        let validation = if def.server_path.is_none() {
            let (_tx, rx) = watch::channel(Some(true));
            rx
        } else {
            let (tx, rx) = watch::channel(None);
            let verdict = VerdictGuard::new(tx);
            let loader = Arc::clone(&services.loader);
            let geometry = services.geometry.current();
            let def = Arc::clone(&def);
            debug!(module = %def.name, %deadline, "validation started");
            tokio::task::spawn_blocking(move || {
                let mut verdict = verdict;
                verdict.valid = loader.validate(&def, geometry);
            });
            rx
        };

        let instance: InstanceSlot = Arc::new(Mutex::new(None));
        let target = TickTarget::new(&def.name, Arc::clone(&instance));

        Self {
            services,
            def,
            deadline,
            validation,
            instance,
            target,
            resources: None,
            instantiation_id: None,
            route: None,
            ticking: false,
            stage: Stage::Pending,
        }
    }

    /// A run of the built-in blank module.
    pub fn empty(services: WallServices, deadline: Deadline) -> Self {
        Self::new(services, ModuleDefinition::empty(), deadline)
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn definition(&self) -> &ModuleDefinition {
        &self.def
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn state(&self) -> LifecycleState {
        match self.stage {
            Stage::Pending => match *self.validation.borrow() {
                None => LifecycleState::Validating,
                Some(true) => LifecycleState::Valid,
                Some(false) => LifecycleState::Invalid,
            },
            Stage::Instantiated => LifecycleState::Instantiated,
            Stage::Active => LifecycleState::Active,
            Stage::TransitioningOut => LifecycleState::TransitioningOut,
            Stage::Disposed => LifecycleState::Disposed,
        }
    }

    /// `true` once validation has finished and passed.
    pub fn is_valid(&self) -> bool {
        *self.validation.borrow() == Some(true)
    }

    pub fn is_validation_complete(&self) -> bool {
        self.validation.borrow().is_some()
    }

    /// Set by `instantiate`.
    pub fn instantiation_id(&self) -> Option<&InstantiationId> {
        self.instantiation_id.as_ref()
    }

    pub fn has_instance(&self) -> bool {
        self.instance.lock().is_some()
    }

    pub fn has_resources(&self) -> bool {
        self.resources.is_some()
    }

    /// Wait for the validation started by [`new`](Self::new) and return
    /// its verdict.  Never fails; a validation task that died is recorded
    /// as invalid.
    pub fn validate(&self) -> impl Future<Output = bool> + Send + 'static {
        let mut rx = self.validation.clone();
        async move {
            match rx.wait_for(Option::is_some).await {
                Ok(verdict) => verdict.unwrap_or(false),
                Err(_) => false,
            }
        }
    }

    /// Tell every connected client to load this module at the deadline,
    /// then, if the module is valid, allocate its resources and construct
    /// its server instance.
    ///
    /// Clients are told even when the module is invalid; they show a blank
    /// screen for the slot.  Errors are only returned for valid modules and
    /// leave no resources behind.
    pub async fn instantiate(&mut self) -> Result<(), InstantiateError> {
        if self.stage == Stage::Disposed {
            return Err(InstantiateError::Disposed {
                module: self.def.name.clone(),
            });
        }
        if self.stage != Stage::Pending || self.instantiation_id.is_some() {
            return Err(InstantiateError::AlreadyInstantiated {
                module: self.def.name.clone(),
            });
        }

        let valid = self.validate().await;
        let geometry = self.services.geometry.current();
        let id = InstantiationId::new(geometry.fingerprint(), self.deadline);
        self.instantiation_id = Some(id.clone());

        broadcast_load(
            &self.services.clients,
            &self.def,
            self.deadline,
            &geometry,
            &self.services.asset_prefix,
        );

        if !valid {
            warn!(module = %self.def.name, instantiation = %id, "module is invalid, clients will show nothing");
            return Ok(());
        }

        let mut resources = ModuleResources::allocate(
            &id,
            self.services.network.as_ref(),
            self.services.game.as_ref(),
            self.services.state.as_ref(),
        )?;
        let handles = match resources.open() {
            Ok(handles) => handles,
            Err(e) => {
                resources.release();
                return Err(e.into());
            }
        };

        let instance: Box<dyn ServerModule> = if self.def.server_path.is_some() {
            let loader = Arc::clone(&self.services.loader);
            let def = Arc::clone(&self.def);
            let deadline = self.deadline;
            let activated = tokio::task::spawn_blocking(move || {
                loader.activate(&def, deadline, geometry, handles)
            })
            .await;
            match activated {
                Ok(Ok(instance)) => instance,
                Ok(Err(e)) => {
                    resources.release();
                    return Err(e.into());
                }
                Err(e) if e.is_panic() => {
                    resources.release();
                    return Err(LoadError::Panicked {
                        module: self.def.name.clone(),
                        stage: "activation",
                    }
                    .into());
                }
                Err(e) => {
                    resources.release();
                    return Err(e.into());
                }
            }
        } else {
            Box::new(NoopServer)
        };

        *self.instance.lock() = Some(instance);
        self.resources = Some(resources);
        self.route = Some(
            self.services
                .routes
                .register_route(&self.def.name, self.def.root()),
        );
        self.stage = Stage::Instantiated;
        info!(module = %self.def.name, instantiation = %id, "module instantiated");
        Ok(())
    }

    /// Send this run's load instruction to one client, e.g. one that
    /// connected after [`instantiate`](Self::instantiate) broadcast it.
    pub fn tell_client(&self, client: &ClientHandle) -> bool {
        tell_client_to_play(
            client,
            &self.def,
            self.deadline,
            &self.services.geometry.current(),
            &self.services.asset_prefix,
        )
    }

    /// Forward one frame to the instance.  No-op without an instance.
    pub fn tick(&self, now: Timestamp, delta: Duration) {
        self.target.tick(now, delta);
    }

    /// Start receiving ticks.
    pub fn begin_transition_in(&mut self) {
        if self.stage == Stage::Disposed {
            warn!(module = %self.def.name, "transition in after dispose ignored");
            return;
        }
        if !self.ticking {
            self.services.ticker.add(self.target.clone());
            self.ticking = true;
        }
        self.stage = Stage::Active;
    }

    pub fn finish_transition_in(&mut self) {
        debug!(module = %self.def.name, "transition in finished");
    }

    pub fn begin_transition_out(&mut self) {
        if self.stage != Stage::Disposed {
            self.stage = Stage::TransitioningOut;
        }
    }

    /// Stop receiving ticks.
    pub fn finish_transition_out(&mut self) {
        self.stop_ticking();
    }

    /// Resolve once the wall clock reaches `finish`.
    ///
    /// `other` is the module on the other side of the transition; both
    /// stay alive until the deadline, nothing of its state is read.
    pub fn perform_transition(
        &self,
        other: &RunningModule,
        finish: Deadline,
    ) -> impl Future<Output = ()> + Send + 'static {
        let clock = Arc::clone(&self.services.clock);
        debug!(from = %self.def.name, to = %other.name(), %finish, "transition scheduled");
        async move {
            loop {
                let remaining = time::until(clock.as_ref(), finish);
                if remaining.is_zero() {
                    break;
                }
                tokio::time::sleep(remaining).await;
            }
        }
    }

    /// Let the instance prepare before it becomes visible at the deadline.
    pub fn will_be_shown_soon(
        &self,
    ) -> impl Future<Output = Result<(), ModuleError>> + Send + 'static {
        let preparation = self
            .instance
            .lock()
            .as_mut()
            .map(|instance| instance.will_be_shown_soon(self.deadline));
        async move {
            match preparation {
                Some(preparation) => preparation.await,
                None => Ok(()),
            }
        }
    }

    /// Tear the run down.  Safe in any state; only the first call acts.
    pub fn dispose(&mut self) {
        if self.stage == Stage::Disposed {
            return;
        }
        self.stage = Stage::Disposed;
        self.stop_ticking();

        let instance = self.instance.lock().take();
        if let Some(mut instance) = instance {
            if catch_unwind(AssertUnwindSafe(|| instance.dispose())).is_err() {
                error!(module = %self.def.name, "dispose hook panicked");
            }
        }

        if let Some(mut resources) = self.resources.take() {
            resources.release();
        }
        if let Some(route) = self.route.take() {
            self.services.routes.unregister_route(route);
        }
        info!(module = %self.def.name, deadline = %self.deadline, "module disposed");
    }

    fn stop_ticking(&mut self) {
        if self.ticking {
            self.services.ticker.remove(&self.target);
            self.ticking = false;
        }
    }
}

// ── Validation verdict ────────────────────────────────────────────────────────

/// Publishes `valid` when dropped.  Starts out `false`, so a validation
/// task that panics or is dropped unrun still leaves a verdict behind.
struct VerdictGuard {
    tx: watch::Sender<Option<bool>>,
    valid: bool,
}

impl VerdictGuard {
    fn new(tx: watch::Sender<Option<bool>>) -> Self {
        Self { tx, valid: false }
    }
}

impl Drop for VerdictGuard {
    fn drop(&mut self) {
        // The run may already be gone; nobody is left to tell.
        let _ = self.tx.send(Some(self.valid));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{ClientMessage, LoadModuleMessage};
    use crate::geometry::WallGeometry;
    use crate::loader::{ModuleContext, ModuleRegistry, ServerExports};
    use crate::resources::ModuleNetwork;
    use crate::server::Preparation;
    use crate::services::LocalServices;
    use crate::time::{Clock, TokioClock};
    use serde_json::json;
    use std::path::PathBuf;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Counter {
        network: Arc<dyn ModuleNetwork>,
    }

    impl ServerModule for Counter {
        fn tick(&mut self, now: Timestamp, _delta: Duration) {
            self.network.emit("tick", json!(now.as_millis()));
        }

        fn dispose(&mut self) {
            self.network.emit("disposed", json!(null));
        }

        fn will_be_shown_soon(&mut self, deadline: Deadline) -> Preparation {
            let network = Arc::clone(&self.network);
            Box::pin(async move {
                network.emit("prepared", json!(deadline.as_millis()));
                Ok(())
            })
        }
    }

    fn counter_entry(ctx: &ModuleContext) -> Result<ServerExports, ModuleError> {
        let network = Arc::clone(&ctx.network);
        Ok(ServerExports::new(move |_config, _deadline| {
            Ok(Box::new(Counter { network }) as Box<dyn ServerModule>)
        }))
    }

    fn broken_entry(_ctx: &ModuleContext) -> Result<ServerExports, ModuleError> {
        Ok(
            ServerExports::new(|_c, _d| Ok(Box::new(NoopServer) as Box<dyn ServerModule>))
                .without_member("will_be_shown_soon"),
        )
    }

    fn fussy_entry(_ctx: &ModuleContext) -> Result<ServerExports, ModuleError> {
        Ok(ServerExports::new(|_c, _d| {
            Err(ModuleError::InvalidConfig("no config given".into()))
        }))
    }

    fn local() -> LocalServices {
        let mut reg = ModuleRegistry::new();
        reg.register("mods/counter/server", counter_entry);
        reg.register("mods/broken/server", broken_entry);
        reg.register("mods/fussy/server", fussy_entry);
        LocalServices::new(
            reg,
            WallGeometry::unit(),
            Arc::new(TokioClock::starting_at(Timestamp::from_millis(0))),
        )
    }

    fn def(name: &str) -> ModuleDefinition {
        ModuleDefinition::new(name, format!("mods/{name}")).with_server("server")
    }

    fn drain(rx: &mut UnboundedReceiver<ClientMessage>) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn loads(msgs: &[ClientMessage]) -> Vec<&LoadModuleMessage> {
        msgs.iter()
            .filter_map(|m| match m {
                ClientMessage::LoadModule(load) => Some(load),
                _ => None,
            })
            .collect()
    }

    fn events(msgs: &[ClientMessage]) -> Vec<(String, serde_json::Value)> {
        msgs.iter()
            .filter_map(|m| match m {
                ClientMessage::ModuleEvent(ev) => Some((ev.event.clone(), ev.payload.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn module_without_server_code_is_valid_at_once() {
        let local = local();
        let m = RunningModule::new(
            local.services.clone(),
            ModuleDefinition::new("clock", "mods/clock"),
            Timestamp::from_millis(1000),
        );
        assert!(m.is_valid());
        assert!(m.is_validation_complete());
        assert_eq!(m.state(), LifecycleState::Valid);
    }

    #[test]
    #[should_panic(expected = "named module definition")]
    fn unnamed_definition_is_rejected() {
        let local = local();
        let _ = RunningModule::new(
            local.services.clone(),
            ModuleDefinition::new("", "mods/x"),
            Timestamp::from_millis(1),
        );
    }

    #[tokio::test]
    async fn clock_scenario() {
        let local = local();
        let (_, mut rx) = local.clients().connect();
        let mut m = RunningModule::new(
            local.services.clone(),
            ModuleDefinition::new("clock", "mods/clock"),
            Timestamp::from_millis(1000),
        );
        assert!(m.is_valid());

        m.instantiate().await.unwrap();

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(
            serde_json::to_value(&msgs[0]).unwrap(),
            json!({
                "type": "loadModule",
                "data": {
                    "module": {"name": "clock", "path": "", "config": null, "credit": null},
                    "time": 1000,
                    "geo": [
                        {"x": 0.0, "y": 0.0},
                        {"x": 1.0, "y": 0.0},
                        {"x": 1.0, "y": 1.0},
                        {"x": 0.0, "y": 1.0}
                    ]
                }
            })
        );
        assert!(m.has_instance());
        assert!(m.has_resources());
        assert_eq!(m.state(), LifecycleState::Instantiated);
        assert_eq!(m.instantiation_id().unwrap().to_string(), "0,0,1,1-1000");
    }

    #[tokio::test]
    async fn contract_violation_makes_module_invalid() {
        let local = local();
        let m = RunningModule::new(local.services.clone(), def("broken"), Timestamp::from_millis(1));
        assert!(!m.validate().await);
        assert!(m.is_validation_complete());
        assert!(!m.is_valid());
        assert_eq!(m.state(), LifecycleState::Invalid);
    }

    #[tokio::test]
    async fn unregistered_entry_makes_module_invalid() {
        let local = local();
        let m = RunningModule::new(local.services.clone(), def("ghost"), Timestamp::from_millis(1));
        assert!(!m.validate().await);
    }

    #[tokio::test]
    async fn invalid_module_still_tells_every_client_once() {
        let local = local();
        let mut rxs: Vec<_> = (0..3).map(|_| local.clients().connect().1).collect();
        let mut m = RunningModule::new(local.services.clone(), def("broken"), Timestamp::from_millis(2000));

        m.instantiate().await.unwrap();

        for rx in rxs.iter_mut() {
            let msgs = drain(rx);
            assert_eq!(msgs.len(), 1);
            assert_eq!(loads(&msgs)[0].module.name, "broken");
        }
        assert!(!m.has_instance());
        assert!(!m.has_resources());
        assert!(local.state.namespaces().is_empty());
        assert!(local.routes.is_empty());
        assert_eq!(m.state(), LifecycleState::Invalid);
        m.tick(Timestamp::from_millis(2001), Duration::from_millis(16));
    }

    #[tokio::test]
    async fn valid_module_with_many_clients() {
        let local = local();
        let mut rxs: Vec<_> = (0..4).map(|_| local.clients().connect().1).collect();
        let mut m = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(5000));

        m.instantiate().await.unwrap();

        let first: Vec<_> = rxs.iter_mut().map(drain).collect();
        for msgs in &first {
            let load = loads(msgs);
            assert_eq!(load.len(), 1);
            assert_eq!(load[0].time, Timestamp::from_millis(5000));
            assert_eq!(load[0].geo, WallGeometry::unit().points);
        }
        assert!(m.has_instance());
        let id = m.instantiation_id().unwrap();
        assert!(local.network.namespaces().contains(id));
        assert!(local.game.namespaces().contains(id));
        assert!(local.state.namespaces().contains(id));
        assert_eq!(local.routes.resolve("counter"), Some(PathBuf::from("mods/counter")));
    }

    #[tokio::test]
    async fn ticks_flow_only_while_registered() {
        let local = local();
        let (_, mut rx) = local.clients().connect();
        let mut m = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(10));
        m.instantiate().await.unwrap();
        drain(&mut rx);

        local.ticker.frame(Timestamp::from_millis(20));
        assert!(events(&drain(&mut rx)).is_empty());

        m.begin_transition_in();
        m.finish_transition_in();
        assert_eq!(m.state(), LifecycleState::Active);
        local.ticker.frame(Timestamp::from_millis(36));
        assert_eq!(events(&drain(&mut rx)), vec![("tick".to_string(), json!(36))]);

        m.begin_transition_out();
        assert_eq!(m.state(), LifecycleState::TransitioningOut);
        m.finish_transition_out();
        local.ticker.frame(Timestamp::from_millis(52));
        assert!(events(&drain(&mut rx)).is_empty());
        assert!(local.ticker.is_empty());
    }

    #[tokio::test]
    async fn dispose_twice_releases_once() {
        let local = local();
        let (_, mut rx) = local.clients().connect();
        let mut m = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(10));
        m.instantiate().await.unwrap();
        m.begin_transition_in();
        drain(&mut rx);

        m.dispose();
        m.dispose();

        assert_eq!(events(&drain(&mut rx)), vec![("disposed".to_string(), json!(null))]);
        assert_eq!(m.state(), LifecycleState::Disposed);
        assert!(!m.has_instance());
        assert!(!m.has_resources());
        assert!(local.network.namespaces().is_empty());
        assert!(local.game.namespaces().is_empty());
        assert!(local.state.namespaces().is_empty());
        assert!(local.routes.resolve("counter").is_none());
        assert!(local.ticker.is_empty());

        m.tick(Timestamp::from_millis(99), Duration::ZERO);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn dispose_is_safe_before_instantiate_and_after_invalid() {
        let local = local();
        let mut pending = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(1));
        pending.dispose();
        assert_eq!(pending.state(), LifecycleState::Disposed);

        let mut invalid = RunningModule::new(local.services.clone(), def("broken"), Timestamp::from_millis(2));
        invalid.instantiate().await.unwrap();
        invalid.dispose();
        invalid.dispose();
        assert!(local.routes.is_empty());
    }

    #[tokio::test]
    async fn runs_with_different_deadlines_do_not_collide() {
        let local = local();
        let mut a = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(1000));
        let mut b = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(2000));
        a.instantiate().await.unwrap();
        b.instantiate().await.unwrap();

        assert_ne!(a.instantiation_id(), b.instantiation_id());
        assert_eq!(local.state.namespaces().len(), 2);

        a.dispose();
        let b_id = b.instantiation_id().unwrap();
        assert!(local.state.namespaces().contains(b_id));
        assert_eq!(local.state.namespaces().len(), 1);
    }

    #[tokio::test]
    async fn failed_construction_leaves_nothing_allocated() {
        let local = local();
        let (_, mut rx) = local.clients().connect();
        let mut m = RunningModule::new(local.services.clone(), def("fussy"), Timestamp::from_millis(7));

        let err = m.instantiate().await.unwrap_err();
        assert!(matches!(
            err,
            InstantiateError::Load(LoadError::ConstructFailed { .. })
        ));
        assert_eq!(loads(&drain(&mut rx)).len(), 1, "clients are told regardless");
        assert!(!m.has_instance());
        assert!(!m.has_resources());
        assert!(local.network.namespaces().is_empty());
        assert!(local.game.namespaces().is_empty());
        assert!(local.state.namespaces().is_empty());
        assert!(local.routes.is_empty());
        m.dispose();
    }

    #[tokio::test]
    async fn instantiate_after_dispose_is_rejected() {
        let local = local();
        let (_, mut rx) = local.clients().connect();
        let mut m = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(3));
        m.dispose();
        assert!(matches!(
            m.instantiate().await,
            Err(InstantiateError::Disposed { .. })
        ));
        assert!(drain(&mut rx).is_empty());
        assert!(local.state.namespaces().is_empty());
    }

    #[tokio::test]
    async fn handover_between_runs_of_one_module_keeps_the_route() {
        let local = local();
        let mut prev = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(1000));
        prev.instantiate().await.unwrap();
        prev.begin_transition_in();

        let mut next = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(2000));
        next.instantiate().await.unwrap();
        next.begin_transition_in();
        prev.begin_transition_out();
        prev.finish_transition_out();
        prev.dispose();
        next.finish_transition_in();

        assert!(next.has_instance());
        assert_eq!(local.routes.resolve("counter"), Some(PathBuf::from("mods/counter")));
        assert_eq!(local.ticker.len(), 1);

        next.dispose();
        assert!(local.routes.is_empty());
    }

    #[tokio::test]
    async fn dead_validation_task_still_records_a_verdict() {
        let (tx, rx) = watch::channel(None);
        let verdict = VerdictGuard::new(tx);
        let task = tokio::task::spawn_blocking(move || {
            let _verdict = verdict;
            panic!("validation died");
        });
        assert!(task.await.is_err());
        assert_eq!(*rx.borrow(), Some(false));
    }

    #[test]
    fn verdict_guard_publishes_the_result() {
        let (tx, rx) = watch::channel(None);
        let mut verdict = VerdictGuard::new(tx);
        verdict.valid = true;
        drop(verdict);
        assert_eq!(*rx.borrow(), Some(true));
    }

    #[tokio::test]
    async fn instantiate_twice_is_rejected() {
        let local = local();
        let mut m = RunningModule::empty(local.services.clone(), Timestamp::from_millis(3));
        m.instantiate().await.unwrap();
        assert!(matches!(
            m.instantiate().await,
            Err(InstantiateError::AlreadyInstantiated { .. })
        ));
    }

    #[tokio::test]
    async fn empty_module_runs_the_noop_server() {
        let local = local();
        let (_, mut rx) = local.clients().connect();
        let mut m = RunningModule::empty(local.services.clone(), Timestamp::from_millis(3));
        m.instantiate().await.unwrap();

        let msgs = drain(&mut rx);
        let load = loads(&msgs);
        assert_eq!(load[0].module.name, "_empty");
        assert_eq!(load[0].module.path, "");
        assert!(m.has_instance());
        assert!(m.will_be_shown_soon().await.is_ok());
    }

    #[tokio::test]
    async fn will_be_shown_soon_reaches_the_instance() {
        let local = local();
        let (_, mut rx) = local.clients().connect();
        let mut m = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(4000));
        assert!(m.will_be_shown_soon().await.is_ok(), "no instance yet");

        m.instantiate().await.unwrap();
        drain(&mut rx);
        m.will_be_shown_soon().await.unwrap();
        assert_eq!(events(&drain(&mut rx)), vec![("prepared".to_string(), json!(4000))]);
    }

    #[tokio::test]
    async fn late_client_gets_the_same_instruction() {
        let local = local();
        let mut m = RunningModule::new(local.services.clone(), def("counter"), Timestamp::from_millis(900));
        m.instantiate().await.unwrap();

        let (id, mut rx) = local.clients().connect();
        let handle = local.clients().get(id).unwrap();
        assert!(m.tell_client(&handle));
        let msgs = drain(&mut rx);
        assert_eq!(loads(&msgs)[0].time, Timestamp::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn perform_transition_waits_for_the_deadline() {
        let local = local();
        let clock = Arc::clone(&local.services.clock);
        let a = RunningModule::new(local.services.clone(), ModuleDefinition::new("a", "mods/a"), Timestamp::from_millis(0));
        let b = RunningModule::new(local.services.clone(), ModuleDefinition::new("b", "mods/b"), Timestamp::from_millis(0));

        let transition = a.perform_transition(&b, Timestamp::from_millis(500));
        tokio::pin!(transition);
        assert!(
            tokio::time::timeout(Duration::from_millis(499), &mut transition)
                .await
                .is_err(),
            "resumed early"
        );
        transition.await;
        assert!(clock.now() >= Timestamp::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn perform_transition_with_past_deadline_returns_at_once() {
        let local = local();
        let a = RunningModule::empty(local.services.clone(), Timestamp::from_millis(0));
        let b = RunningModule::empty(local.services.clone(), Timestamp::from_millis(0));
        tokio::time::advance(Duration::from_millis(50)).await;

        let before = local.services.clock.now();
        a.perform_transition(&b, Timestamp::from_millis(10)).await;
        assert_eq!(local.services.clock.now(), before);
    }
}
