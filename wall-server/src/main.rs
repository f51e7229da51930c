/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use wall_server::broadcast::{ClientId, ClientMessage};
use wall_server::builtin;
use wall_server::config::{ModuleCatalog, WallConfig};
use wall_server::definition::ModuleDefinition;
use wall_server::running::RunningModule;
use wall_server::services::{LocalServices, WallServices};
use wall_server::time::{self, Deadline};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Wall server: runs modules in turn, switching every screen at the same
/// instant.
///
/// Example:
///   wall-server --config wall.yaml -m clock -m slides --module-duration 60
#[derive(Debug, Parser)]
#[command(
    name = "wall-server",
    about = "Wall module lifecycle server",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML wall configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Module to run; repeat to build a playlist.  Defaults to every module
    /// in the catalog.
    #[arg(short = 'm', long = "module")]
    modules: Vec<String>,

    /// Seconds each module stays on the wall.
    #[arg(short = 'd', long = "module-duration", default_value_t = 30)]
    module_duration: u64,

    /// Milliseconds between scheduling a module and its switch deadline.
    #[arg(short = 'l', long = "lead-time", default_value_t = 2000)]
    lead_time: u64,

    /// Play the playlist once and exit instead of looping.
    #[arg(long = "once", default_value_t = false)]
    once: bool,
}

// ── Playlist ──────────────────────────────────────────────────────────────────

/// Resolve the requested module names against the catalog.
fn select_modules(catalog: &ModuleCatalog, names: &[String]) -> Result<Vec<ModuleDefinition>> {
    if names.is_empty() {
        return Ok(catalog.definitions().cloned().collect());
    }
    names
        .iter()
        .map(|name| match catalog.get(name) {
            Some(def) => Ok(def.clone()),
            None => bail!(
                "unknown module '{name}' (known: {})",
                catalog.names().join(", ")
            ),
        })
        .collect()
}

/// Runs one module after another on the wall.
struct Player {
    services: WallServices,
    playlist: Vec<ModuleDefinition>,
    lead_time: Duration,
    module_duration: Duration,
    current: Option<RunningModule>,
}

impl Player {
    async fn play(&mut self, once: bool) -> Result<()> {
        let mut start = self.services.clock.now();
        loop {
            for def in self.playlist.clone() {
                sleep_until(&self.services, start).await;
                let deadline = self.services.clock.now().saturating_add(self.lead_time);
                self.switch_to(def, deadline).await?;
                start = deadline.saturating_add(self.module_duration.saturating_sub(self.lead_time));
            }
            if once {
                sleep_until(&self.services, start.saturating_add(self.lead_time)).await;
                return Ok(());
            }
        }
    }

    /// Bring up `def` for `deadline` and retire the module currently shown.
    async fn switch_to(&mut self, def: ModuleDefinition, deadline: Deadline) -> Result<()> {
        let name = def.name.clone();
        let mut next = RunningModule::new(self.services.clone(), def, deadline);
        if let Err(e) = next.instantiate().await {
            error!(module = %name, error = %e, "instantiate failed, showing blank module instead");
            next.dispose();
            next = RunningModule::empty(self.services.clone(), deadline);
            next.instantiate().await?;
        }
        if let Err(e) = next.will_be_shown_soon().await {
            warn!(module = %name, error = %e, "preparation failed");
        }

        next.begin_transition_in();
        match self.current.as_mut() {
            Some(prev) => {
                prev.begin_transition_out();
                next.perform_transition(prev, deadline).await;
                prev.finish_transition_out();
                prev.dispose();
            }
            None => sleep_until(&self.services, deadline).await,
        }
        next.finish_transition_in();
        info!(module = %next.name(), %deadline, "now showing");

        self.current = Some(next);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(mut current) = self.current.take() {
            current.finish_transition_out();
            current.dispose();
        }
    }
}

async fn sleep_until(services: &WallServices, at: Deadline) {
    let remaining = time::until(services.clock.as_ref(), at);
    if !remaining.is_zero() {
        tokio::time::sleep(remaining).await;
    }
}

/// Stand-in for a screen: logs what it is told.
async fn log_client(id: ClientId, mut rx: UnboundedReceiver<ClientMessage>) {
    while let Some(msg) = rx.recv().await {
        match &msg {
            ClientMessage::LoadModule(load) => info!(
                client = %id,
                module = %load.module.name,
                path = %load.module.path,
                time = %load.time,
                "load module"
            ),
            ClientMessage::ModuleEvent(event) => debug!(
                client = %id,
                instance = %event.instance,
                event = %event.event,
                payload = %event.payload,
                "module event"
            ),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=wall::module=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(
        config          = ?cli.config,
        modules         = ?cli.modules,
        module_duration = cli.module_duration,
        lead_time       = cli.lead_time,
        once            = cli.once,
        "Configuration"
    );

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => WallConfig::load_from_file(path)?,
        None => {
            warn!("No configuration file provided, using built-in modules on a 1x1 wall");
            WallConfig::default()
        }
    };
    if cli.lead_time >= cli.module_duration.saturating_mul(1000) {
        bail!("--lead-time must be shorter than --module-duration");
    }
    let playlist = select_modules(&config.catalog, &cli.modules)?;
    if playlist.is_empty() {
        bail!("nothing to play");
    }
    info!(modules = ?playlist.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(), "playlist");

    let local = LocalServices::system(builtin::registry(), config.geometry.clone())
        .with_asset_prefix(config.module_asset_prefix.clone());
    let services = local.services.clone();

    let ticker = tokio::spawn(
        Arc::clone(&local.ticker).run(Arc::clone(&services.clock), config.tick_interval),
    );
    let (client, rx) = services.clients.connect();
    let screen = tokio::spawn(log_client(client, rx));

    let mut player = Player {
        services,
        playlist,
        lead_time: Duration::from_millis(cli.lead_time),
        module_duration: Duration::from_secs(cli.module_duration),
        current: None,
    };

    let result = tokio::select! {
        result = player.play(cli.once) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };
    player.shutdown();
    ticker.abort();
    screen.abort();
    result
}
