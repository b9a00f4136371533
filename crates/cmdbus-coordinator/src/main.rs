// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Coordinator binary (C3): accepts connections, assigns global sequence
//! numbers, persists them durably, broadcasts to participants, and serves
//! paged history to joiners.

mod admin;
mod config;
mod connection;
mod paths;
mod state;

use crate::config::CoordinatorPrefs;
use crate::paths::SessionPaths;
use crate::state::CoordinatorState;
use anyhow::{Context, Result};
use clap::Parser;
use cmdbus_app_core::config::ConfigService;
use cmdbus_config_fs::FsConfigStore;
use cmdbus_log::SessionLog;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Session coordinator for the cmdbus command bus.
#[derive(Debug, Parser)]
#[command(name = "cmdbus-coordinator", version, about)]
struct Cli {
    /// Directory holding this session's log, initial world, and snapshot.
    #[arg(long, value_name = "PATH")]
    session_dir: std::path::PathBuf,

    /// TCP port to listen on; overrides the persisted default (§6).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config: Option<ConfigService<FsConfigStore>> =
        FsConfigStore::new().map(ConfigService::new).ok();
    let mut prefs: CoordinatorPrefs = config
        .as_ref()
        .and_then(|c| c.load::<CoordinatorPrefs>("coordinator").ok().flatten())
        .unwrap_or_default();
    if let Some(cfg) = &config {
        let _ = cfg.save("coordinator", &prefs);
    }
    if let Some(port) = cli.port {
        prefs.port = port;
    }

    let paths = SessionPaths::new(&cli.session_dir)?;
    let log = SessionLog::open(paths.history_log())
        .with_context(|| format!("opening session log under {}", cli.session_dir.display()))?;
    let world = paths.load_initial_world()?;
    let snapshot = paths.load_snapshot()?.map(Arc::new);

    info!(
        session_dir = %cli.session_dir.display(),
        highest_seq = log.highest_seq(),
        "recovered session state"
    );

    let state = Arc::new(Mutex::new(CoordinatorState::new(
        log,
        world,
        prefs.page_size,
    )));

    let addr = SocketAddr::from(([0, 0, 0, 0], prefs.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "coordinator listening");

    let admin_task = tokio::spawn(admin::run(state.clone(), paths.clone()));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let state = state.clone();
                let snapshot = snapshot.clone();
                tokio::spawn(async move {
                    if let Err(err) = connection::handle_connection(stream, state, snapshot).await {
                        warn!(?peer, ?err, "connection handler exited with error");
                    }
                });
            }
            _ = signal::ctrl_c() => {
                info!("received shutdown signal, closing listener");
                admin_task.abort();
                return Ok(());
            }
        }
    }
}
