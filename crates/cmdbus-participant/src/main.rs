// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Participant binary (C4 + C5): the client link and the sequencer share
//! one process and one `--dir`, per spec.md's Design Notes — the source's
//! two-process split exists only for tooling convenience and is not part
//! of the core contract.

mod client_link;
mod config;
mod orchestrator;
mod paths;
mod sequencer;
mod snapshot;

use crate::client_link::ClientLink;
use crate::config::ParticipantPrefs;
use crate::paths::ParticipantPaths;
use crate::snapshot::{SnapshotInstaller, ZipSnapshotInstaller};
use anyhow::Result;
use clap::Parser;
use cmdbus_app_core::config::ConfigService;
use cmdbus_config_fs::FsConfigStore;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Client link plus sequencer for one participant in a cmdbus session.
#[derive(Debug, Parser)]
#[command(name = "cmdbus-participant", version, about)]
struct Cli {
    /// Participant directory (holds data/ and scripts/).
    #[arg(long, value_name = "PATH")]
    dir: std::path::PathBuf,

    /// Display name sent with every command.
    #[arg(long)]
    username: String,

    /// Coordinator address; overrides the persisted default.
    #[arg(long = "server-ip")]
    server_ip: Option<String>,

    /// Coordinator port; overrides the persisted default.
    #[arg(long = "server-port")]
    server_port: Option<u16>,

    /// Orchestrator entry point; defaults to `<dir>/scripts/orchestrator`.
    #[arg(long)]
    orchestrator: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config: Option<ConfigService<FsConfigStore>> =
        FsConfigStore::new().map(ConfigService::new).ok();
    let mut prefs: ParticipantPrefs = config
        .as_ref()
        .and_then(|c| c.load::<ParticipantPrefs>("participant").ok().flatten())
        .unwrap_or_default();
    if let Some(cfg) = &config {
        let _ = cfg.save("participant", &prefs);
    }
    if let Some(ip) = cli.server_ip {
        prefs.server_ip = ip;
    }
    if let Some(port) = cli.server_port {
        prefs.server_port = port;
    }

    let paths = ParticipantPaths::new(&cli.dir)?;
    let orchestrator = cli.orchestrator.unwrap_or_else(|| paths.default_orchestrator());

    let (sequencer_tx, sequencer_handle) =
        sequencer::spawn(paths.clone(), orchestrator, cli.username.clone());

    let installer: Arc<dyn SnapshotInstaller + Send + Sync> = Arc::new(ZipSnapshotInstaller);
    let (link, receive_handle) = ClientLink::connect(
        (prefs.server_ip.clone(), prefs.server_port),
        paths,
        installer,
        sequencer_tx,
    )
    .await?;

    info!(
        server = %format!("{}:{}", prefs.server_ip, prefs.server_port),
        dir = %cli.dir.display(),
        "participant connected"
    );

    let username = cli.username.clone();
    let send_task = tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if let Err(err) = link.send_command(&username, text) {
                warn!(?err, "send failed, link disconnected");
                break;
            }
        }
    });

    // A fatal sequencer error (cursor persistence failure, local-log I/O
    // error — §7) must end the process rather than leave the participant
    // running with a sequencer that silently stopped dispatching.
    tokio::select! {
        res = receive_handle => {
            res??;
        }
        res = sequencer_handle => {
            res??;
        }
        _ = send_task => {}
    }

    Ok(())
}
