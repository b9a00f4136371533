// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Sequencer (C5): durable cursor, strictly ordered dispatch to the
//! external orchestrator (§4.5).
//!
//! Runs as its own task, woken by an in-process channel from the client
//! link whenever `commands.log` grows (§9 Design Notes: the filesystem
//! stays the source of truth for recovery, but the hot path is a
//! channel). Because dispatch happens serially inside this one task,
//! "at most one orchestrator subprocess at a time" is structural rather
//! than lock-enforced — there is no second task that could race it.

use crate::orchestrator::{self, Outcome};
use crate::paths::ParticipantPaths;
use anyhow::{Context, Result};
use cmdbus_log::{ClientLog, Cursor};
use cmdbus_proto::SequencedCommand;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Messages the client link posts to the sequencer task.
pub enum SequencerSignal {
    /// New records may be available in `commands.log`; re-check.
    Wake,
    /// A `reset` is in progress: finish any in-flight dispatch, zero the
    /// cursor, then ack so the client link can safely truncate the log.
    PrepareReset(oneshot::Sender<()>),
}

/// Spawn the sequencer task. Returns its signal sender and a join handle
/// the caller must await alongside the client link's — per §7, a cursor
/// persistence failure or local-log I/O error is fatal to the participant,
/// so it must be able to end the process rather than die silently in a
/// detached task.
pub fn spawn(
    paths: ParticipantPaths,
    orchestrator_path: PathBuf,
    username: String,
) -> (mpsc::UnboundedSender<SequencerSignal>, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run(paths, orchestrator_path, username, rx));
    (tx, handle)
}

async fn run(
    paths: ParticipantPaths,
    orchestrator_path: PathBuf,
    username: String,
    mut rx: mpsc::UnboundedReceiver<SequencerSignal>,
) -> Result<()> {
    let log_path = paths.commands_log();
    let cursor = Cursor::new(paths.cursor_file());
    let client_dir = paths.root();

    drain(&log_path, &cursor, &orchestrator_path, &username, client_dir)
        .await
        .context("sequencer failed to catch up on startup")?;

    while let Some(signal) = rx.recv().await {
        match signal {
            SequencerSignal::Wake => {
                drain(&log_path, &cursor, &orchestrator_path, &username, client_dir)
                    .await
                    .context("sequencer failed mid-drain")?;
            }
            SequencerSignal::PrepareReset(ack) => {
                // A failed cursor reset is fatal (§7): without it, a
                // re-dispatch after restart could start from a cursor
                // value that no longer matches the log it is about to
                // truncate, risking a replayed seq diverging from other
                // participants.
                cursor
                    .advance_to(0)
                    .context("failed to reset cursor durably")?;
                let _ = ack.send(());
            }
        }
    }
    Ok(())
}

/// Dispatch every record past the current cursor, in order, blocking on
/// each subprocess before considering the next (§4.5 invariant 1–3).
async fn drain(
    log_path: &Path,
    cursor: &Cursor,
    orchestrator_path: &Path,
    username: &str,
    client_dir: &Path,
) -> Result<()> {
    let log = ClientLog::open(log_path).context("opening client log for dispatch")?;
    let mut c = cursor.read().context("reading sequencer cursor")?;

    loop {
        let pending = log.read_from(c + 1).context("reading pending records")?;
        let Some(record) = pending.into_iter().find(|r| r.seq == c + 1) else {
            return Ok(());
        };
        dispatch_one(&record, orchestrator_path, username, client_dir).await;
        cursor
            .advance_to(record.seq)
            .context("persisting sequencer cursor")?;
        c = record.seq;
    }
}

/// Spawn the orchestrator for one record and advance past it regardless
/// of outcome (§4.5 step 4, §7: subprocess failure is never fatal to the
/// sequencer — the order is the source of truth).
async fn dispatch_one(record: &SequencedCommand, orchestrator_path: &Path, username: &str, client_dir: &Path) {
    let command_name = shlex::split(&record.command.text)
        .and_then(|words| words.into_iter().next())
        .unwrap_or_else(|| record.command.text.clone());

    info!(seq = record.seq, command = %command_name, "dispatching command");

    match orchestrator::invoke(orchestrator_path, &record.command.text, username, client_dir).await {
        Ok(outcome @ (Outcome::Changed | Outcome::Unchanged)) => {
            info!(seq = record.seq, ?outcome, "orchestrator succeeded");
        }
        Ok(Outcome::Failed(code)) => {
            warn!(seq = record.seq, ?code, "orchestrator reported failure");
        }
        Err(err) => {
            warn!(seq = record.seq, ?err, "failed to spawn orchestrator");
        }
    }
}
