// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client link (C4): open the connection, decode frames, and persist
//! sequenced commands into the local log (§4.4).

use crate::paths::ParticipantPaths;
use crate::sequencer::SequencerSignal;
use crate::snapshot::SnapshotInstaller;
use anyhow::{Context, Result};
use cmdbus_log::ClientLog;
use cmdbus_proto::{frame, Command, ControlMessage, SequencedCommand, WireMessage};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Catch-up bookkeeping the receive loop tracks while paging history
/// (§4.4). Live broadcasts can arrive interleaved with history pages; out
/// of order records are buffered here until the gap closes.
#[derive(Default)]
struct CatchUp {
    highest_seq: Option<u64>,
    next_seq_pull: u64,
    pending: BTreeMap<u64, SequencedCommand>,
}

/// A connected participant's link to the coordinator.
pub struct ClientLink {
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ClientLink {
    /// Connect to the coordinator and start the receive loop.
    ///
    /// Returns the link (for sending commands) and the receive loop's
    /// join handle; the caller awaits the handle for the connection's
    /// lifetime.
    pub async fn connect(
        server_addr: (String, u16),
        paths: ParticipantPaths,
        installer: Arc<dyn SnapshotInstaller + Send + Sync>,
        sequencer_tx: mpsc::UnboundedSender<SequencerSignal>,
    ) -> Result<(Self, JoinHandle<Result<()>>)> {
        let stream = TcpStream::connect((server_addr.0.as_str(), server_addr.1))
            .await
            .with_context(|| format!("connecting to {}:{}", server_addr.0, server_addr.1))?;
        let (mut reader, mut writer) = stream.into_split();
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        tokio::spawn(async move {
            while let Some(buf) = write_rx.recv().await {
                if writer.write_all(&buf).await.is_err() {
                    break;
                }
            }
        });

        let write_tx_for_loop = write_tx.clone();
        let handle = tokio::spawn(async move {
            receive_loop(&mut reader, paths, installer, sequencer_tx, write_tx_for_loop).await
        });

        Ok((Self { write_tx }, handle))
    }

    /// Send a text command to the coordinator (§4.4 "Send").
    pub fn send_command(&self, username: &str, text: &str) -> Result<()> {
        let frame = frame::encode(&Command {
            username: username.to_string(),
            text: text.to_string(),
        })?;
        self.write_tx
            .send(frame)
            .map_err(|_| anyhow::anyhow!("link disconnected"))
    }
}

async fn receive_loop(
    reader: &mut tokio::net::tcp::OwnedReadHalf,
    paths: ParticipantPaths,
    installer: Arc<dyn SnapshotInstaller + Send + Sync>,
    sequencer_tx: mpsc::UnboundedSender<SequencerSignal>,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
) -> Result<()> {
    let mut log = ClientLog::open(paths.commands_log()).context("opening local command log")?;
    let mut decoder = frame::Decoder::new();
    let mut catch_up = CatchUp::default();
    let mut buf = vec![0u8; 16 * 1024];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            info!("coordinator closed the connection");
            return Ok(());
        }

        let values = decoder.feed(&buf[..n])?;
        for value in values {
            let Some(msg) = WireMessage::classify(value) else {
                continue;
            };
            handle_message(
                msg,
                &paths,
                &installer,
                &mut log,
                &mut catch_up,
                &sequencer_tx,
                &write_tx,
            )
            .await?;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_message(
    msg: WireMessage,
    paths: &ParticipantPaths,
    installer: &Arc<dyn SnapshotInstaller + Send + Sync>,
    log: &mut ClientLog,
    catch_up: &mut CatchUp,
    sequencer_tx: &mpsc::UnboundedSender<SequencerSignal>,
    write_tx: &mpsc::UnboundedSender<Vec<u8>>,
) -> Result<()> {
    match msg {
        WireMessage::Control(ControlMessage::SnapshotZip { b64, .. }) => {
            if let Err(err) = installer.install(&b64, paths.root()) {
                warn!(?err, "failed to install snapshot bundle");
            }
            Ok(())
        }
        WireMessage::Control(ControlMessage::InitialWorld { world }) => {
            if log.last_seq() == 0 {
                paths.write_world(&world)?;
            }
            Ok(())
        }
        WireMessage::Control(ControlMessage::HistoryMeta {
            highest_seq,
            page_size: _,
        }) => {
            catch_up.highest_seq = Some(highest_seq);
            catch_up.next_seq_pull = 1;
            if highest_seq >= 1 {
                request_history(write_tx, 1)?;
            }
            Ok(())
        }
        WireMessage::Control(ControlMessage::HistoryPage { commands }) => {
            for record in commands {
                append_record(log, record, catch_up, sequencer_tx)?;
            }
            if let Some(highest) = catch_up.highest_seq {
                if catch_up.next_seq_pull <= highest {
                    request_history(write_tx, catch_up.next_seq_pull)?;
                }
            }
            Ok(())
        }
        WireMessage::Control(ControlMessage::Reset { world }) => {
            let (ack_tx, ack_rx) = oneshot::channel();
            let _ = sequencer_tx.send(SequencerSignal::PrepareReset(ack_tx));
            let _ = ack_rx.await;
            log.truncate()?;
            paths.write_world(&world)?;
            *catch_up = CatchUp::default();
            info!("reset complete, resuming from seq 1");
            Ok(())
        }
        // A bare coordinator-sent control the client never originates, or
        // a stray control type: ignore (§7 "unknown control frame").
        WireMessage::Control(ControlMessage::HistoryRequest { .. }) => Ok(()),
        WireMessage::Sequenced(record) => {
            append_record(log, record, catch_up, sequencer_tx)?;
            Ok(())
        }
        // The client never receives a bare, unstamped `Command` back.
        WireMessage::Command(_) => Ok(()),
    }
}

/// Append a record to the local log, honoring the local-log invariant
/// (§4.4): duplicates from catch-up/live overlap are dropped, a true gap
/// is buffered until the missing predecessor arrives.
///
/// `catch_up.next_seq_pull` advances to `record.seq + 1` for *every*
/// record passed in, per §4.4's per-record rule — including one that
/// turns out to be a duplicate or gets buffered rather than appended.
/// Otherwise a reconnect (§4.3: prior clients must reconnect) replays a
/// page the local log already holds in full, the handler never sees an
/// append to advance the pull cursor on, and catch-up re-requests the
/// same `from` forever.
fn append_record(
    log: &mut ClientLog,
    record: SequencedCommand,
    catch_up: &mut CatchUp,
    sequencer_tx: &mpsc::UnboundedSender<SequencerSignal>,
) -> Result<()> {
    catch_up.next_seq_pull = catch_up.next_seq_pull.max(record.seq + 1);

    if record.seq <= log.last_seq() {
        return Ok(());
    }
    if record.seq != log.last_seq() + 1 {
        catch_up.pending.insert(record.seq, record);
        return Ok(());
    }

    let appended = log.append(&record)?;
    if appended {
        let _ = sequencer_tx.send(SequencerSignal::Wake);
    }

    while let Some(next) = catch_up.pending.remove(&(log.last_seq() + 1)) {
        catch_up.next_seq_pull = catch_up.next_seq_pull.max(next.seq + 1);
        if log.append(&next)? {
            let _ = sequencer_tx.send(SequencerSignal::Wake);
        }
    }

    Ok(())
}

fn request_history(write_tx: &mpsc::UnboundedSender<Vec<u8>>, from: u64) -> Result<()> {
    let frame = frame::encode(&ControlMessage::HistoryRequest { from })?;
    write_tx
        .send(frame)
        .map_err(|_| anyhow::anyhow!("link disconnected"))
}
