// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-connection task (§4.3): join handshake, then an independent receive
//! loop for the lifetime of the socket. The coordinator never initiates
//! connections, so everything here runs in response to an accepted client.

use crate::state::CoordinatorState;
use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cmdbus_log::LogError;
use cmdbus_proto::{frame, Command, ControlMessage, WireMessage};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};

/// Write timeout past which a connected client is treated as wedged and
/// evicted from the broadcast set (§5 "Timeouts").
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

fn now_wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Drive one accepted connection end to end: handshake, then the receive
/// loop, until the socket closes or a fatal framing error occurs.
pub async fn handle_connection(
    stream: TcpStream,
    state: Arc<Mutex<CoordinatorState>>,
    snapshot: Option<Arc<Vec<u8>>>,
) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = unbounded_channel::<Vec<u8>>();

    let (conn_id, world, highest_seq, page_size) = {
        let mut guard = state.lock().await;
        let id = guard.register_client(tx.clone());
        (id, guard.world().clone(), guard.highest_seq(), guard.page_size())
    };

    info!(conn_id, ?peer, "client connected");

    // Join handshake (§4.3): snapshot_zip, initial_world, history_meta, in order.
    if let Some(bytes) = &snapshot {
        let msg = ControlMessage::SnapshotZip {
            name: "client_snapshot.zip".into(),
            b64: STANDARD.encode(bytes.as_slice()),
        };
        let _ = tx.send(frame::encode(&msg)?);
    }
    let _ = tx.send(frame::encode(&ControlMessage::InitialWorld { world })?);
    let _ = tx.send(frame::encode(&ControlMessage::HistoryMeta {
        highest_seq,
        page_size,
    })?);

    let writer_state = state.clone();
    tokio::spawn(async move {
        while let Some(buf) = rx.recv().await {
            match timeout(WRITE_TIMEOUT, writer.write_all(&buf)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(conn_id, ?err, "write failed, evicting client");
                    break;
                }
                Err(_) => {
                    warn!(conn_id, "write timed out, evicting wedged client");
                    break;
                }
            }
        }
        let _ = writer.shutdown().await;
        writer_state.lock().await.remove_client(conn_id);
    });

    let mut decoder = frame::Decoder::new();
    let mut read_buf = vec![0u8; 16 * 1024];

    let result = receive_loop(&mut reader, &mut decoder, &mut read_buf, conn_id, &tx, &state).await;

    state.lock().await.remove_client(conn_id);
    info!(conn_id, "client disconnected");
    result
}

async fn receive_loop(
    reader: &mut tokio::net::tcp::OwnedReadHalf,
    decoder: &mut frame::Decoder,
    read_buf: &mut [u8],
    conn_id: u64,
    tx: &tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
    state: &Arc<Mutex<CoordinatorState>>,
) -> Result<()> {
    loop {
        let n = reader.read(read_buf).await?;
        if n == 0 {
            return Ok(());
        }

        let values = match decoder.feed(&read_buf[..n]) {
            Ok(values) => values,
            Err(err) => {
                warn!(conn_id, ?err, "oversized frame, closing connection");
                return Ok(());
            }
        };

        for value in values {
            let Some(msg) = WireMessage::classify(value) else {
                // Frame missing both `type` and `seq`: dropped per §6.
                continue;
            };
            dispatch(msg, conn_id, tx, state).await?;
        }
    }
}

async fn dispatch(
    msg: WireMessage,
    conn_id: u64,
    tx: &tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
    state: &Arc<Mutex<CoordinatorState>>,
) -> Result<()> {
    match msg {
        WireMessage::Command(command) => admit_and_broadcast(command, state).await,
        WireMessage::Control(ControlMessage::HistoryRequest { from }) => {
            let page = {
                let guard = state.lock().await;
                guard.history_page(from)
            };
            match page {
                Ok(commands) => {
                    let frame = frame::encode(&ControlMessage::HistoryPage { commands })?;
                    let _ = tx.send(frame);
                }
                Err(err) => {
                    warn!(conn_id, ?err, "failed to read history page");
                }
            }
            Ok(())
        }
        // §4.1/§6: every other control type the coordinator only ever
        // sends (snapshot_zip, initial_world, history_meta, history_page,
        // reset) or a bare sequenced command is not part of the
        // client→coordinator vocabulary; ignore without disconnecting.
        WireMessage::Control(_) | WireMessage::Sequenced(_) => Ok(()),
    }
}

/// Admission (§4.3 steps 1–6): assign seq, append durably, fan out, all
/// under the session mutex, which is the total-order serialization point.
async fn admit_and_broadcast(command: Command, state: &Arc<Mutex<CoordinatorState>>) -> Result<()> {
    let timestamp = now_wall_clock_secs();
    let mut guard = state.lock().await;
    match guard.admit(command, timestamp) {
        Ok(record) => {
            let frame = frame::encode(&record)?;
            guard.broadcast(&frame);
            Ok(())
        }
        Err(LogError::Io(err)) => {
            // §7: session-log I/O errors are fatal to *this* admission
            // only — the mutex is released, `highest_seq` is not
            // advanced, and the command is simply never acknowledged.
            drop(guard);
            warn!(?err, "session log append failed, command not admitted");
            Ok(())
        }
        Err(err) => {
            drop(guard);
            warn!(?err, "session log rejected admission");
            Ok(())
        }
    }
}
