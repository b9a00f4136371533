// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Coordinator session state (§4.3, §5): the session-wide mutex protects
//! `highest_seq`, the durable log append, and fan-out enumeration as one
//! critical section — the serialization point that produces total order.

use cmdbus_log::{LogError, SessionLog};
use cmdbus_proto::{Command, SequencedCommand, World};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

/// A connected client's outbox. Unbounded so admission never suspends on
/// a slow reader; eviction of a wedged client happens at the socket-write
/// timeout in the connection's writer task, not here.
struct ClientHandle {
    tx: UnboundedSender<Vec<u8>>,
}

/// All mutable coordinator state, held behind a single `tokio::sync::Mutex`
/// by the caller. Everything in here is touched only while that mutex is
/// held.
pub struct CoordinatorState {
    log: SessionLog,
    world: World,
    page_size: u32,
    clients: HashMap<u64, ClientHandle>,
    next_conn_id: u64,
}

impl CoordinatorState {
    /// Build state from a recovered session log and the session's current
    /// world.
    pub fn new(log: SessionLog, world: World, page_size: u32) -> Self {
        Self {
            log,
            world,
            page_size,
            clients: HashMap::new(),
            next_conn_id: 1,
        }
    }

    /// Highest seq durably recorded so far.
    pub fn highest_seq(&self) -> u64 {
        self.log.highest_seq()
    }

    /// Negotiated history page size.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The session's current world document.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Register a new connection's outbox and return its connection id.
    pub fn register_client(&mut self, tx: UnboundedSender<Vec<u8>>) -> u64 {
        let id = self.next_conn_id;
        self.next_conn_id += 1;
        self.clients.insert(id, ClientHandle { tx });
        id
    }

    /// Drop a connection's outbox (on disconnect or write failure).
    pub fn remove_client(&mut self, id: u64) {
        self.clients.remove(&id);
    }

    /// Admission (§4.3 steps 2–4): assign the next seq, build the record,
    /// and durably append it. Callers are expected to hold the session
    /// mutex across this call and the subsequent broadcast (step 5) so the
    /// two happen as one critical section.
    pub fn admit(&mut self, command: Command, timestamp: f64) -> Result<SequencedCommand, LogError> {
        let seq = self.log.highest_seq() + 1;
        let record = SequencedCommand {
            seq,
            timestamp,
            command,
        };
        self.log.append(&record)?;
        Ok(record)
    }

    /// Best-effort fan-out of an already-encoded frame to every connected
    /// client. A send failure (receiver dropped) marks that client for
    /// removal; it never blocks or aborts delivery to the others.
    pub fn broadcast(&mut self, frame: &[u8]) {
        let dead: Vec<u64> = self
            .clients
            .iter()
            .filter_map(|(id, c)| {
                if c.tx.send(frame.to_vec()).is_err() {
                    Some(*id)
                } else {
                    None
                }
            })
            .collect();
        for id in dead {
            self.clients.remove(&id);
        }
    }

    /// A contiguous, ascending page of history starting at `from`,
    /// truncated to the negotiated page size. `from > highest_seq` yields
    /// an empty page.
    pub fn history_page(&self, from: u64) -> Result<Vec<SequencedCommand>, LogError> {
        let mut records = self.log.read_from(from)?;
        records.truncate(self.page_size as usize);
        Ok(records)
    }

    /// Apply a `reset` (§8 S6): the coordinator's own `highest_seq` returns
    /// to 0 in lockstep with the `reset` control message it broadcasts, so
    /// subsequent admissions restart the seq sequence at 1.
    pub fn reset(&mut self, world: World) -> Result<(), LogError> {
        self.log.reset()?;
        self.world = world;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::unbounded_channel;

    fn state_with_log(dir: &std::path::Path) -> CoordinatorState {
        let log = SessionLog::open(dir.join("history.ndjson")).unwrap();
        CoordinatorState::new(log, json!({"counter": 0}), 1)
    }

    #[test]
    fn admission_assigns_seq_in_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with_log(dir.path());
        let r1 = state
            .admit(
                Command {
                    username: "b".into(),
                    text: "raise 5".into(),
                },
                1.0,
            )
            .unwrap();
        let r2 = state
            .admit(
                Command {
                    username: "a".into(),
                    text: "raise 3".into(),
                },
                2.0,
            )
            .unwrap();
        assert_eq!(r1.seq, 1);
        assert_eq!(r2.seq, 2);
        assert_eq!(state.highest_seq(), 2);
    }

    #[test]
    fn broadcast_drops_clients_with_closed_receivers() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with_log(dir.path());

        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, rx_b) = unbounded_channel();
        let id_a = state.register_client(tx_a);
        let id_b = state.register_client(tx_b);
        drop(rx_b);

        state.broadcast(b"frame");
        assert_eq!(rx_a.try_recv().unwrap(), b"frame".to_vec());
        assert_ne!(id_a, id_b);

        // Client B's receiver was dropped; a second broadcast should find
        // its handle already pruned.
        state.broadcast(b"frame2");
        state.remove_client(id_b);
    }

    #[test]
    fn history_page_truncates_and_respects_from() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with_log(dir.path());
        for n in 1..=3u64 {
            state
                .admit(
                    Command {
                        username: "a".into(),
                        text: format!("cmd {n}"),
                    },
                    n as f64,
                )
                .unwrap();
        }
        let page = state.history_page(1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].seq, 1);

        assert!(state.history_page(10).unwrap().is_empty());
    }

    #[test]
    fn reset_zeroes_highest_seq_and_replaces_world() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with_log(dir.path());
        state
            .admit(
                Command {
                    username: "a".into(),
                    text: "raise 3".into(),
                },
                1.0,
            )
            .unwrap();
        state.reset(json!({"counter": 0})).unwrap();
        assert_eq!(state.highest_seq(), 0);
        assert_eq!(state.world(), &json!({"counter": 0}));
        let r = state
            .admit(
                Command {
                    username: "a".into(),
                    text: "raise 1".into(),
                },
                2.0,
            )
            .unwrap();
        assert_eq!(r.seq, 1);
    }
}
