// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire message vocabulary (§3 Data Model).
//!
//! `Command` and `SequencedCommand` are the command bus's two unframed
//! payload shapes; `ControlMessage` covers the join-handshake and paging
//! vocabulary, discriminated on the wire by a `type` string. `World` is
//! intentionally an opaque `serde_json::Value` — the core never parses it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque participant-local world document. The core never interprets it.
pub type World = Value;

/// A client's text command, as sent to the coordinator (client→coordinator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Sender's display name.
    pub username: String,
    /// Opaque command text (parsed only by the orchestrator, not the core).
    pub text: String,
}

/// A command after coordinator admission: globally ordered and timestamped.
/// This is both the broadcast payload and the session log's record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedCommand {
    /// Strictly increasing by exactly 1 per admitted command in a session.
    pub seq: u64,
    /// Wall-clock seconds at admission. Informational only — never used
    /// for ordering.
    pub timestamp: f64,
    /// The admitted command.
    pub command: Command,
}

/// Control messages exchanged outside the plain command/sequenced-command
/// flow, discriminated by a `type` field on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Sent once per new connection before any sequenced commands: the
    /// participant-code bundle, base64-encoded.
    SnapshotZip {
        /// Archive file name, for diagnostics.
        name: String,
        /// Base64-encoded zip bytes.
        b64: String,
    },
    /// The session's starting world, sent during the join handshake.
    InitialWorld {
        /// Starting world document.
        world: World,
    },
    /// Sent immediately after `InitialWorld`: tells the joiner how much
    /// history exists and the page size it should request in.
    HistoryMeta {
        /// Highest seq present in the coordinator's session log.
        highest_seq: u64,
        /// Maximum records per `HistoryPage`.
        page_size: u32,
    },
    /// Client→coordinator: request a page of history starting at `from`.
    HistoryRequest {
        /// First seq (inclusive) to include in the response page.
        from: u64,
    },
    /// Coordinator→client: a contiguous, ascending page of history,
    /// truncated to the negotiated page size.
    HistoryPage {
        /// Records with `seq >= from`, ascending, length <= `page_size`.
        commands: Vec<SequencedCommand>,
    },
    /// Instructs clients to purge local state and restart from a fresh
    /// world. Optional; not part of every session's lifecycle.
    Reset {
        /// World to restart from.
        world: World,
    },
}

/// The complete set of shapes that can arrive on the wire, classified from
/// a decoded JSON value. Any other `type`, or a value with neither `type`
/// nor `seq`, is not representable here — callers drop it per §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    /// A discriminated control message (`type` present).
    Control(ControlMessage),
    /// A coordinator-stamped command (`seq` present, no `type`).
    Sequenced(SequencedCommand),
    /// A bare client command (no `type`, no `seq`).
    Command(Command),
}

impl WireMessage {
    /// Classify a decoded JSON value into a `WireMessage`, or `None` if it
    /// matches none of the known shapes (per §6, a frame missing both
    /// `type` and `seq` — or carrying an unrecognized `type` — is dropped).
    pub fn classify(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_bare_command() {
        let v = json!({"username": "alice", "text": "raise 3"});
        let msg = WireMessage::classify(v).expect("should classify");
        assert_eq!(
            msg,
            WireMessage::Command(Command {
                username: "alice".into(),
                text: "raise 3".into()
            })
        );
    }

    #[test]
    fn classifies_sequenced_command() {
        let v = json!({
            "seq": 1,
            "timestamp": 10.5,
            "command": {"username": "alice", "text": "raise 3"}
        });
        let msg = WireMessage::classify(v).expect("should classify");
        assert_eq!(
            msg,
            WireMessage::Sequenced(SequencedCommand {
                seq: 1,
                timestamp: 10.5,
                command: Command {
                    username: "alice".into(),
                    text: "raise 3".into()
                }
            })
        );
    }

    #[test]
    fn classifies_control_message_by_type() {
        let v = json!({"type": "history_request", "from": 5});
        let msg = WireMessage::classify(v).expect("should classify");
        assert_eq!(
            msg,
            WireMessage::Control(ControlMessage::HistoryRequest { from: 5 })
        );
    }

    #[test]
    fn drops_frame_missing_type_and_seq() {
        let v = json!({"foo": "bar"});
        assert!(WireMessage::classify(v).is_none());
    }

    #[test]
    fn drops_unrecognized_control_type() {
        let v = json!({"type": "frobnicate", "x": 1});
        assert!(WireMessage::classify(v).is_none());
    }
}
