// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Operator console (§8 S6): the core leaves the `reset` trigger
//! unspecified (an operator action, not a wire message), so the
//! coordinator reads it off its own stdin the same way a participant
//! reads commands off its — one line per action.
//!
//! `reset` with no argument restarts the session at `{}`; `reset
//! <json>` restarts at the given world document.

use crate::paths::SessionPaths;
use crate::state::CoordinatorState;
use cmdbus_proto::{frame, ControlMessage};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Drain operator lines from stdin for the lifetime of the process.
pub async fn run(state: Arc<Mutex<CoordinatorState>>, paths: SessionPaths) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("reset") else {
            if !line.is_empty() {
                warn!(%line, "unrecognized operator command");
            }
            continue;
        };
        let rest = rest.trim();
        let world = if rest.is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(rest) {
                Ok(world) => world,
                Err(err) => {
                    warn!(?err, "reset payload is not valid JSON, ignoring");
                    continue;
                }
            }
        };

        if let Err(err) = paths.save_initial_world(&world) {
            warn!(?err, "failed to persist reset world, aborting reset");
            continue;
        }
        let mut guard = state.lock().await;
        if let Err(err) = guard.reset(world.clone()) {
            warn!(?err, "failed to reset session log");
            continue;
        }
        let frame = match frame::encode(&ControlMessage::Reset { world }) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(?err, "failed to encode reset frame");
                continue;
            }
        };
        guard.broadcast(&frame);
        drop(guard);
        info!("session reset, highest_seq restarts at 1");
    }
}
