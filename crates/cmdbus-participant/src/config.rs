// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Participant preferences, loaded the way `echo-session-service` loads
//! `HostPrefs` — a best-effort platform-config default that CLI flags
//! always override.

use cmdbus_proto::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

/// Participant defaults persisted under the logical key `"participant"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantPrefs {
    /// Default coordinator address, overridden by `--server-ip`.
    pub server_ip: String,
    /// Default coordinator port, overridden by `--server-port`.
    pub server_port: u16,
}

impl Default for ParticipantPrefs {
    fn default() -> Self {
        Self {
            server_ip: "127.0.0.1".into(),
            server_port: DEFAULT_PORT,
        }
    }
}
