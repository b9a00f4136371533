// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Coordinator preferences, loaded/saved the way `echo-session-service`
//! loads its `HostPrefs` blob: a best-effort platform-config default that
//! CLI flags always override.

use cmdbus_proto::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

/// Coordinator defaults persisted under the logical key `"coordinator"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorPrefs {
    /// Default TCP port, overridden by `--port` if given.
    pub port: u16,
    /// Default history-page size offered to joiners.
    pub page_size: u32,
}

impl Default for CoordinatorPrefs {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            page_size: 256,
        }
    }
}
