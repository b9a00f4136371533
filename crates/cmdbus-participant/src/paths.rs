// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Participant directory layout (§6).
//!
//! ```text
//! <client_dir>/
//!   data/
//!     world.json       # mutated only by orchestrator/rule loop
//!     commands.log      # newline-delimited JSON, strictly seq-ascending
//!     cursor.seq        # ASCII decimal uint64, atomically replaced
//!   scripts/            # command/rule/view registries (external)
//! ```

use cmdbus_proto::World;
use std::path::{Path, PathBuf};

/// Resolved filesystem locations for one participant.
#[derive(Debug, Clone)]
pub struct ParticipantPaths {
    root: PathBuf,
}

impl ParticipantPaths {
    /// Root the participant at `dir`, creating `data/` and `scripts/`.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = dir.into();
        std::fs::create_dir_all(root.join("data"))?;
        std::fs::create_dir_all(root.join("scripts"))?;
        Ok(Self { root })
    }

    /// `data/world.json`.
    pub fn world_file(&self) -> PathBuf {
        self.root.join("data").join("world.json")
    }

    /// `data/commands.log`.
    pub fn commands_log(&self) -> PathBuf {
        self.root.join("data").join("commands.log")
    }

    /// `data/cursor.seq`.
    pub fn cursor_file(&self) -> PathBuf {
        self.root.join("data").join("cursor.seq")
    }

    /// Default orchestrator entry point, overridable by `--orchestrator`.
    pub fn default_orchestrator(&self) -> PathBuf {
        self.root.join("scripts").join("orchestrator")
    }

    /// The participant's root directory, for snapshot extraction.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Overwrite `data/world.json` with `world`.
    pub fn write_world(&self, world: &World) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(world)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        std::fs::write(self.world_file(), bytes)
    }
}
