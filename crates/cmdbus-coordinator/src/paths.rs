// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Coordinator-side session directory layout (§6).
//!
//! ```text
//! <session_dir>/
//!   history.ndjson          # ordered sequenced commands (C2)
//!   initial_world.json      # frozen at session creation
//!   engine_snapshot/
//!     client_snapshot.zip    # streamed to joiners, if present
//! ```
//!
//! `history.ndjson` departs from spec.md's `history.json` filename only in
//! extension, to signal the newline-delimited physical representation this
//! implementation chose (§4.2 names both forms as permissible).

use anyhow::{Context, Result};
use cmdbus_proto::World;
use std::path::{Path, PathBuf};

/// Resolved filesystem locations for a single coordinator session.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
}

impl SessionPaths {
    /// Root the session at `dir`, creating it if absent.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let root = dir.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating session dir {}", root.display()))?;
        Ok(Self { root })
    }

    /// Path to the session log.
    pub fn history_log(&self) -> PathBuf {
        self.root.join("history.ndjson")
    }

    /// Path to the frozen starting world.
    pub fn initial_world(&self) -> PathBuf {
        self.root.join("initial_world.json")
    }

    /// Path to the participant-code snapshot bundle, if the session was
    /// provisioned with one.
    pub fn snapshot_zip(&self) -> PathBuf {
        self.root.join("engine_snapshot").join("client_snapshot.zip")
    }

    /// Load the session's starting world, creating an empty object if the
    /// session was never explicitly provisioned with one.
    pub fn load_initial_world(&self) -> Result<World> {
        let path = self.initial_world();
        match std::fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let world = World::Object(serde_json::Map::new());
                self.save_initial_world(&world)?;
                Ok(world)
            }
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Persist `world` as the session's starting world (used both at
    /// first-run provisioning and by `reset`).
    pub fn save_initial_world(&self, world: &World) -> Result<()> {
        let path = self.initial_world();
        let bytes = serde_json::to_vec_pretty(world)?;
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))
    }

    /// Read the snapshot bundle's bytes, if one was provisioned for this
    /// session. Bootstrap provisioning itself is an external collaborator
    /// (spec.md §1); the coordinator only streams whatever file it finds.
    pub fn load_snapshot(&self) -> Result<Option<Vec<u8>>> {
        let path = self.snapshot_zip();
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// The session directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
