// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Snapshot bootstrap (§3 `snapshot_zip`): unpacking the base64-encoded
//! code bundle the coordinator streams to every new connection.
//!
//! The bootstrap step itself is a named external collaborator (spec.md
//! §1 describes it "only as a wire message"), so installation is kept
//! behind a trait — the core only needs to invoke it, not own its policy.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;
use std::path::Path;

/// Installs a received snapshot bundle into a participant directory.
pub trait SnapshotInstaller {
    /// Decode and unpack `b64` (as carried on a `snapshot_zip` frame) into
    /// `dest_dir`.
    fn install(&self, b64: &str, dest_dir: &Path) -> Result<()>;
}

/// Default installer: base64-decode, then extract as a zip archive —
/// mirrors `client_network.py`'s `_handle_snapshot_zip` (base64 decode →
/// `zipfile.ZipFile` → `extractall`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipSnapshotInstaller;

impl SnapshotInstaller for ZipSnapshotInstaller {
    fn install(&self, b64: &str, dest_dir: &Path) -> Result<()> {
        let bytes = STANDARD
            .decode(b64)
            .context("decoding snapshot_zip base64 payload")?;
        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).context("reading snapshot zip archive")?;
        archive
            .extract(dest_dir)
            .with_context(|| format!("extracting snapshot into {}", dest_dir.display()))
    }
}
