// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Durable sequencer cursor (C5, §4.5 step 5): the last seq the
//! participant's sequencer has dispatched to the orchestrator.
//!
//! Stored as plain ASCII decimal so it can be inspected with `cat`. An
//! absent file means no command has ever been dispatched, so `read`
//! returns 0. Advancing writes a fresh temp file, `fsync`s it, then
//! renames it over the cursor path — the rename is atomic on the same
//! filesystem, so a crash mid-write can never leave a torn cursor
//! value behind.

use crate::error::LogError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable, atomically-updated dispatch cursor for a participant's
/// sequencer.
pub struct Cursor {
    path: PathBuf,
}

impl Cursor {
    /// Bind to the cursor file at `path` without touching it yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current cursor value, or 0 if the file does not exist yet.
    pub fn read(&self) -> Result<u64, LogError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    return Ok(0);
                }
                trimmed
                    .parse::<u64>()
                    .map_err(|_| LogError::InvalidCursor(trimmed.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    /// Durably advance the cursor to `seq` via write-temp, fsync, rename.
    pub fn advance_to(&self, seq: u64) -> Result<(), LogError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let tmp_path = dir.join(format!(
            ".{}.tmp",
            self.path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_else(|| "cursor".into())
        ));

        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(seq.to_string().as_bytes())?;
            tmp.sync_data()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn absent_cursor_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = Cursor::new(dir.path().join("cursor.seq"));
        assert_eq!(cursor.read().unwrap(), 0);
    }

    #[test]
    fn advance_is_durable_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = Cursor::new(dir.path().join("cursor.seq"));
        cursor.advance_to(7).unwrap();
        assert_eq!(cursor.read().unwrap(), 7);
        cursor.advance_to(8).unwrap();
        assert_eq!(cursor.read().unwrap(), 8);
    }

    #[test]
    fn no_stray_temp_file_survives_a_successful_advance() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = Cursor::new(dir.path().join("cursor.seq"));
        cursor.advance_to(1).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
