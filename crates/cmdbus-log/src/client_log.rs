// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Participant-side local command log (§4.4): a contiguous, ascending,
//! gap-free prefix of `SequencedCommand` records mirrored from the
//! coordinator, plus anything the participant produced itself before a
//! commit was acknowledged.
//!
//! Live broadcast and history-page catch-up can overlap at the seam —
//! the same seq may arrive twice. `append` treats a duplicate as a
//! no-op rather than an error; only a genuine gap (a seq skipped ahead
//! of what the log has seen) is rejected, since the caller is expected
//! to buffer out-of-order pages before replaying them in order.

use crate::error::LogError;
use cmdbus_proto::SequencedCommand;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Local mirror of the session log kept by each participant.
pub struct ClientLog {
    path: PathBuf,
    file: File,
    last_seq: u64,
}

impl ClientLog {
    /// Open (creating if absent) the client log at `path`, recovering
    /// `last_seq` from the highest contiguous record present on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let last_seq = Self::scan_last_seq(&path)?;

        Ok(Self {
            path,
            file,
            last_seq,
        })
    }

    fn scan_last_seq(path: &Path) -> Result<u64, LogError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut last = 0u64;
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: SequencedCommand = serde_json::from_str(&line).map_err(|source| {
                LogError::Corrupt {
                    line: idx + 1,
                    source,
                }
            })?;
            last = last.max(record.seq);
        }
        Ok(last)
    }

    /// Highest seq this log has accepted so far (0 if empty).
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Append `record` if it extends the log by exactly one. A seq at or
    /// below `last_seq` is a duplicate and is dropped (`Ok(false)`); a
    /// seq more than one ahead is a gap the caller must close first.
    pub fn append(&mut self, record: &SequencedCommand) -> Result<bool, LogError> {
        if record.seq <= self.last_seq {
            return Ok(false);
        }
        let expected = self.last_seq + 1;
        if record.seq != expected {
            return Err(LogError::OutOfOrder {
                expected,
                got: record.seq,
            });
        }

        let mut line = serde_json::to_vec(record).map_err(|source| LogError::Corrupt {
            line: 0,
            source,
        })?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        self.last_seq = record.seq;
        Ok(true)
    }

    /// Discard the entire log and reopen it empty, for a coordinator
    /// `reset` (§8 S6). `last_seq` returns to 0.
    pub fn truncate(&mut self) -> Result<(), LogError> {
        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .truncate(true)
            .open(&self.path)?;
        self.last_seq = 0;
        Ok(())
    }

    /// Return every record currently on disk, ascending.
    pub fn read_all(&self) -> Result<Vec<SequencedCommand>, LogError> {
        self.read_from(0)
    }

    /// Return records with `seq >= from`, ascending — the sequencer's view
    /// of what is left to dispatch after its cursor.
    pub fn read_from(&self, from: u64) -> Result<Vec<SequencedCommand>, LogError> {
        let mut file = File::open(&self.path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;

        let mut out = Vec::new();
        for (idx, line) in buf.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: SequencedCommand =
                serde_json::from_str(line).map_err(|source| LogError::Corrupt {
                    line: idx + 1,
                    source,
                })?;
            if record.seq >= from {
                out.push(record);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use cmdbus_proto::Command;

    fn seq(n: u64) -> SequencedCommand {
        SequencedCommand {
            seq: n,
            timestamp: n as f64,
            command: Command {
                username: "bob".into(),
                text: format!("move {n}"),
            },
        }
    }

    #[test]
    fn appends_advance_last_seq_and_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.log");

        {
            let mut log = ClientLog::open(&path).unwrap();
            assert_eq!(log.last_seq(), 0);
            assert!(log.append(&seq(1)).unwrap());
            assert!(log.append(&seq(2)).unwrap());
        }

        let log = ClientLog::open(&path).unwrap();
        assert_eq!(log.last_seq(), 2);
        assert_eq!(log.read_all().unwrap().len(), 2);
    }

    #[test]
    fn duplicate_seq_from_overlapping_catch_up_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ClientLog::open(dir.path().join("commands.log")).unwrap();
        assert!(log.append(&seq(1)).unwrap());
        assert!(!log.append(&seq(1)).unwrap());
        assert_eq!(log.last_seq(), 1);
        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn true_gap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ClientLog::open(dir.path().join("commands.log")).unwrap();
        log.append(&seq(1)).unwrap();
        let err = log.append(&seq(3)).unwrap_err();
        assert!(matches!(err, LogError::OutOfOrder { expected: 2, got: 3 }));
    }

    #[test]
    fn truncate_resets_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ClientLog::open(dir.path().join("commands.log")).unwrap();
        log.append(&seq(1)).unwrap();
        log.append(&seq(2)).unwrap();
        log.truncate().unwrap();
        assert_eq!(log.last_seq(), 0);
        assert!(log.read_all().unwrap().is_empty());
        assert!(log.append(&seq(1)).unwrap());
    }
}
