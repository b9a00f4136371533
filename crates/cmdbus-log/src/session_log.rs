// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Coordinator-side session log (C2): an ordered, durable, append-only
//! record of every sequenced command admitted in a session.
//!
//! Newline-delimited JSON is the preferred physical representation per
//! spec §4.2 — one record per line, appended with an `fsync` before the
//! coordinator is allowed to report the append as durable. The historical
//! whole-file-JSON-array form is out of scope (Design Notes: earlier
//! drafts are not part of this specification).

use crate::error::LogError;
use cmdbus_proto::SequencedCommand;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Durable, append-only log of every `SequencedCommand` admitted in a
/// session, backed by a newline-delimited JSON file.
pub struct SessionLog {
    path: PathBuf,
    file: File,
    highest_seq: u64,
}

impl SessionLog {
    /// Open (creating if absent) the session log at `path`, recovering
    /// `highest_seq` from the maximum seq present on disk.
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

        let highest_seq = Self::scan_highest_seq(&path)?;

        Ok(Self {
            path,
            file,
            highest_seq,
        })
    }

    fn scan_highest_seq(path: &Path) -> Result<u64, LogError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut highest = 0u64;
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
            highest = highest.max(record.seq);
        }
        Ok(highest)
    }

    /// Highest seq recorded so far (0 if the log is empty).
    pub fn highest_seq(&self) -> u64 {
        self.highest_seq
    }

    /// Durably append `record`. The caller must supply `record.seq ==
    /// highest_seq() + 1`; a violation is returned as `OutOfOrder` rather
    /// than silently accepted, since the coordinator's admission order
    /// *is* the ordering guarantee (§4.3 invariant).
    pub fn append(&mut self, record: &SequencedCommand) -> Result<(), LogError> {
        let expected = self.highest_seq + 1;
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
        self.highest_seq = record.seq;
        Ok(())
    }

    /// Discard every record and start over from seq 0, for a `reset`
    /// (§8 S6 — the coordinator resets its own `highest_seq` in lockstep
    /// with the `reset` control message it sends to clients).
    pub fn reset(&mut self) -> Result<(), LogError> {
        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .truncate(true)
            .open(&self.path)?;
        self.highest_seq = 0;
        Ok(())
    }

    /// Return all records with `seq >= from`, ascending, contiguous.
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
                username: "alice".into(),
                text: format!("raise {n}"),
            },
        }
    }

    #[test]
    fn appends_are_contiguous_and_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.ndjson");

        {
            let mut log = SessionLog::open(&path).unwrap();
            assert_eq!(log.highest_seq(), 0);
            log.append(&seq(1)).unwrap();
            log.append(&seq(2)).unwrap();
            assert_eq!(log.highest_seq(), 2);
        }

        // Reopen: highest_seq recovers from disk.
        let log = SessionLog::open(&path).unwrap();
        assert_eq!(log.highest_seq(), 2);
        let all = log.read_from(1).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].seq, 1);
        assert_eq!(all[1].seq, 2);
    }

    #[test]
    fn rejects_out_of_order_append() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::open(dir.path().join("history.ndjson")).unwrap();
        log.append(&seq(1)).unwrap();
        let err = log.append(&seq(3)).unwrap_err();
        assert!(matches!(err, LogError::OutOfOrder { expected: 2, got: 3 }));
    }

    #[test]
    fn read_from_beyond_highest_seq_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::open(dir.path().join("history.ndjson")).unwrap();
        log.append(&seq(1)).unwrap();
        assert!(log.read_from(5).unwrap().is_empty());
    }

    #[test]
    fn reset_clears_history_and_restarts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::open(dir.path().join("history.ndjson")).unwrap();
        log.append(&seq(1)).unwrap();
        log.append(&seq(2)).unwrap();
        log.reset().unwrap();
        assert_eq!(log.highest_seq(), 0);
        assert!(log.read_from(1).unwrap().is_empty());
        log.append(&seq(1)).unwrap();
        assert_eq!(log.highest_seq(), 1);
    }
}
