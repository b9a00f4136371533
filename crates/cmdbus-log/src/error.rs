// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error type shared by the session log, client log, and cursor file.

use thiserror::Error;

/// Failures raised by the durable log and cursor primitives.
///
/// Per spec §7, session-log and local-log I/O failures are fatal to the
/// operation that triggered them (admission on the coordinator side,
/// the whole participant on the client side) — callers are expected to
/// propagate this upward rather than retry internally.
#[derive(Debug, Error)]
pub enum LogError {
    /// Underlying filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A record on disk failed to parse as a `SequencedCommand`.
    #[error("corrupt record at line {line}: {source}")]
    Corrupt {
        /// 1-based line number of the offending record.
        line: usize,
        /// Underlying deserialization failure.
        source: serde_json::Error,
    },
    /// An append violated the log's contiguity invariant.
    #[error("out-of-order append: expected seq {expected}, got {got}")]
    OutOfOrder {
        /// The seq the log required next.
        expected: u64,
        /// The seq that was actually offered.
        got: u64,
    },
    /// The cursor file's contents are not a valid decimal seq.
    #[error("invalid cursor contents: {0:?}")]
    InvalidCursor(String),
}
