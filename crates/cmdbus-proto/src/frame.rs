// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Length-prefixed JSON framing (C1).
//!
//! A frame is a 4-byte big-endian length header followed by exactly that
//! many UTF-8 bytes of a single compact JSON value. Encoding is pure and
//! stateless; decoding is stateful and forgiving — a malformed payload is
//! dropped without desynchronizing the byte stream, since the length
//! header (not the JSON parser) is authoritative for framing.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Size of the length header, in bytes.
pub const HEADER_LEN: usize = 4;

/// Default maximum frame payload length (16 MiB), chosen so a snapshot
/// zip fits inside a single frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors raised by framing. JSON decode failures on an individual payload
/// are *not* represented here — the decoder swallows those per §4.1 and
/// keeps the stream in sync.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A declared frame length exceeded the configured maximum. Unlike a
    /// bad JSON payload, this is not safe to skip past — the bytes
    /// between the header and payload are of unknown length, so the
    /// connection must be treated as desynchronized and closed.
    #[error("frame length {len} exceeds configured maximum {max}")]
    TooLarge {
        /// Declared payload length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Failure while serializing an outbound value.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serialize `value` to compact JSON and prefix it with a 4-byte
/// big-endian length header.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, FrameError> {
    let payload = serde_json::to_vec(value)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Incremental decoder for the length-prefixed framing format.
///
/// Feed it arbitrary byte chunks as they arrive off the wire; it returns
/// every complete JSON value decoded since the previous call, in order.
/// Partial frames are retained across calls regardless of how the input
/// is chunked.
pub struct Decoder {
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Create a decoder with the default maximum frame length.
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a decoder with a caller-supplied maximum frame length.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
        }
    }

    /// Feed a chunk of bytes and return all complete JSON values decoded
    /// so far. A declared length exceeding the configured maximum is a
    /// fatal framing error (the caller should close the connection); a
    /// malformed JSON payload within an otherwise well-framed chunk is
    /// dropped silently and decoding continues.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Value>, FrameError> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }
            let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
            if len > self.max_frame_len {
                return Err(FrameError::TooLarge {
                    len,
                    max: self.max_frame_len,
                });
            }
            if self.buf.len() < HEADER_LEN + len {
                break;
            }
            let frame_end = HEADER_LEN + len;
            let payload = &self.buf[HEADER_LEN..frame_end];
            match serde_json::from_slice::<Value>(payload) {
                Ok(value) => out.push(value),
                Err(_) => {
                    // Length is authoritative; drop the bad payload and
                    // keep decoding subsequent frames.
                }
            }
            self.buf.drain(..frame_end);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_value() {
        let v = json!({"a": 1});
        let bytes = encode(&v).unwrap();
        let mut dec = Decoder::new();
        let out = dec.feed(&bytes).unwrap();
        assert_eq!(out, vec![v]);
    }

    #[test]
    fn feeds_two_values_split_arbitrarily() {
        let v1 = json!({"a": 1});
        let v2 = json!({"b": 2});
        let mut bytes = encode(&v1).unwrap();
        bytes.extend(encode(&v2).unwrap());

        // whole buffer at once
        let mut dec = Decoder::new();
        assert_eq!(dec.feed(&bytes).unwrap(), vec![v1.clone(), v2.clone()]);

        // per-byte
        let mut dec = Decoder::new();
        let mut out = Vec::new();
        for b in &bytes {
            out.extend(dec.feed(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(out, vec![v1.clone(), v2.clone()]);

        // halves
        let mid = bytes.len() / 2;
        let mut dec = Decoder::new();
        let mut out = dec.feed(&bytes[..mid]).unwrap();
        out.extend(dec.feed(&bytes[mid..]).unwrap());
        assert_eq!(out, vec![v1, v2]);
    }

    #[test]
    fn null_payload_decodes_to_null() {
        let bytes = encode(&Value::Null).unwrap();
        let mut dec = Decoder::new();
        assert_eq!(dec.feed(&bytes).unwrap(), vec![Value::Null]);
    }

    #[test]
    fn truncated_payload_waits_for_remainder() {
        let bytes = encode(&json!({"a": 1})).unwrap();
        let mut dec = Decoder::new();
        assert!(dec.feed(&bytes[..bytes.len() - 2]).unwrap().is_empty());
        assert_eq!(
            dec.feed(&bytes[bytes.len() - 2..]).unwrap(),
            vec![json!({"a": 1})]
        );
    }

    #[test]
    fn malformed_frame_is_skipped_without_desync() {
        let mut bytes = encode(&json!({"a": 1})).unwrap();
        // A frame whose header says len=2 but payload "xx" isn't valid JSON.
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(b"xx");
        bytes.extend(encode(&json!({"b": 2})).unwrap());

        let mut dec = Decoder::new();
        let out = dec.feed(&bytes).unwrap();
        assert_eq!(out, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn oversized_length_header_is_fatal() {
        let mut dec = Decoder::with_max_frame_len(8);
        let bytes = encode(&json!({"a": 1})).unwrap();
        assert!(matches!(
            dec.feed(&bytes),
            Err(FrameError::TooLarge { .. })
        ));
    }
}
