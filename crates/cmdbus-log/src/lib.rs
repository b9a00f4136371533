// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Durable on-disk primitives for the cmdbus command bus: the
//! coordinator's session log (C2), a participant's local mirror of it
//! (§4.4), and the sequencer's dispatch cursor (C5).
//!
//! Every write in this crate that a caller depends on for durability
//! `fsync`s before returning — callers never need to second-guess
//! whether an `Ok` result actually hit disk.

mod client_log;
mod cursor;
mod error;
mod session_log;

pub use client_log::ClientLog;
pub use cursor::Cursor;
pub use error::LogError;
pub use session_log::SessionLog;
