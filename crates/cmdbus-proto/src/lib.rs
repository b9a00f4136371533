// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire schema and framing for the cmdbus command bus (C1 + §3 Data Model).
//!
//! This crate carries no networking or persistence logic of its own — it
//! is the shared vocabulary `cmdbus-coordinator` and `cmdbus-participant`
//! both depend on, so client and server can never drift on message shape.

pub mod frame;
mod message;

pub use message::{Command, ControlMessage, SequencedCommand, WireMessage, World};

/// Default TCP port the coordinator listens on (§4.3).
pub const DEFAULT_PORT: u16 = 9000;
