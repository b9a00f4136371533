// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for cmdbus processes (config).
//! Keeps the coordinator and participant binaries thin and storage-agnostic.

pub mod config;
