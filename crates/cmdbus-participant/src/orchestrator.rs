// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Orchestrator contract (§4.6): invocation helpers and the exit-code
//! vocabulary the sequencer must interpret.
//!
//! The orchestrator is an external, deterministic `(world_before,
//! command_text, username) -> (world_after, stdout, stderr, exit_code)`
//! child process. It runs the command handler, then the rule loop
//! (§4.7), and folds both outcomes into one exit code: `0` if a handler
//! or rule applied a change, `9` if the rule loop ran to completion with
//! no change, anything else a failure. Both `0` and `9` are dispatch
//! successes — only the cursor's advance is unconditional either way.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command as ChildCommand;

/// Exit code meaning a handler or rule applied a change.
pub const EXIT_CHANGED: i32 = 0;
/// Exit code meaning the rule loop completed with no change applied.
pub const EXIT_UNCHANGED: i32 = 9;

/// Result of one orchestrator invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exit `0`.
    Changed,
    /// Exit `9`.
    Unchanged,
    /// Any other exit code (`None` if the process was killed by a signal).
    Failed(Option<i32>),
}

impl Outcome {
    fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(EXIT_CHANGED) => Self::Changed,
            Some(EXIT_UNCHANGED) => Self::Unchanged,
            other => Self::Failed(other),
        }
    }

    /// Whether this outcome counts as a dispatch success (§4.6). The
    /// sequencer advances its cursor regardless (§4.5 step 4, §7).
    pub fn is_success(self) -> bool {
        matches!(self, Self::Changed | Self::Unchanged)
    }
}

/// Spawn the orchestrator for one command (§4.5 step 2), streaming its
/// stdout/stderr unbuffered to the participant process's own (step 3).
pub async fn invoke(
    orchestrator: &Path,
    command_text: &str,
    username: &str,
    cwd: &Path,
) -> std::io::Result<Outcome> {
    let status = ChildCommand::new(orchestrator)
        .arg(command_text)
        .arg(username)
        .current_dir(cwd)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await?;
    Ok(Outcome::from_code(status.code()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn changed_and_unchanged_are_both_successes() {
        assert!(Outcome::from_code(Some(EXIT_CHANGED)).is_success());
        assert!(Outcome::from_code(Some(EXIT_UNCHANGED)).is_success());
    }

    #[test]
    fn any_other_code_is_a_failure() {
        let outcome = Outcome::from_code(Some(1));
        assert!(!outcome.is_success());
        assert_eq!(outcome, Outcome::Failed(Some(1)));
    }

    #[test]
    fn signal_termination_has_no_code() {
        let outcome = Outcome::from_code(None);
        assert!(!outcome.is_success());
        assert_eq!(outcome, Outcome::Failed(None));
    }
}
