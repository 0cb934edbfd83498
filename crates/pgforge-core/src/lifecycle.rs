//! Lifecycle phases and the one-way state machine that orders them.

use crate::CoreError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Teardown,
    Provisioned,
    WaitingReady,
    Configured,
    Restarting,
    WaitingReadyAfterRestart,
    Bootstrapped,
    Verified,
    Tested,
    Done,
}

impl Phase {
    /// Successor in the fixed order, `None` after `Done`.
    pub fn next(self) -> Option<Phase> {
        Some(match self {
            Phase::Idle => Phase::Teardown,
            Phase::Teardown => Phase::Provisioned,
            Phase::Provisioned => Phase::WaitingReady,
            Phase::WaitingReady => Phase::Configured,
            Phase::Configured => Phase::Restarting,
            Phase::Restarting => Phase::WaitingReadyAfterRestart,
            Phase::WaitingReadyAfterRestart => Phase::Bootstrapped,
            Phase::Bootstrapped => Phase::Verified,
            Phase::Verified => Phase::Tested,
            Phase::Tested => Phase::Done,
            Phase::Done => return None,
        })
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Teardown => "teardown",
            Phase::Provisioned => "provisioned",
            Phase::WaitingReady => "waiting-ready",
            Phase::Configured => "configured",
            Phase::Restarting => "restarting",
            Phase::WaitingReadyAfterRestart => "waiting-ready-after-restart",
            Phase::Bootstrapped => "bootstrapped",
            Phase::Verified => "verified",
            Phase::Tested => "tested",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: Phase, to: Phase) -> Result<(), CoreError> {
    if from.next() == Some(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Tracks one lifecycle run. Once failed it accepts no further transitions.
#[derive(Debug)]
pub struct PhaseTracker {
    current: Phase,
    completed: Vec<Phase>,
    failed: Option<Phase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: Phase::Idle,
            completed: Vec::new(),
            failed: None,
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    /// Phases whose work finished successfully, in order.
    pub fn completed(&self) -> &[Phase] {
        &self.completed
    }

    pub fn failed(&self) -> Option<Phase> {
        self.failed
    }

    /// Enter `to`. The phase being left counts as completed.
    pub fn advance(&mut self, to: Phase) -> Result<(), CoreError> {
        if let Some(phase) = self.failed {
            return Err(CoreError::InvalidTransition {
                from: format!("{phase} (failed)"),
                to: to.to_string(),
            });
        }
        validate_transition(self.current, to)?;
        if self.current != Phase::Idle {
            self.completed.push(self.current);
        }
        self.current = to;
        Ok(())
    }

    /// Mark the current phase as the terminal failure point.
    pub fn fail(&mut self) {
        self.failed = Some(self.current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_fixed_order() {
        let mut phase = Phase::Idle;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            assert!(validate_transition(phase, next).is_ok());
            seen.push(next);
            phase = next;
        }
        assert_eq!(seen.len(), 11);
        assert_eq!(phase, Phase::Done);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(Phase::Idle, Phase::Provisioned).is_err());
        assert!(validate_transition(Phase::Configured, Phase::Bootstrapped).is_err());
        assert!(validate_transition(Phase::Verified, Phase::Teardown).is_err());
        assert!(validate_transition(Phase::Done, Phase::Idle).is_err());
        assert!(validate_transition(Phase::Tested, Phase::Tested).is_err());
    }

    #[test]
    fn tracker_records_completed_phases() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(Phase::Teardown).unwrap();
        tracker.advance(Phase::Provisioned).unwrap();
        assert_eq!(tracker.current(), Phase::Provisioned);
        assert_eq!(tracker.completed(), &[Phase::Teardown]);
    }

    #[test]
    fn failed_tracker_is_terminal() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(Phase::Teardown).unwrap();
        tracker.fail();
        assert_eq!(tracker.failed(), Some(Phase::Teardown));
        assert!(tracker.advance(Phase::Provisioned).is_err());
        assert!(tracker.completed().is_empty());
    }

    #[test]
    fn phase_display_is_kebab_case() {
        assert_eq!(Phase::WaitingReadyAfterRestart.to_string(), "waiting-ready-after-restart");
        assert_eq!(
            serde_json::to_string(&Phase::WaitingReady).unwrap(),
            "\"waiting-ready\""
        );
    }
}
