//! Shutdown state machine for a lock manager.

use serde::{Deserialize, Serialize};

/// Lifecycle of a lock manager.
///
/// State transitions:
/// - Running -> Draining -> Stopped (graceful shutdown, with or without timeout)
/// - Running -> ForceStopped (forced shutdown)
/// - Draining -> ForceStopped (forced shutdown issued during a drain)
///
/// `Stopped` and `ForceStopped` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Accepting and executing operations.
    Running,

    /// Rejecting submissions, still executing what is queued.
    Draining,

    /// Graceful shutdown finished.
    Stopped,

    /// Queue was rejected without running it.
    ForceStopped,
}

impl LifecycleState {
    pub fn accepts_submissions(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::ForceStopped)
    }

    /// Whether the drive worker may still dequeue work
    pub fn executes_queue(self) -> bool {
        matches!(self, Self::Running | Self::Draining)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Draining)
                | (Self::Running, Self::ForceStopped)
                | (Self::Draining, Self::Stopped)
                | (Self::Draining, Self::ForceStopped)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
            Self::ForceStopped => "force_stopped",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_absorbing() {
        for terminal in [LifecycleState::Stopped, LifecycleState::ForceStopped] {
            for next in [
                LifecycleState::Running,
                LifecycleState::Draining,
                LifecycleState::Stopped,
                LifecycleState::ForceStopped,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
            assert!(!terminal.accepts_submissions());
        }
    }

    #[test]
    fn draining_rejects_but_still_executes() {
        assert!(!LifecycleState::Draining.accepts_submissions());
        assert!(LifecycleState::Draining.executes_queue());
        assert!(LifecycleState::Running.can_transition_to(LifecycleState::ForceStopped));
        assert!(!LifecycleState::Running.can_transition_to(LifecycleState::Stopped));
    }
}
