//! Lifecycle State Definitions

use std::fmt;

/// Transaction lifecycle states
///
/// ```text
/// IDLE → SUBMITTING → AWAITING_CONFIRMATION → CONFIRMED
///            ↓                  ↓
///          FAILED ←─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleStatus {
    /// Nothing sent (or reset after a terminal state)
    #[default]
    Idle,

    /// Handed to the submission service, no identifier yet
    Submitting,

    /// Accepted; watching the pending identifier for finality
    AwaitingConfirmation,

    /// Terminal: finalized successfully (or assumed so, see snapshot)
    Confirmed,

    /// Terminal: rejected, reverted, or timed out
    Failed,
}

impl LifecycleStatus {
    /// Check if this is a terminal state (no more transitions until reset)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleStatus::Confirmed | LifecycleStatus::Failed)
    }

    /// An operation is in flight; the triggering action must stay disabled
    #[inline]
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            LifecycleStatus::Submitting | LifecycleStatus::AwaitingConfirmation
        )
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Idle => "IDLE",
            LifecycleStatus::Submitting => "SUBMITTING",
            LifecycleStatus::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            LifecycleStatus::Confirmed => "CONFIRMED",
            LifecycleStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
