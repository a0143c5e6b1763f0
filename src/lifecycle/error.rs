//! Lifecycle Error Types
//!
//! Every failure is caught at the controller boundary and surfaced as
//! status + message; these values live in the published snapshot.

use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Malformed input; nothing was sent
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A previous operation is still in flight
    #[error("Another operation is still in progress")]
    Busy,

    /// Refused before any ledger effect (declined, gas limit, unreachable signer)
    #[error("Submission rejected: {0}")]
    SubmissionRejected(LedgerError),

    /// Sent, but did not finalize successfully
    #[error("Transaction reverted on chain")]
    Reverted,

    #[error("Confirmation timed out: {0}")]
    ConfirmationTimeout(String),

    /// Watch or query could not complete
    #[error("Transport error: {0}")]
    Transport(String),
}

impl LifecycleError {
    /// Get the error code for logs and CLI output
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::Validation(_) => "VALIDATION",
            LifecycleError::Busy => "BUSY",
            LifecycleError::SubmissionRejected(e) => match e {
                LedgerError::UserDeclined(_) => "USER_DECLINED",
                LedgerError::ResourceLimit(_) => "RESOURCE_LIMIT",
                _ => "SUBMISSION_REJECTED",
            },
            LifecycleError::Reverted => "REVERTED",
            LifecycleError::ConfirmationTimeout(_) => "CONFIRMATION_TIMEOUT",
            LifecycleError::Transport(_) => "TRANSPORT",
        }
    }

    /// Recoverable by editing the input rather than retrying
    pub fn is_validation(&self) -> bool {
        matches!(self, LifecycleError::Validation(_))
    }

    /// The ledger may hold a record of the attempt
    pub fn is_confirmation_failure(&self) -> bool {
        matches!(
            self,
            LifecycleError::Reverted | LifecycleError::ConfirmationTimeout(_)
        )
    }

    /// Map an error reported while watching a pending identifier
    pub fn from_watch(e: LedgerError) -> Self {
        match e {
            LedgerError::Timeout(msg) => LifecycleError::ConfirmationTimeout(msg),
            other => LifecycleError::Transport(other.to_string()),
        }
    }
}

impl From<LedgerError> for LifecycleError {
    /// Local ledger errors are validation failures, everything else a rejection
    fn from(e: LedgerError) -> Self {
        if e.is_validation() {
            LifecycleError::Validation(e.to_string())
        } else {
            LifecycleError::SubmissionRejected(e)
        }
    }
}
