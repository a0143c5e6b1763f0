use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Invalid address: '{0}' (expected 0x followed by 40 hex characters)")]
    InvalidAddress(String),

    #[error("Invalid call: {0}")]
    InvalidCall(String),

    #[error("User declined the request: {0}")]
    UserDeclined(String),

    #[error("Insufficient resource limit: {0}")]
    ResourceLimit(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("RPC connection failed: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl LedgerError {
    /// Stable code for logs and CLI output
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAddress(_) => "INVALID_ADDRESS",
            LedgerError::InvalidCall(_) => "INVALID_CALL",
            LedgerError::UserDeclined(_) => "USER_DECLINED",
            LedgerError::ResourceLimit(_) => "RESOURCE_LIMIT",
            LedgerError::Rpc { .. } => "RPC_ERROR",
            LedgerError::Transport(_) => "TRANSPORT",
            LedgerError::Decode(_) => "DECODE",
            LedgerError::Timeout(_) => "TIMEOUT",
        }
    }

    /// Local input problem, never reached the network
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAddress(_) | LedgerError::InvalidCall(_)
        )
    }

    /// Classify a JSON-RPC error object returned by a node or signer.
    ///
    /// 4001 is the EIP-1193 "user rejected request" code.
    pub fn from_rpc(code: i64, message: String) -> Self {
        let lower = message.to_lowercase();
        if code == 4001 || lower.contains("denied") || lower.contains("rejected") {
            LedgerError::UserDeclined(message)
        } else if lower.contains("gas") {
            LedgerError::ResourceLimit(message)
        } else {
            LedgerError::Rpc { code, message }
        }
    }
}
