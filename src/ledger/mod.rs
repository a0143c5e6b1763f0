//! Ledger Service Module
//!
//! The external contract is reached through three narrow seams:
//! - [`SubmissionService`]: accepts a state-mutating call, returns a [`PendingId`]
//! - [`ConfirmationWatcher`]: resolves a [`PendingId`] to a [`Finality`] outcome
//! - [`ReadOnlyQuery`]: executes a read-only call and returns raw return data
//!
//! [`rpc::JsonRpcLedger`] implements all three over Ethereum JSON-RPC.

pub mod abi;
pub mod error;
#[cfg(any(test, feature = "mock-ledger"))]
pub mod mock;
pub mod rpc;
pub mod types;

pub use error::LedgerError;
pub use rpc::JsonRpcLedger;
pub use types::{Address, CallArg, CallDescriptor, PendingId};

use async_trait::async_trait;

/// Terminal outcome of a submitted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finality {
    /// Included and executed successfully
    Finalized,
    /// Included but execution reverted
    Reverted,
}

#[async_trait]
pub trait SubmissionService: Send + Sync {
    /// Hand the call to the signer/node.
    ///
    /// Returns once the call has been accepted (not confirmed).
    async fn submit(&self, call: &CallDescriptor) -> Result<PendingId, LedgerError>;
}

#[async_trait]
pub trait ConfirmationWatcher: Send + Sync {
    /// Resolve exactly once per identifier.
    ///
    /// Implementations may never return for an unknown identifier;
    /// callers must not block on this future.
    async fn wait_for_finality(&self, id: &PendingId) -> Result<Finality, LedgerError>;
}

#[async_trait]
pub trait ReadOnlyQuery: Send + Sync {
    /// Execute without a state change; returns ABI-encoded return data
    async fn query(&self, call: &CallDescriptor) -> Result<Vec<u8>, LedgerError>;
}
