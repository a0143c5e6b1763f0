//! SupplyTrace - product-traceability contract client
//!
//! Grants the manufacturer role, registers product batches with pinned
//! metadata, and verifies products by code.
//!
//! # Modules
//!
//! - [`ledger`] - Submission, confirmation and query seams plus the JSON-RPC backend
//! - [`lifecycle`] - Transaction lifecycle state machine
//! - [`contract`] - Call descriptors for the contract entry points
//! - [`verify`] - Product verification query
//! - [`pinning`] - Metadata upload to the pinning service
//! - [`flows`] - Admin and manufacturer flows
//! - [`links`] - Explorer and gateway URLs
//! - [`config`] / [`logging`] - YAML config and tracing setup

pub mod config;
pub mod contract;
pub mod flows;
pub mod ledger;
pub mod lifecycle;
pub mod links;
pub mod logging;
pub mod pinning;
pub mod verify;

// Convenient re-exports at crate root
pub use config::{AppConfig, ConfigError};
pub use contract::TraceContract;
pub use flows::{RegistrationForm, TraceClient};
pub use ledger::{Address, CallArg, CallDescriptor, Finality, LedgerError, PendingId};
pub use lifecycle::{
    ControllerOptions, LifecycleError, LifecycleSnapshot, LifecycleStatus, TxController,
};
pub use links::ExplorerLinks;
pub use pinning::{ContentId, ContentPinner, PinError, PinataClient};
pub use verify::{VerificationQuery, VerificationResult, VerifyStatus};
