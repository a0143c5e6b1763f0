//! Transaction Lifecycle
//!
//! Drives a state-mutating contract call from user input to a confirmed or
//! failed outcome.
//!
//! # State Machine
//!
//! ```text
//! IDLE → SUBMITTING → AWAITING_CONFIRMATION → CONFIRMED
//!            ↓                  ↓
//!          FAILED ←─────────────┘
//!            ↓ reset + submit
//!        SUBMITTING
//! ```
//!
//! # Invariants
//!
//! 1. **Validate first**: a malformed descriptor never reaches the submission service
//! 2. **One in flight**: `submit` is refused while SUBMITTING or AWAITING_CONFIRMATION
//! 3. **Pending id**: present iff AWAITING_CONFIRMATION, or FAILED after the call was accepted
//! 4. **Terminal until reset**: CONFIRMED and FAILED only change on `reset` or a new `submit`

pub mod controller;
pub mod error;
pub mod state;

pub use controller::{ControllerOptions, LifecycleSnapshot, TxController};
pub use error::LifecycleError;
pub use state::LifecycleStatus;
