//! Product Verification Query
//!
//! One read against `verifyProduct(code)`, classified as:
//! - `NotFound`: the contract answered with `valid = false`
//! - `Error`: the node could not be reached or the answer did not decode
//! - `Success`: a valid record
//!
//! The two failure outcomes are kept apart on purpose: NotFound is an
//! authoritative negative answer, Error says nothing about the product.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::contract::TraceContract;
use crate::ledger::abi::AbiReader;
use crate::ledger::{Address, LedgerError, ReadOnlyQuery};

/// Point-in-time copy of an on-chain product record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub valid: bool,
    pub name: String,
    pub quality: String,
    pub content_id: String,
    pub issuer: Address,
    pub issued_at: DateTime<Utc>,
}

impl VerificationResult {
    /// Decode `(bool, string, string, string, address, uint256)`.
    ///
    /// Returns `None` when the validity flag is false; the remaining fields
    /// of an unregistered code carry no meaning and are not decoded.
    pub fn decode(data: &[u8]) -> Result<Option<Self>, LedgerError> {
        let reader = AbiReader::new(data);
        if !reader.read_bool(0)? {
            return Ok(None);
        }

        let secs = reader.read_u64(5)?;
        let issued_at = i64::try_from(secs)
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .ok_or_else(|| LedgerError::Decode(format!("timestamp {} out of range", secs)))?;

        Ok(Some(Self {
            valid: true,
            name: reader.read_string(1)?,
            quality: reader.read_string(2)?,
            content_id: reader.read_string(3)?,
            issuer: reader.read_address(4)?,
            issued_at,
        }))
    }

    /// e.g. `October 18th, 2026 3:04 PM UTC`
    pub fn issued_at_display(&self) -> String {
        let day = self.issued_at.day();
        format!(
            "{} {}{}, {}",
            self.issued_at.format("%B"),
            day,
            ordinal_suffix(day),
            self.issued_at.format("%Y %-I:%M %p UTC")
        )
    }
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VerifyStatus {
    #[default]
    Idle,
    Loading,
    NotFound,
    Error(String),
    Success(VerificationResult),
}

impl VerifyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyStatus::Idle => "IDLE",
            VerifyStatus::Loading => "LOADING",
            VerifyStatus::NotFound => "NOT_FOUND",
            VerifyStatus::Error(_) => "ERROR",
            VerifyStatus::Success(_) => "SUCCESS",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifySnapshot {
    /// Trimmed code of the latest dispatched query
    pub code: Option<String>,
    pub status: VerifyStatus,
    seq: u64,
}

pub struct VerificationQuery {
    contract: TraceContract,
    query: Arc<dyn ReadOnlyQuery>,
    state: watch::Sender<VerifySnapshot>,
}

impl VerificationQuery {
    pub fn new(contract: TraceContract, query: Arc<dyn ReadOnlyQuery>) -> Self {
        let (state, _rx) = watch::channel(VerifySnapshot::default());
        Self {
            contract,
            query,
            state,
        }
    }

    pub fn snapshot(&self) -> VerifySnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VerifySnapshot> {
        self.state.subscribe()
    }

    /// Query the contract for `code`.
    ///
    /// Blank input dispatches nothing and returns the current status.
    pub async fn verify(&self, code: &str) -> VerifyStatus {
        let code = code.trim();
        if code.is_empty() {
            debug!("Blank product code; nothing dispatched");
            return self.state.borrow().status.clone();
        }

        let mut seq = 0;
        self.state.send_modify(|s| {
            s.seq += 1;
            seq = s.seq;
            s.code = Some(code.to_string());
            s.status = VerifyStatus::Loading;
        });

        let call = self.contract.verify_product(code);
        let status = match self.query.query(&call).await {
            Ok(data) => match VerificationResult::decode(&data) {
                Ok(Some(result)) => VerifyStatus::Success(result),
                Ok(None) => VerifyStatus::NotFound,
                Err(e) => VerifyStatus::Error(e.to_string()),
            },
            Err(e) => VerifyStatus::Error(e.to_string()),
        };

        match &status {
            VerifyStatus::Success(r) => info!(code, issuer = %r.issuer, "Product verified"),
            VerifyStatus::NotFound => info!(code, "Product not registered or inactive"),
            VerifyStatus::Error(e) => warn!(code, error = %e, "Verification failed"),
            _ => {}
        }

        // A newer query owns the published state
        self.state.send_if_modified(|s| {
            if s.seq != seq {
                return false;
            }
            s.status = status.clone();
            true
        });

        status
    }

    /// Re-verify on every change of `input` until its sender is dropped
    pub async fn follow_input(&self, mut input: watch::Receiver<String>) {
        while input.changed().await.is_ok() {
            let code = input.borrow_and_update().clone();
            self.verify(&code).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::abi::encode_values;
    use crate::ledger::mock::MockLedger;
    use crate::ledger::CallArg;

    const CONTRACT: &str = "0x1F75C8e2Dc719319789fbEB8E33967058792AC11";
    const ISSUER: &str = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";

    fn query(ledger: &Arc<MockLedger>) -> VerificationQuery {
        VerificationQuery::new(TraceContract::new(CONTRACT), ledger.clone())
    }

    #[tokio::test]
    async fn test_invalid_record_is_not_found() {
        let ledger = Arc::new(MockLedger::new());
        let q = query(&ledger);

        let status = q.verify("COCOA002").await;

        assert_eq!(status, VerifyStatus::NotFound);
        assert_eq!(q.snapshot().status, VerifyStatus::NotFound);
        assert_eq!(q.snapshot().code.as_deref(), Some("COCOA002"));
        assert_eq!(ledger.query_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_code_dispatches_nothing() {
        let ledger = Arc::new(MockLedger::new());
        let q = query(&ledger);

        assert_eq!(q.verify("").await, VerifyStatus::Idle);
        assert_eq!(q.verify("   ").await, VerifyStatus::Idle);
        assert_eq!(ledger.query_count(), 0);
        assert_eq!(q.snapshot(), VerifySnapshot::default());
    }

    #[tokio::test]
    async fn test_registered_product_succeeds() {
        let ledger = Arc::new(MockLedger::new());
        ledger
            .register_product("COCOA002", "Cocoa Beans", "Grade A", "QmCid", ISSUER, 1_700_000_000)
            .unwrap();
        let q = query(&ledger);

        let VerifyStatus::Success(result) = q.verify("  COCOA002 ").await else {
            panic!("expected success");
        };
        assert!(result.valid);
        assert_eq!(result.name, "Cocoa Beans");
        assert_eq!(result.quality, "Grade A");
        assert_eq!(result.content_id, "QmCid");
        assert_eq!(result.issuer, ISSUER.parse().unwrap());
        assert_eq!(result.issued_at.timestamp(), 1_700_000_000);
        assert_eq!(result.issued_at_display(), "November 14th, 2023 10:13 PM UTC");
    }

    #[tokio::test]
    async fn test_transport_failure_is_error_not_not_found() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_query_answer(
            "COCOA002",
            Err(LedgerError::Transport("connection refused".into())),
        );
        let q = query(&ledger);

        let status = q.verify("COCOA002").await;
        assert!(matches!(status, VerifyStatus::Error(ref e) if e.contains("connection refused")));
        assert_eq!(status.as_str(), "ERROR");
    }

    #[tokio::test]
    async fn test_garbage_answer_is_error() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_query_answer("COCOA002", Ok(vec![0u8; 7]));
        let q = query(&ledger);

        assert!(matches!(q.verify("COCOA002").await, VerifyStatus::Error(_)));
    }

    #[test]
    fn test_decode_rejects_out_of_range_timestamp() {
        let data = encode_values(&[
            CallArg::Bool(true),
            CallArg::Str("n".into()),
            CallArg::Str("q".into()),
            CallArg::Str("c".into()),
            CallArg::Address(ISSUER.into()),
            CallArg::Uint(u128::from(u64::MAX)),
        ])
        .unwrap();
        assert!(matches!(
            VerificationResult::decode(&data),
            Err(LedgerError::Decode(_))
        ));
    }

    fn issued(secs: i64) -> VerificationResult {
        VerificationResult {
            valid: true,
            name: String::new(),
            quality: String::new(),
            content_id: String::new(),
            issuer: ISSUER.parse().unwrap(),
            issued_at: DateTime::from_timestamp(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_issued_at_uses_ordinal_day() {
        // 2024-03-01 09:05 UTC
        assert_eq!(issued(1_709_283_900).issued_at_display(), "March 1st, 2024 9:05 AM UTC");
        // 2024-03-02, 2024-03-03
        assert!(issued(1_709_370_300).issued_at_display().starts_with("March 2nd, 2024"));
        assert!(issued(1_709_456_700).issued_at_display().starts_with("March 3rd, 2024"));
        // 2024-03-11, 2024-03-12, 2024-03-13
        assert!(issued(1_710_147_900).issued_at_display().starts_with("March 11th, 2024"));
        assert!(issued(1_710_234_300).issued_at_display().starts_with("March 12th, 2024"));
        assert!(issued(1_710_320_700).issued_at_display().starts_with("March 13th, 2024"));
        // 2024-03-21, 2024-03-22
        assert!(issued(1_711_011_900).issued_at_display().starts_with("March 21st, 2024"));
        assert!(issued(1_711_098_300).issued_at_display().starts_with("March 22nd, 2024"));
    }

    #[tokio::test]
    async fn test_follow_input_reverifies_on_change() {
        let ledger = Arc::new(MockLedger::new());
        ledger
            .register_product("COCOA001", "Cocoa", "A", "QmCid", ISSUER, 1_700_000_000)
            .unwrap();
        let q = Arc::new(query(&ledger));
        let (input_tx, input_rx) = watch::channel(String::new());

        let follower = tokio::spawn({
            let q = q.clone();
            async move { q.follow_input(input_rx).await }
        });

        let mut rx = q.subscribe();
        input_tx.send("COCOA001".to_string()).unwrap();
        rx.wait_for(|s| matches!(s.status, VerifyStatus::Success(_)))
            .await
            .unwrap();

        input_tx.send("COCOA002".to_string()).unwrap();
        rx.wait_for(|s| s.status == VerifyStatus::NotFound)
            .await
            .unwrap();

        drop(input_tx);
        follower.await.unwrap();
        assert_eq!(ledger.query_count(), 2);
    }
}
