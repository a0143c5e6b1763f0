//! JSON-RPC Ledger Backend
//!
//! Talks to an Ethereum-compatible node (or a signer proxy in front of one)
//! holding the sending account:
//! - `eth_sendTransaction` for submissions
//! - `eth_getTransactionReceipt` / `eth_blockNumber` polling for finality
//! - `eth_call` for read-only queries

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::abi::{decode_hex, encode_call};
use super::error::LedgerError;
use super::types::{CallDescriptor, PendingId};
use super::{ConfirmationWatcher, Finality, ReadOnlyQuery, SubmissionService};
use crate::config::LedgerConfig;

/// JSON-RPC request structure
#[derive(Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Transaction object for `eth_sendTransaction`
#[derive(Serialize, Debug)]
struct TxRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    to: String,
    data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas: Option<String>,
}

/// Call object for `eth_call`
#[derive(Serialize, Debug)]
struct CallRequest {
    to: String,
    data: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TxReceipt {
    #[serde(default)]
    block_number: Option<String>,
    /// Absent on pre-Byzantium chains
    #[serde(default)]
    status: Option<String>,
}

pub struct JsonRpcLedger {
    config: LedgerConfig,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        info!(url = %config.rpc_url, "Initializing JSON-RPC ledger client");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LedgerError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Make a JSON-RPC call whose result may legitimately be `null`
    async fn rpc_call_optional<T, R>(
        &self,
        method: &'static str,
        params: T,
    ) -> Result<Option<R>, LedgerError>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("HTTP request failed: {}", e)))?;

        // Proxies answer overload with non-JSON bodies; keep those retryable
        let status = response.status();
        if !status.is_success() {
            return Err(http_status_error(method, status.as_u16()));
        }

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("Failed to parse {} response: {}", method, e)))?;

        if let Some(error) = rpc_response.error {
            return Err(LedgerError::from_rpc(error.code, error.message));
        }

        Ok(rpc_response.result)
    }

    async fn rpc_call<T, R>(&self, method: &'static str, params: T) -> Result<R, LedgerError>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        self.rpc_call_optional(method, params)
            .await?
            .ok_or_else(|| LedgerError::Decode(format!("No result in {} response", method)))
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        let raw: String = self.rpc_call("eth_blockNumber", Vec::<String>::new()).await?;
        parse_hex_u64(&raw)
    }

    /// One poll: `Some` once the receipt is available and deep enough
    async fn poll_receipt(&self, id: &PendingId) -> Result<Option<Finality>, LedgerError> {
        let receipt: Option<TxReceipt> = self
            .rpc_call_optional("eth_getTransactionReceipt", [id.as_str()])
            .await?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };

        if self.config.required_confirmations > 1 {
            // Pending-block receipts carry no number yet
            let Some(ref included) = receipt.block_number else {
                debug!(pending_id = %id, "Receipt without block number");
                return Ok(None);
            };
            let included = parse_hex_u64(included)?;
            let head = self.block_number().await?;
            let depth = head.saturating_sub(included) + 1;
            if depth < u64::from(self.config.required_confirmations) {
                debug!(
                    pending_id = %id,
                    depth,
                    required = self.config.required_confirmations,
                    "Receipt not deep enough yet"
                );
                return Ok(None);
            }
        }

        let finality = match receipt.status.as_deref() {
            Some("0x0") => Finality::Reverted,
            Some("0x1") | None => Finality::Finalized,
            Some(other) => {
                return Err(LedgerError::Decode(format!(
                    "unexpected receipt status '{}'",
                    other
                )));
            }
        };
        Ok(Some(finality))
    }
}

#[async_trait]
impl SubmissionService for JsonRpcLedger {
    async fn submit(&self, call: &CallDescriptor) -> Result<PendingId, LedgerError> {
        call.validate()?;
        let data = encode_call(call)?;

        let tx = TxRequest {
            from: self.config.from_address.clone(),
            to: call.target().to_string(),
            data: format!("0x{}", hex::encode(data)),
            gas: call.gas_limit().map(|g| format!("0x{:x}", g)),
        };
        debug!(function = call.function(), to = %tx.to, gas = ?tx.gas, "eth_sendTransaction");

        let hash: String = self.rpc_call("eth_sendTransaction", [tx]).await?;
        PendingId::new(hash)
            .ok_or_else(|| LedgerError::Decode("empty transaction hash".to_string()))
    }
}

#[async_trait]
impl ConfirmationWatcher for JsonRpcLedger {
    async fn wait_for_finality(&self, id: &PendingId) -> Result<Finality, LedgerError> {
        let started = Instant::now();
        let timeout = self.config.confirmation_timeout_ms.map(Duration::from_millis);

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.poll_receipt(id).await {
                Ok(Some(finality)) => {
                    info!(pending_id = %id, ?finality, "Transaction reached finality");
                    return Ok(finality);
                }
                Ok(None) => debug!(pending_id = %id, "Receipt pending"),
                // Unreachable node or non-2xx answer: retried until the optional timeout
                Err(LedgerError::Transport(e)) => {
                    warn!(pending_id = %id, error = %e, "Receipt poll failed, retrying")
                }
                Err(e) => return Err(e),
            }

            if let Some(limit) = timeout
                && started.elapsed() >= limit
            {
                return Err(LedgerError::Timeout(format!(
                    "finality of {} after {:?}",
                    id, limit
                )));
            }
        }
    }
}

#[async_trait]
impl ReadOnlyQuery for JsonRpcLedger {
    async fn query(&self, call: &CallDescriptor) -> Result<Vec<u8>, LedgerError> {
        call.validate()?;
        let data = encode_call(call)?;

        let req = CallRequest {
            to: call.target().to_string(),
            data: format!("0x{}", hex::encode(data)),
        };
        let raw: String = self.rpc_call("eth_call", (req, "latest")).await?;
        decode_hex(&raw)
    }
}

fn parse_hex_u64(s: &str) -> Result<u64, LedgerError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| LedgerError::Decode(format!("invalid hex quantity '{}': {}", s, e)))
}

fn http_status_error(method: &str, status: u16) -> LedgerError {
    LedgerError::Transport(format!("{} answered HTTP {}", method, status))
}
