//! In-memory ledger for tests and offline runs.
//!
//! Submissions are recorded and answered from a script; finality is
//! resolved on demand with [`MockLedger::resolve`]. An identifier that was
//! never resolved stays pending forever, like an unknown hash on a node.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::abi::encode_values;
use super::error::LedgerError;
use super::types::{CallArg, CallDescriptor, PendingId};
use super::{ConfirmationWatcher, Finality, ReadOnlyQuery, SubmissionService};

#[derive(Default)]
pub struct MockLedger {
    submitted: Mutex<Vec<CallDescriptor>>,
    /// Scripted answers consumed in order; generated hashes once empty
    submit_script: Mutex<VecDeque<Result<PendingId, LedgerError>>>,
    next_hash: AtomicU64,
    outcomes: Mutex<HashMap<PendingId, Result<Finality, LedgerError>>>,
    resolved: Notify,
    /// Finality applied to every generated hash
    auto_finality: Mutex<Option<Finality>>,
    query_answers: Mutex<HashMap<String, Result<Vec<u8>, LedgerError>>>,
    query_count: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer for the next submission
    pub fn push_submit_result(&self, result: Result<PendingId, LedgerError>) {
        self.submit_script.lock().unwrap().push_back(result);
    }

    /// Accept the next submission with a fixed identifier
    pub fn accept_next(&self, id: &str) {
        if let Some(id) = PendingId::new(id) {
            self.push_submit_result(Ok(id));
        }
    }

    /// Generated hashes finalize with `finality` as soon as they are watched
    pub fn set_auto_finality(&self, finality: Option<Finality>) {
        *self.auto_finality.lock().unwrap() = finality;
    }

    /// Report the terminal outcome for an identifier
    pub fn resolve(&self, id: &str, outcome: Result<Finality, LedgerError>) {
        if let Some(id) = PendingId::new(id) {
            self.outcomes.lock().unwrap().insert(id, outcome);
            self.resolved.notify_waiters();
        }
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn submitted(&self) -> Vec<CallDescriptor> {
        self.submitted.lock().unwrap().clone()
    }

    /// Answer `verifyProduct(code)` with raw return data (or an error)
    pub fn set_query_answer(&self, code: &str, answer: Result<Vec<u8>, LedgerError>) {
        self.query_answers
            .lock()
            .unwrap()
            .insert(code.to_string(), answer);
    }

    /// Store a registered product under `code`
    pub fn register_product(
        &self,
        code: &str,
        name: &str,
        quality: &str,
        content_id: &str,
        issuer: &str,
        issued_at: u64,
    ) -> Result<(), LedgerError> {
        let data = encode_values(&[
            CallArg::Bool(true),
            CallArg::Str(name.to_string()),
            CallArg::Str(quality.to_string()),
            CallArg::Str(content_id.to_string()),
            CallArg::Address(issuer.to_string()),
            CallArg::Uint(u128::from(issued_at)),
        ])?;
        self.set_query_answer(code, Ok(data));
        Ok(())
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    /// What the contract returns for an unknown code: all-zero record
    fn missing_product() -> Result<Vec<u8>, LedgerError> {
        encode_values(&[
            CallArg::Bool(false),
            CallArg::Str(String::new()),
            CallArg::Str(String::new()),
            CallArg::Str(String::new()),
            CallArg::Address(format!("0x{}", "0".repeat(40))),
            CallArg::Uint(0),
        ])
    }
}

#[async_trait]
impl SubmissionService for MockLedger {
    async fn submit(&self, call: &CallDescriptor) -> Result<PendingId, LedgerError> {
        self.submitted.lock().unwrap().push(call.clone());

        let scripted = self.submit_script.lock().unwrap().pop_front();
        if let Some(scripted) = scripted {
            return scripted;
        }

        let n = self.next_hash.fetch_add(1, Ordering::SeqCst) + 1;
        let id = PendingId::new(format!("0x{:064x}", n))
            .ok_or_else(|| LedgerError::Decode("empty hash".into()))?;
        let auto = *self.auto_finality.lock().unwrap();
        if let Some(finality) = auto {
            self.resolve(id.as_str(), Ok(finality));
        }
        Ok(id)
    }
}

#[async_trait]
impl ConfirmationWatcher for MockLedger {
    async fn wait_for_finality(&self, id: &PendingId) -> Result<Finality, LedgerError> {
        loop {
            // Registered before the check so a concurrent resolve is not missed
            let notified = self.resolved.notified();
            let outcome = self.outcomes.lock().unwrap().get(id).cloned();
            if let Some(outcome) = outcome {
                return outcome;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl ReadOnlyQuery for MockLedger {
    async fn query(&self, call: &CallDescriptor) -> Result<Vec<u8>, LedgerError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        call.validate()?;

        let code = match call.args().first() {
            Some(CallArg::Str(code)) => code.clone(),
            _ => return Err(LedgerError::InvalidCall("expected a string code".into())),
        };

        let answer = self.query_answers.lock().unwrap().get(&code).cloned();
        match answer {
            Some(answer) => answer,
            None => Self::missing_product(),
        }
    }
}
