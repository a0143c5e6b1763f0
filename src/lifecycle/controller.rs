//! Transaction Lifecycle Controller
//!
//! Drives one state-mutating call at a time from submission to a terminal
//! outcome. The current [`LifecycleSnapshot`] lives in a `watch` channel:
//! every transition is published there and the interface layer redraws from
//! [`TxController::subscribe`].
//!
//! Each `submit` and each effective `reset` bumps the attempt counter. The
//! background task for an attempt only applies its result while its attempt
//! is still current, so late answers from an abandoned attempt never leak
//! into a newer one. The task itself is aborted on `reset`, on the next
//! `submit` and when the controller is dropped: that stops listening, it
//! does not cancel an operation the ledger already accepted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::error::LifecycleError;
use super::state::LifecycleStatus;
use crate::ledger::{CallDescriptor, ConfirmationWatcher, Finality, PendingId, SubmissionService};

/// How long the real outcome is still watched after the optimistic fallback fired
pub const LATE_OUTCOME_WINDOW: Duration = Duration::from_secs(600);

/// Observable controller state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub status: LifecycleStatus,
    /// Set while awaiting confirmation and kept after a confirmation failure
    pub pending_id: Option<PendingId>,
    pub error: Option<LifecycleError>,
    /// Confirmed by the optimistic fallback, not by the ledger
    pub assumed_success: bool,
    pub attempt: u64,
}

impl LifecycleSnapshot {
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.status.is_busy()
    }

    #[inline]
    pub fn can_retry(&self) -> bool {
        self.status == LifecycleStatus::Failed
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.status == LifecycleStatus::Confirmed
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Assume success once confirmation has been pending this long.
    ///
    /// Can report Confirmed for an operation that later reverts; the
    /// snapshot carries `assumed_success = true` when it fires.
    pub optimistic_confirm_after: Option<Duration>,
}

pub struct TxController {
    state: Arc<watch::Sender<LifecycleSnapshot>>,
    submitter: Arc<dyn SubmissionService>,
    watcher: Arc<dyn ConfirmationWatcher>,
    options: ControllerOptions,
    /// Background task of the latest attempt
    task: Mutex<Option<AbortHandle>>,
}

impl TxController {
    pub fn new(
        submitter: Arc<dyn SubmissionService>,
        watcher: Arc<dyn ConfirmationWatcher>,
    ) -> Self {
        Self::with_options(submitter, watcher, ControllerOptions::default())
    }

    pub fn with_options(
        submitter: Arc<dyn SubmissionService>,
        watcher: Arc<dyn ConfirmationWatcher>,
        options: ControllerOptions,
    ) -> Self {
        let (tx, _rx) = watch::channel(LifecycleSnapshot::default());
        Self {
            state: Arc::new(tx),
            submitter,
            watcher,
            options,
            task: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> LifecycleStatus {
        self.state.borrow().status
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.state.subscribe()
    }

    /// Validate and send `call`.
    ///
    /// Returns once the controller is in Submitting; the submission and the
    /// confirmation watch continue on a spawned task. Must be called within
    /// a tokio runtime.
    pub fn submit(&self, call: CallDescriptor) -> Result<u64, LifecycleError> {
        let mut outcome = Err(LifecycleError::Busy);

        self.state.send_if_modified(|s| {
            if s.status.is_busy() {
                return false;
            }
            if let Err(e) = call.validate() {
                let err = LifecycleError::from(e);
                s.error = Some(err.clone());
                outcome = Err(err);
                return true;
            }
            s.attempt += 1;
            s.status = LifecycleStatus::Submitting;
            s.pending_id = None;
            s.error = None;
            s.assumed_success = false;
            outcome = Ok(s.attempt);
            true
        });

        let attempt = match outcome {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!(code = e.code(), error = %e, "Submission refused locally");
                return Err(e);
            }
        };

        info!(
            attempt,
            function = call.function(),
            target = call.target(),
            "Submitting transaction"
        );

        let span = info_span!("tx", attempt, attempt_id = %ulid::Ulid::new());
        let run = AttemptRun {
            state: self.state.clone(),
            submitter: self.submitter.clone(),
            watcher: self.watcher.clone(),
            options: self.options.clone(),
            attempt,
        };
        let handle = tokio::spawn(run.drive(call).instrument(span));
        self.replace_task(Some(handle.abort_handle()));

        Ok(attempt)
    }

    /// Back to Idle, dropping identifier and error.
    ///
    /// No-op when already Idle with nothing to clear. Resetting while busy
    /// abandons the in-flight attempt: its task is aborted and its outcome
    /// ignored, the ledger operation itself is not cancelled.
    pub fn reset(&self) -> bool {
        let mut was_busy = false;
        let changed = self.state.send_if_modified(|s| {
            if s.status == LifecycleStatus::Idle && s.error.is_none() {
                return false;
            }
            was_busy = s.status.is_busy();
            *s = LifecycleSnapshot {
                attempt: s.attempt + 1,
                ..LifecycleSnapshot::default()
            };
            true
        });
        if changed {
            self.replace_task(None);
        }
        if was_busy {
            warn!("Reset while busy; in-flight attempt abandoned");
        } else if changed {
            debug!("Controller reset");
        }
        changed
    }

    /// Abort the previous attempt's task, if any, and track `next`
    fn replace_task(&self, next: Option<AbortHandle>) {
        let previous = std::mem::replace(&mut *self.task.lock().unwrap(), next);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Wait until nothing is in flight (Idle, Confirmed or Failed) and
    /// return that snapshot
    pub async fn wait_settled(&self) -> LifecycleSnapshot {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(|s| !s.status.is_busy()).await.map(|s| s.clone());
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }
}

impl Drop for TxController {
    fn drop(&mut self) {
        self.replace_task(None);
    }
}

/// Everything the background task of one attempt needs
struct AttemptRun {
    state: Arc<watch::Sender<LifecycleSnapshot>>,
    submitter: Arc<dyn SubmissionService>,
    watcher: Arc<dyn ConfirmationWatcher>,
    options: ControllerOptions,
    attempt: u64,
}

impl AttemptRun {
    /// Apply `f` only while this attempt is still the current one
    fn update(&self, f: impl FnOnce(&mut LifecycleSnapshot)) -> bool {
        let attempt = self.attempt;
        let applied = self.state.send_if_modified(|s| {
            if s.attempt != attempt {
                return false;
            }
            f(s);
            true
        });
        if !applied {
            debug!(attempt, "Attempt superseded; result dropped");
        }
        applied
    }

    async fn drive(self, call: CallDescriptor) {
        let id = match self.submitter.submit(&call).await {
            Ok(id) => id,
            Err(e) => {
                let err = LifecycleError::from(e);
                warn!(code = err.code(), error = %err, "Submission rejected");
                self.update(|s| {
                    s.status = LifecycleStatus::Failed;
                    s.pending_id = None;
                    s.error = Some(err);
                });
                return;
            }
        };

        info!(pending_id = %id, "Submission accepted, awaiting confirmation");
        let accepted = self.update(|s| {
            s.status = LifecycleStatus::AwaitingConfirmation;
            s.pending_id = Some(id.clone());
        });
        if !accepted {
            return;
        }

        let finality = self.watcher.wait_for_finality(&id);
        tokio::pin!(finality);

        let result = match self.options.optimistic_confirm_after {
            Some(bound) => tokio::select! {
                r = &mut finality => r,
                _ = tokio::time::sleep(bound) => {
                    warn!(
                        pending_id = %id,
                        after = ?bound,
                        "Confirmation still pending; ASSUMED SUCCESS (not confirmed by ledger)"
                    );
                    self.update(|s| {
                        s.status = LifecycleStatus::Confirmed;
                        s.assumed_success = true;
                    });
                    // Status stays Confirmed; the real outcome is only logged
                    match tokio::time::timeout(LATE_OUTCOME_WINDOW, finality).await {
                        Ok(Ok(Finality::Finalized)) => {
                            info!(pending_id = %id, "Assumed success later confirmed")
                        }
                        Ok(Ok(Finality::Reverted)) => {
                            error!(pending_id = %id, "Assumed success was wrong: transaction reverted")
                        }
                        Ok(Err(e)) => {
                            warn!(pending_id = %id, error = %e, "Assumed success never confirmed")
                        }
                        Err(_) => warn!(
                            pending_id = %id,
                            window = ?LATE_OUTCOME_WINDOW,
                            "Stopped watching assumed success"
                        ),
                    }
                    return;
                }
            },
            None => finality.await,
        };

        match result {
            Ok(Finality::Finalized) => {
                info!(pending_id = %id, "Transaction confirmed");
                self.update(|s| {
                    s.status = LifecycleStatus::Confirmed;
                    s.error = None;
                });
            }
            Ok(Finality::Reverted) => {
                warn!(pending_id = %id, "Transaction reverted");
                self.update(|s| {
                    s.status = LifecycleStatus::Failed;
                    s.error = Some(LifecycleError::Reverted);
                });
            }
            Err(e) => {
                let err = LifecycleError::from_watch(e);
                warn!(pending_id = %id, code = err.code(), error = %err, "Confirmation failed");
                self.update(|s| {
                    s.status = LifecycleStatus::Failed;
                    s.error = Some(err);
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use crate::ledger::{CallArg, LedgerError};

    const CONTRACT: &str = "0x1F75C8e2Dc719319789fbEB8E33967058792AC11";
    const MANUFACTURER: &str = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";

    fn grant_call(who: &str) -> CallDescriptor {
        CallDescriptor::new(
            CONTRACT,
            "addManufacturer",
            vec![CallArg::Address(who.to_string())],
        )
        .with_gas_limit(200_000)
    }

    fn controller(ledger: &Arc<MockLedger>) -> TxController {
        TxController::new(ledger.clone(), ledger.clone())
    }

    /// Let spawned attempt tasks run until they block
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_submit_enters_submitting_synchronously() {
        let ledger = Arc::new(MockLedger::new());
        let ctl = controller(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();

        // Spawned task has not run yet on the current-thread runtime
        let snap = ctl.snapshot();
        assert_eq!(snap.status, LifecycleStatus::Submitting);
        assert!(snap.pending_id.is_none());
        assert!(snap.is_busy());
    }

    #[tokio::test]
    async fn test_accepted_submission_awaits_confirmation() {
        let ledger = Arc::new(MockLedger::new());
        ledger.accept_next("0xabc");
        let ctl = controller(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        settle().await;

        let snap = ctl.snapshot();
        assert_eq!(snap.status, LifecycleStatus::AwaitingConfirmation);
        assert_eq!(snap.pending_id.as_ref().unwrap().as_str(), "0xabc");
        assert_eq!(ledger.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_address_never_reaches_service() {
        let ledger = Arc::new(MockLedger::new());
        let ctl = controller(&ledger);

        let err = ctl.submit(grant_call("not-an-address")).unwrap_err();
        settle().await;

        assert!(err.is_validation());
        let snap = ctl.snapshot();
        assert_eq!(snap.status, LifecycleStatus::Idle);
        assert!(snap.pending_id.is_none());
        assert!(snap.error.as_ref().unwrap().is_validation());
        assert_eq!(ledger.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_finalized_confirms() {
        let ledger = Arc::new(MockLedger::new());
        ledger.accept_next("0xabc");
        let ctl = controller(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        settle().await;
        ledger.resolve("0xabc", Ok(Finality::Finalized));

        let snap = ctl.wait_settled().await;
        assert_eq!(snap.status, LifecycleStatus::Confirmed);
        assert!(snap.is_done());
        assert!(!snap.assumed_success);
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_revert_fails_and_keeps_pending_id() {
        let ledger = Arc::new(MockLedger::new());
        ledger.accept_next("0xdef");
        let ctl = controller(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        settle().await;
        ledger.resolve("0xdef", Ok(Finality::Reverted));

        let snap = ctl.wait_settled().await;
        assert_eq!(snap.status, LifecycleStatus::Failed);
        assert!(snap.can_retry());
        assert_eq!(snap.pending_id.unwrap().as_str(), "0xdef");
        assert_eq!(snap.error, Some(LifecycleError::Reverted));
    }

    #[tokio::test]
    async fn test_watch_timeout_fails_and_keeps_pending_id() {
        let ledger = Arc::new(MockLedger::new());
        ledger.accept_next("0xdef");
        let ctl = controller(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        settle().await;
        ledger.resolve("0xdef", Err(LedgerError::Timeout("0xdef".into())));

        let snap = ctl.wait_settled().await;
        assert_eq!(snap.status, LifecycleStatus::Failed);
        assert!(snap.pending_id.is_some());
        assert_eq!(snap.error.unwrap().code(), "CONFIRMATION_TIMEOUT");
    }

    #[tokio::test]
    async fn test_rejection_fails_without_pending_id() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_submit_result(Err(LedgerError::UserDeclined(
            "User rejected the request.".into(),
        )));
        let ctl = controller(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        let snap = ctl.wait_settled().await;

        assert_eq!(snap.status, LifecycleStatus::Failed);
        assert!(snap.pending_id.is_none());
        assert_eq!(snap.error.unwrap().code(), "USER_DECLINED");
    }

    #[tokio::test]
    async fn test_submit_while_busy_is_refused() {
        let ledger = Arc::new(MockLedger::new());
        ledger.accept_next("0xabc");
        let ctl = controller(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        settle().await;

        let err = ctl.submit(grant_call(MANUFACTURER)).unwrap_err();
        assert_eq!(err, LifecycleError::Busy);
        assert_eq!(ctl.status(), LifecycleStatus::AwaitingConfirmation);
        assert_eq!(ledger.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_when_idle_is_noop() {
        let ledger = Arc::new(MockLedger::new());
        let ctl = controller(&ledger);
        let mut rx = ctl.subscribe();

        assert!(!ctl.reset());
        assert_eq!(ctl.snapshot(), LifecycleSnapshot::default());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_retry_after_rejection() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_submit_result(Err(LedgerError::ResourceLimit(
            "intrinsic gas too low".into(),
        )));
        ledger.accept_next("0x123");
        let ctl = controller(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        assert_eq!(ctl.wait_settled().await.status, LifecycleStatus::Failed);

        assert!(ctl.reset());
        let snap = ctl.snapshot();
        assert_eq!(snap.status, LifecycleStatus::Idle);
        assert!(snap.error.is_none());

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        assert_eq!(ctl.status(), LifecycleStatus::Submitting);
        settle().await;
        ledger.resolve("0x123", Ok(Finality::Finalized));

        let snap = ctl.wait_settled().await;
        assert!(snap.is_done());
        assert_eq!(ledger.submit_count(), 2);
    }

    #[tokio::test]
    async fn test_superseded_attempt_is_ignored() {
        let ledger = Arc::new(MockLedger::new());
        ledger.accept_next("0xold");
        let ctl = controller(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        settle().await;
        assert!(ctl.reset());

        // Late success of the abandoned attempt must not show up
        ledger.resolve("0xold", Ok(Finality::Finalized));
        settle().await;

        let snap = ctl.snapshot();
        assert_eq!(snap.status, LifecycleStatus::Idle);
        assert!(snap.pending_id.is_none());
    }

    #[tokio::test]
    async fn test_reset_releases_abandoned_attempts() {
        let ledger = Arc::new(MockLedger::new());
        let ctl = controller(&ledger);
        let baseline = Arc::strong_count(&ledger);

        for i in 0..5 {
            ledger.accept_next(&format!("0x{:x}", i + 1));
            ctl.submit(grant_call(MANUFACTURER)).unwrap();
            settle().await;
            assert_eq!(ctl.status(), LifecycleStatus::AwaitingConfirmation);
            assert!(ctl.reset());
        }
        settle().await;

        assert_eq!(Arc::strong_count(&ledger), baseline);
        assert_eq!(ledger.submit_count(), 5);
    }

    #[tokio::test]
    async fn test_new_submit_releases_fallback_watch() {
        let ledger = Arc::new(MockLedger::new());
        let ctl = TxController::with_options(
            ledger.clone(),
            ledger.clone(),
            ControllerOptions {
                optimistic_confirm_after: Some(Duration::from_millis(10)),
            },
        );
        let baseline = Arc::strong_count(&ledger);

        ledger.accept_next("0xslow");
        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        assert!(ctl.wait_settled().await.assumed_success);

        // Still watching 0xslow in the background
        assert_eq!(Arc::strong_count(&ledger), baseline + 2);

        ledger.set_auto_finality(Some(Finality::Finalized));
        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        let snap = ctl.wait_settled().await;
        assert!(snap.is_done());
        assert!(!snap.assumed_success);
        settle().await;

        assert_eq!(Arc::strong_count(&ledger), baseline);
    }

    #[tokio::test]
    async fn test_drop_releases_attempt() {
        let ledger = Arc::new(MockLedger::new());
        ledger.accept_next("0xabc");
        let ctl = controller(&ledger);
        let baseline = Arc::strong_count(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        settle().await;
        drop(ctl);
        settle().await;

        assert_eq!(Arc::strong_count(&ledger), baseline - 2);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let ledger = Arc::new(MockLedger::new());
        ledger.accept_next("0xabc");
        let ctl = controller(&ledger);
        let mut rx = ctl.subscribe();

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_busy());

        rx.wait_for(|s| s.status == LifecycleStatus::AwaitingConfirmation)
            .await
            .unwrap();
        ledger.resolve("0xabc", Ok(Finality::Finalized));
        let done = rx.wait_for(|s| s.is_done()).await.unwrap().clone();
        assert_eq!(done.pending_id.unwrap().as_str(), "0xabc");
    }

    #[tokio::test]
    async fn test_optimistic_fallback_assumes_success() {
        let ledger = Arc::new(MockLedger::new());
        ledger.accept_next("0xslow");
        let ctl = TxController::with_options(
            ledger.clone(),
            ledger.clone(),
            ControllerOptions {
                optimistic_confirm_after: Some(Duration::from_millis(20)),
            },
        );

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        let snap = ctl.wait_settled().await;

        assert_eq!(snap.status, LifecycleStatus::Confirmed);
        assert!(snap.assumed_success);
        assert_eq!(snap.pending_id.unwrap().as_str(), "0xslow");

        // A later revert is logged, status stays terminal
        ledger.resolve("0xslow", Ok(Finality::Reverted));
        settle().await;
        assert_eq!(ctl.status(), LifecycleStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_without_fallback_stays_pending() {
        let ledger = Arc::new(MockLedger::new());
        ledger.accept_next("0xslow");
        let ctl = controller(&ledger);

        ctl.submit(grant_call(MANUFACTURER)).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(ctl.status(), LifecycleStatus::AwaitingConfirmation);
    }
}
