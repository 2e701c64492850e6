//! Withdrawal Coordinator
//!
//! Drives one withdrawal attempt through the FSM:
//! eligibility -> ledger debit (persisted) -> transfer -> confirmed/failed.
//! The account lock is held from the eligibility check until the outcome is
//! recorded, so a user has at most one withdrawal moving at a time.

use std::sync::{Arc, Mutex};

use crate::account::UserId;
use crate::errors::{LedgerError, LedgerResult};
use crate::id_gen::AttemptIdGen;
use crate::ledger::{AccountGuard, AccountLedger};
use crate::settlement::adapters::{TokenTransferService, TransferRequest};
use crate::settlement::db::WithdrawalDb;
use crate::settlement::state::{try_transition, WithdrawalEvent, WithdrawalState};
use crate::settlement::types::{AttemptId, TransferOutcome, WithdrawalReceipt, WithdrawalRecord};

/// Settlement parameters
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Smallest balance (whole tokens) that can be withdrawn
    pub min_withdraw: u64,
    /// Minor units per whole token = 10^token_decimals
    pub token_decimals: u32,
    pub token_mint_address: String,
}

impl SettlementConfig {
    /// Whole tokens -> minor units, `None` on overflow
    pub fn to_minor_units(&self, amount: u64) -> Option<u64> {
        10u64.checked_pow(self.token_decimals)?.checked_mul(amount)
    }
}

pub struct WithdrawalCoordinator {
    ledger: Arc<AccountLedger>,
    db: Arc<WithdrawalDb>,
    transfer_service: Arc<dyn TokenTransferService>,
    config: SettlementConfig,
    id_gen: Mutex<AttemptIdGen>,
}

impl WithdrawalCoordinator {
    pub fn new(
        ledger: Arc<AccountLedger>,
        db: Arc<WithdrawalDb>,
        transfer_service: Arc<dyn TokenTransferService>,
        config: SettlementConfig,
    ) -> Self {
        Self { ledger, db, transfer_service, config, id_gen: Mutex::new(AttemptIdGen::new()) }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Fresh attempt id for a new logical withdrawal
    pub fn next_attempt_id(&self) -> AttemptId {
        AttemptId::new(self.id_gen.lock().unwrap_or_else(|e| e.into_inner()).generate())
    }

    /// Withdraw the user's whole balance under a new attempt id.
    pub async fn withdraw(&self, user_id: UserId) -> LedgerResult<WithdrawalReceipt> {
        let attempt_id = self.next_attempt_id();
        self.withdraw_attempt(user_id, attempt_id).await
    }

    /// Withdraw under a caller-chosen attempt id.
    ///
    /// Replaying an attempt id never pays twice: a confirmed attempt returns
    /// its stored receipt, an in-flight one is refused, a failed one reports
    /// the recorded failure.
    pub async fn withdraw_attempt(
        &self,
        user_id: UserId,
        attempt_id: AttemptId,
    ) -> LedgerResult<WithdrawalReceipt> {
        let guard = self.ledger.lock_account(user_id).await;

        if let Some(existing) = self.db.get(attempt_id) {
            return self.replay(user_id, existing);
        }

        // Requested -> Eligible
        let account = self
            .ledger
            .get_account(user_id)
            .filter(|a| a.has_wallet())
            .ok_or(LedgerError::WalletRequired(user_id))?;
        let destination = account.wallet_address.clone().unwrap_or_default();

        if account.balance < self.config.min_withdraw {
            return Err(LedgerError::BelowMinimum {
                balance: account.balance,
                minimum: self.config.min_withdraw,
            });
        }
        let amount = account.balance;
        let amount_minor = self.config.to_minor_units(amount).ok_or(LedgerError::AmountOverflow {
            amount,
            decimals: self.config.token_decimals,
        })?;
        let state = try_transition(WithdrawalState::Requested, WithdrawalEvent::Validated)?;

        let now = chrono::Utc::now().timestamp_millis();
        let record = WithdrawalRecord {
            attempt_id,
            user_id,
            destination,
            amount,
            amount_minor,
            mint: self.config.token_mint_address.clone(),
            state,
            receipt: None,
            error: None,
            submit_count: 0,
            created_at: now,
            updated_at: now,
        };
        if !self.db.create(&record)? {
            // Same id raced in for another user
            return Err(LedgerError::WithdrawalInFlight(attempt_id.to_string()));
        }
        log::info!(
            "Withdrawal {} eligible: user={} amount={} dest={}",
            attempt_id, user_id, amount, record.destination
        );

        // Eligible -> Debited: persist the debit before anything leaves
        if let Err(e) = self.debit_whole_balance(&guard, amount) {
            // Ledger untouched, so the attempt never happened
            log::warn!("Withdrawal {} debit failed for user {}: {}", attempt_id, user_id, e);
            self.db.remove_if(attempt_id, WithdrawalState::Eligible)?;
            return Err(e);
        }
        self.advance(attempt_id, WithdrawalState::Eligible, WithdrawalEvent::Debit)?;

        // Debited -> Submitted -> Confirmed | Failed
        self.submit(attempt_id, WithdrawalState::Debited, WithdrawalEvent::Submit).await
    }

    fn replay(&self, user_id: UserId, existing: WithdrawalRecord) -> LedgerResult<WithdrawalReceipt> {
        let attempt_id = existing.attempt_id;
        if existing.user_id != user_id {
            return Err(LedgerError::UnknownAttempt(attempt_id.to_string()));
        }
        log::info!("Withdrawal {} replayed in state {}", attempt_id, existing.state);

        match existing.state {
            WithdrawalState::Confirmed => WithdrawalReceipt::from_record(&existing)
                .ok_or_else(|| LedgerError::UnknownAttempt(attempt_id.to_string())),
            WithdrawalState::Failed => Err(LedgerError::TransferFailed {
                attempt_id: attempt_id.to_string(),
                amount: existing.amount,
                reason: existing.error.unwrap_or_default(),
            }),
            WithdrawalState::Refunded | WithdrawalState::Requested => {
                Err(LedgerError::InvalidStateTransition {
                    from: existing.state.as_str().to_string(),
                    to: format!("{:?}", WithdrawalEvent::Submit),
                })
            }
            WithdrawalState::Eligible | WithdrawalState::Debited | WithdrawalState::Submitted => {
                Err(LedgerError::WithdrawalInFlight(attempt_id.to_string()))
            }
        }
    }

    fn debit_whole_balance(&self, guard: &AccountGuard, amount: u64) -> LedgerResult<()> {
        self.ledger
            .update(guard, |account| {
                // Lock is held since the eligibility read, so this is the same balance
                if account.balance != amount {
                    return Err(LedgerError::InsufficientBalance {
                        available: account.balance,
                        required: amount,
                    });
                }
                account.drain();
                Ok(())
            })
            .map(|_| ())
    }

    fn advance(
        &self,
        attempt_id: AttemptId,
        from: WithdrawalState,
        event: WithdrawalEvent,
    ) -> LedgerResult<WithdrawalState> {
        let to = try_transition(from, event)?;
        if !self.db.update_state_if(attempt_id, from, to)? {
            let actual = self.db.get(attempt_id).map(|r| r.state);
            return Err(LedgerError::InvalidStateTransition {
                from: actual.map(|s| s.as_str()).unwrap_or("missing").to_string(),
                to: to.as_str().to_string(),
            });
        }
        Ok(to)
    }

    /// Persist `Submitted`, call the transfer service, record the outcome.
    async fn submit(
        &self,
        attempt_id: AttemptId,
        from: WithdrawalState,
        event: WithdrawalEvent,
    ) -> LedgerResult<WithdrawalReceipt> {
        let to = try_transition(from, event)?;
        if !self.db.update_if(attempt_id, from, |r| {
            r.state = to;
            r.submit_count += 1;
        })? {
            return Err(LedgerError::WithdrawalInFlight(attempt_id.to_string()));
        }
        let record = self
            .db
            .get(attempt_id)
            .ok_or_else(|| LedgerError::UnknownAttempt(attempt_id.to_string()))?;

        let request = TransferRequest {
            reference: attempt_id,
            mint: record.mint.clone(),
            destination: record.destination.clone(),
            amount_minor: record.amount_minor,
        };
        log::info!(
            "Withdrawal {} submitted to {}: {} minor units -> {}",
            attempt_id,
            self.transfer_service.name(),
            request.amount_minor,
            request.destination
        );

        // Outcome goes to the log before the withdrawal log
        match self.transfer_service.transfer(&request).await {
            TransferOutcome::Success(receipt) => {
                let next = try_transition(WithdrawalState::Submitted, WithdrawalEvent::TransferOk)?;
                log::info!(
                    "Withdrawal {} confirmed: user={} amount={} dest={} receipt={}",
                    attempt_id,
                    record.user_id,
                    record.amount,
                    record.destination,
                    receipt
                );
                self.record_outcome(attempt_id, Some(&receipt), |r| {
                    r.state = next;
                    r.receipt = Some(receipt.clone());
                    r.error = None;
                })?;
                Ok(WithdrawalReceipt {
                    attempt_id,
                    amount: record.amount,
                    destination: record.destination,
                    receipt,
                })
            }
            TransferOutcome::Failed(reason) => {
                let next = try_transition(WithdrawalState::Submitted, WithdrawalEvent::TransferFail)?;
                log::error!(
                    "RECONCILE: withdrawal {} failed, ledger debited without transfer: user={} amount={} minor={} dest={} error={}",
                    attempt_id,
                    record.user_id,
                    record.amount,
                    record.amount_minor,
                    record.destination,
                    reason
                );
                self.record_outcome(attempt_id, None, |r| {
                    r.state = next;
                    r.error = Some(reason.clone());
                })?;
                Err(LedgerError::TransferFailed {
                    attempt_id: attempt_id.to_string(),
                    amount: record.amount,
                    reason,
                })
            }
        }
    }

    fn record_outcome(
        &self,
        attempt_id: AttemptId,
        receipt: Option<&str>,
        f: impl FnOnce(&mut WithdrawalRecord),
    ) -> LedgerResult<()> {
        match self.db.record_outcome(attempt_id, WithdrawalState::Submitted, f) {
            Ok(true) => Ok(()),
            Ok(false) => Err(LedgerError::WithdrawalInFlight(attempt_id.to_string())),
            Err(e) => {
                log::error!(
                    "RECONCILE: withdrawal {} outcome not written to the withdrawal log (receipt={}): {:#}",
                    attempt_id,
                    receipt.unwrap_or("none"),
                    e
                );
                Err(LedgerError::OutcomeNotPersisted {
                    attempt_id: attempt_id.to_string(),
                    receipt: receipt.map(str::to_string),
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    /// Failed withdrawals awaiting an operator decision
    pub fn reconciliation_queue(&self) -> Vec<WithdrawalRecord> {
        self.db.find_by_state(WithdrawalState::Failed)
    }

    /// Withdrawals left mid-flight, e.g. by a crash between debit and outcome
    pub fn pending_withdrawals(&self) -> Vec<WithdrawalRecord> {
        self.db.find_stalled()
    }

    pub fn get_withdrawal(&self, attempt_id: AttemptId) -> Option<WithdrawalRecord> {
        self.db.get(attempt_id)
    }

    pub fn withdrawals_for(&self, user_id: UserId) -> Vec<WithdrawalRecord> {
        self.db.find_by_user(user_id)
    }

    /// Operator re-drive of a failed attempt: resubmit the same transfer.
    pub async fn retry_failed(&self, attempt_id: AttemptId) -> LedgerResult<WithdrawalReceipt> {
        let record = self
            .db
            .get(attempt_id)
            .ok_or_else(|| LedgerError::UnknownAttempt(attempt_id.to_string()))?;
        let _guard = self.ledger.lock_account(record.user_id).await;

        log::warn!("Operator retry of withdrawal {} for user {}", attempt_id, record.user_id);
        self.submit(attempt_id, WithdrawalState::Failed, WithdrawalEvent::Retry).await
    }

    /// Operator refund of a failed attempt: credit the debited amount back.
    pub async fn refund_failed(&self, attempt_id: AttemptId) -> LedgerResult<WithdrawalRecord> {
        let record = self
            .db
            .get(attempt_id)
            .ok_or_else(|| LedgerError::UnknownAttempt(attempt_id.to_string()))?;
        let guard = self.ledger.lock_account(record.user_id).await;

        let next = try_transition(record.state, WithdrawalEvent::Refund)?;
        // Claim the record first so a concurrent refund cannot credit twice
        if !self.db.update_state_if(attempt_id, WithdrawalState::Failed, next)? {
            return Err(LedgerError::InvalidStateTransition {
                from: record.state.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        if let Err(e) = self.ledger.credit_locked(&guard, record.amount) {
            self.db.update_state_if(attempt_id, next, WithdrawalState::Failed)?;
            return Err(e);
        }

        log::warn!(
            "Withdrawal {} refunded: user={} amount={}",
            attempt_id, record.user_id, record.amount
        );
        self.db
            .get(attempt_id)
            .ok_or_else(|| LedgerError::UnknownAttempt(attempt_id.to_string()))
    }

    /// Operator decision on a withdrawal left in `Eligible`, `Debited` or
    /// `Submitted` by an earlier run: move it to `Failed` so it can be
    /// retried or refunded.
    ///
    /// The account lock is taken first, so a withdrawal still running in this
    /// process finishes before this sees it. For `Eligible` records the
    /// ledger may or may not have been debited; check the balance before
    /// refunding.
    pub async fn abandon_stalled(
        &self,
        attempt_id: AttemptId,
        reason: &str,
    ) -> LedgerResult<WithdrawalRecord> {
        let record = self
            .db
            .get(attempt_id)
            .ok_or_else(|| LedgerError::UnknownAttempt(attempt_id.to_string()))?;
        let _guard = self.ledger.lock_account(record.user_id).await;

        // Re-read under the lock
        let record = self
            .db
            .get(attempt_id)
            .ok_or_else(|| LedgerError::UnknownAttempt(attempt_id.to_string()))?;
        let next = try_transition(record.state, WithdrawalEvent::Abandon)?;
        let note = format!("abandoned in state {}: {}", record.state, reason);
        if !self.db.update_if(attempt_id, record.state, |r| {
            r.state = next;
            r.error = Some(note.clone());
        })? {
            return Err(LedgerError::WithdrawalInFlight(attempt_id.to_string()));
        }

        log::error!(
            "RECONCILE: withdrawal {} {}: user={} amount={} minor={} dest={}",
            attempt_id,
            note,
            record.user_id,
            record.amount,
            record.amount_minor,
            record.destination
        );
        self.db
            .get(attempt_id)
            .ok_or_else(|| LedgerError::UnknownAttempt(attempt_id.to_string()))
    }
}
