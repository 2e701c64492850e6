//! Withdrawal State Machine
//!
//! States, events and the transition function for one withdrawal attempt.

use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;

/// Withdrawal FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalState {
    /// Attempt accepted, wallet check pending
    Requested,
    /// Wallet linked and balance at or above the minimum
    Eligible,
    /// Balance captured and zeroed, persisted
    Debited,
    /// Transfer service called, waiting for result
    Submitted,
    /// Transfer accepted, receipt recorded ✅
    Confirmed,
    /// Transfer failed, funds debited and awaiting reconciliation ❌
    Failed,
    /// Operator credited the debited amount back
    Refunded,
}

impl WithdrawalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalState::Requested => "requested",
            WithdrawalState::Eligible => "eligible",
            WithdrawalState::Debited => "debited",
            WithdrawalState::Submitted => "submitted",
            WithdrawalState::Confirmed => "confirmed",
            WithdrawalState::Failed => "failed",
            WithdrawalState::Refunded => "refunded",
        }
    }

    /// No automatic transition leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalState::Confirmed | WithdrawalState::Failed | WithdrawalState::Refunded
        )
    }

    /// Left mid-flight: only an operator can move these on after a restart.
    pub fn is_stalled(&self) -> bool {
        matches!(
            self,
            WithdrawalState::Eligible | WithdrawalState::Debited | WithdrawalState::Submitted
        )
    }
}

impl std::fmt::Display for WithdrawalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FSM Events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalEvent {
    /// Wallet and minimum checks passed
    Validated,
    /// Balance captured and persisted
    Debit,
    /// About to call the transfer service
    Submit,
    /// Transfer service returned a receipt
    TransferOk,
    /// Transfer service returned an error
    TransferFail,
    /// Operator re-drives a failed attempt
    Retry,
    /// Operator refunds a failed attempt
    Refund,
    /// Operator gives up on an attempt whose outcome was never recorded
    Abandon,
}

/// State transition function
///
/// Invalid transitions return the current state (no change).
pub fn transition(current: WithdrawalState, event: WithdrawalEvent) -> WithdrawalState {
    use WithdrawalEvent::*;
    use WithdrawalState::*;

    match (current, event) {
        (Requested, Validated) => Eligible,
        (Eligible, Debit) => Debited,
        (Debited, Submit) => Submitted,
        (Submitted, TransferOk) => Confirmed,
        (Submitted, TransferFail) => Failed,

        // Operator recovery
        (Failed, Retry) => Submitted,
        (Failed, Refund) => Refunded,
        (Eligible | Debited | Submitted, Abandon) => Failed,

        _ => current,
    }
}

/// Like [`transition`], but an invalid move is an error.
pub fn try_transition(
    current: WithdrawalState,
    event: WithdrawalEvent,
) -> Result<WithdrawalState, LedgerError> {
    let next = transition(current, event);
    if next == current {
        return Err(LedgerError::InvalidStateTransition {
            from: current.as_str().to_string(),
            to: format!("{:?}", event),
        });
    }
    Ok(next)
}
