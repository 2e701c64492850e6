// Error kinds surfaced by the ledger, spin and settlement operations
use std::fmt;

use crate::account::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // Input errors
    InvalidAddress(String),
    InvalidAmount(u64),

    // Account errors
    NoAccount(UserId),
    WalletRequired(UserId),

    // Balance errors
    InsufficientBalance { available: u64, required: u64 },
    BelowMinimum { balance: u64, minimum: u64 },
    BalanceOverflow { balance: u64, amount: u64 },
    AmountOverflow { amount: u64, decimals: u32 },

    // Settlement errors
    TransferFailed { attempt_id: String, amount: u64, reason: String },
    WithdrawalInFlight(String),
    UnknownAttempt(String),
    InvalidStateTransition { from: String, to: String },
    /// The transfer service answered but the withdrawal log could not record it
    OutcomeNotPersisted { attempt_id: String, receipt: Option<String>, reason: String },

    // Persistence errors
    StoreUnavailable(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress(addr) => write!(f, "Invalid wallet address: {:?}", addr),
            Self::InvalidAmount(amount) => write!(f, "Invalid amount: {}", amount),
            Self::NoAccount(user_id) => write!(f, "No account for user {}", user_id),
            Self::WalletRequired(user_id) => {
                write!(f, "User {} has not linked a wallet", user_id)
            }
            Self::InsufficientBalance { available, required } => {
                write!(f, "Insufficient balance: have {}, need {}", available, required)
            }
            Self::BelowMinimum { balance, minimum } => {
                write!(f, "Balance {} below withdrawal minimum {}", balance, minimum)
            }
            Self::BalanceOverflow { balance, amount } => {
                write!(f, "Crediting {} to balance {} overflows", amount, balance)
            }
            Self::AmountOverflow { amount, decimals } => {
                write!(f, "Amount {} overflows at {} decimals", amount, decimals)
            }
            Self::TransferFailed { attempt_id, amount, reason } => {
                write!(f, "Transfer {} of {} failed: {}", attempt_id, amount, reason)
            }
            Self::WithdrawalInFlight(attempt_id) => {
                write!(f, "Withdrawal {} is already in flight", attempt_id)
            }
            Self::UnknownAttempt(attempt_id) => write!(f, "Withdrawal {} not found", attempt_id),
            Self::InvalidStateTransition { from, to } => {
                write!(f, "Invalid state transition: {} -> {}", from, to)
            }
            Self::OutcomeNotPersisted { attempt_id, receipt: Some(receipt), reason } => write!(
                f,
                "Withdrawal {} was paid (receipt {}) but not recorded: {}",
                attempt_id, receipt, reason
            ),
            Self::OutcomeNotPersisted { attempt_id, receipt: None, reason } => {
                write!(f, "Withdrawal {} failed and was not recorded: {}", attempt_id, reason)
            }
            Self::StoreUnavailable(msg) => write!(f, "Balance store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        LedgerError::StoreUnavailable(format!("{:#}", err))
    }
}

impl LedgerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "INVALID_ADDRESS",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::NoAccount(_) => "NO_ACCOUNT",
            Self::WalletRequired(_) => "WALLET_REQUIRED",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::BelowMinimum { .. } => "BELOW_MINIMUM",
            Self::BalanceOverflow { .. } => "BALANCE_OVERFLOW",
            Self::AmountOverflow { .. } => "AMOUNT_OVERFLOW",
            Self::TransferFailed { .. } => "TRANSFER_FAILED",
            Self::WithdrawalInFlight(_) => "WITHDRAWAL_IN_FLIGHT",
            Self::UnknownAttempt(_) => "UNKNOWN_ATTEMPT",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::OutcomeNotPersisted { .. } => "OUTCOME_NOT_PERSISTED",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    /// Errors that leave the system in a state a person has to look at.
    /// Everything else left the ledger untouched and can be retried as-is.
    pub fn is_operator_actionable(&self) -> bool {
        matches!(
            self,
            Self::TransferFailed { .. }
                | Self::OutcomeNotPersisted { .. }
                | Self::StoreUnavailable(_)
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
