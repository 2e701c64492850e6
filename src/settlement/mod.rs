//! Withdrawal settlement
//!
//! Converts an in-game balance into an on-chain token transfer with
//! at-most-once semantics: the ledger debit is persisted before the transfer
//! service is called, and every attempt is tracked by id so a replay never
//! pays twice.

pub mod adapters;
pub mod coordinator;
pub mod db;
pub mod state;
pub mod types;

pub use adapters::{HttpTransferService, MockTransferService, TokenTransferService, TransferRequest};
pub use coordinator::{SettlementConfig, WithdrawalCoordinator};
pub use db::WithdrawalDb;
pub use state::WithdrawalState;
pub use types::{AttemptId, TransferOutcome, WithdrawalReceipt, WithdrawalRecord};
