//! Token transfer service trait
//!
//! The boundary to whatever actually moves tokens on chain.

use async_trait::async_trait;

use crate::settlement::types::{AttemptId, TransferOutcome};

/// Parameters of one on-chain transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Attempt id, passed through so the service can dedupe on its side too
    pub reference: AttemptId,
    pub mint: String,
    pub destination: String,
    /// Amount in the token's minor units
    pub amount_minor: u64,
}

/// Token transfer service - implemented once per transport
///
/// A call may block for as long as the chain takes to accept the transfer.
/// Implementations never panic on transport errors; they map them to
/// `TransferOutcome::Failed`.
#[async_trait]
pub trait TokenTransferService: Send + Sync {
    /// Submit a transfer of `amount_minor` units to `destination`.
    ///
    /// Returns:
    /// - Success(receipt): transfer accepted, receipt is the transaction signature
    /// - Failed(reason): rejected, unreachable or timed out
    async fn transfer(&self, request: &TransferRequest) -> TransferOutcome;

    /// Get service name for logging
    fn name(&self) -> &str;
}
