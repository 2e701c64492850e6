//! Core types for withdrawal settlement

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::UserId;
use crate::id_gen::AttemptIdGen;
use crate::settlement::state::WithdrawalState;

/// Attempt identifier - distinguishes retries of one logical withdrawal
/// from new withdrawals. A time-ordered u64, shown as 13-char Base32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        AttemptIdGen::from_base32(s.trim()).map(Self)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&AttemptIdGen::to_base32(self.0))
    }
}

impl Serialize for AttemptId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AttemptId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AttemptId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Result of one call to the token transfer service
///
/// - Success: the service accepted the transfer; carries its receipt id
/// - Failed: the service rejected it or could not be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success(String),
    Failed(String),
}

/// One withdrawal attempt as persisted in the withdrawal log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub attempt_id: AttemptId,
    pub user_id: UserId,
    /// Wallet the tokens go to
    pub destination: String,
    /// Whole game-tokens debited from the ledger
    pub amount: u64,
    /// `amount` scaled to the token's minor units
    pub amount_minor: u64,
    pub mint: String,
    pub state: WithdrawalState,
    /// Transfer signature / receipt id once confirmed
    pub receipt: Option<String>,
    /// Last transfer error, kept for reconciliation
    pub error: Option<String>,
    /// Times the transfer service has been called for this attempt
    pub submit_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// What the command layer gets back from a confirmed withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalReceipt {
    pub attempt_id: AttemptId,
    pub amount: u64,
    pub destination: String,
    pub receipt: String,
}

impl WithdrawalReceipt {
    pub fn from_record(record: &WithdrawalRecord) -> Option<Self> {
        Some(Self {
            attempt_id: record.attempt_id,
            amount: record.amount,
            destination: record.destination.clone(),
            receipt: record.receipt.clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_id_display_parse() {
        let id = AttemptId::new(AttemptIdGen::from_parts(1_700_000_000_000, 99));
        let s = id.to_string();
        assert_eq!(s.len(), 13);
        assert_eq!(AttemptId::parse(&s).unwrap(), id);
    }

    #[test]
    fn test_attempt_id_json() {
        let id = AttemptId::new(123_456_789);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: AttemptId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_receipt_needs_signature() {
        let mut record = WithdrawalRecord {
            attempt_id: AttemptId::new(1),
            user_id: 4001,
            destination: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".into(),
            amount: 25_000,
            amount_minor: 25_000_000_000,
            mint: "mint".into(),
            state: WithdrawalState::Submitted,
            receipt: None,
            error: None,
            submit_count: 1,
            created_at: 0,
            updated_at: 0,
        };
        assert!(WithdrawalReceipt::from_record(&record).is_none());

        record.receipt = Some("sig".into());
        let receipt = WithdrawalReceipt::from_record(&record).unwrap();
        assert_eq!(receipt.amount, 25_000);
        assert_eq!(receipt.receipt, "sig");
    }
}
