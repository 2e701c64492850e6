//! Account ledger
//!
//! In-memory authoritative view of every account, serialized per user by a
//! keyed lock table and persisted through a [`BalanceStore`] after every
//! mutation.

pub mod account_ledger;
pub mod locks;

use serde::Deserialize;

pub use account_ledger::AccountLedger;
pub use locks::{AccountGuard, KeyedLocks};

/// What happens to the balance when a user links a different wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum_macros::Display, strum_macros::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RelinkPolicy {
    /// Keep the balance across wallet changes
    #[default]
    Preserve,
    /// Zero the balance on every link (legacy bot behavior)
    Reset,
}
