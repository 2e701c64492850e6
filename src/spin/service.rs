use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::account::UserId;
use crate::errors::{LedgerError, LedgerResult};
use crate::ledger::AccountLedger;
use crate::spin::payout::PayoutTable;

/// Result of one spin, for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpinOutcome {
    pub cost: u64,
    pub payout: u64,
    pub balance: u64,
}

impl SpinOutcome {
    pub fn is_win(&self) -> bool {
        self.payout > 0
    }

    pub fn net(&self) -> i128 {
        self.payout as i128 - self.cost as i128
    }
}

/// Paid spin: debit the cost, draw, credit the payout, as one mutation.
pub struct SpinService {
    ledger: Arc<AccountLedger>,
    table: PayoutTable,
    spin_cost: u64,
    rng: Mutex<StdRng>,
}

impl SpinService {
    pub fn new(ledger: Arc<AccountLedger>, table: PayoutTable, spin_cost: u64) -> Self {
        Self::with_rng(ledger, table, spin_cost, StdRng::from_os_rng())
    }

    /// Deterministic draws, for tests and simulations
    pub fn with_seed(ledger: Arc<AccountLedger>, table: PayoutTable, spin_cost: u64, seed: u64) -> Self {
        Self::with_rng(ledger, table, spin_cost, StdRng::seed_from_u64(seed))
    }

    fn with_rng(ledger: Arc<AccountLedger>, table: PayoutTable, spin_cost: u64, rng: StdRng) -> Self {
        Self { ledger, table, spin_cost, rng: Mutex::new(rng) }
    }

    pub fn spin_cost(&self) -> u64 {
        self.spin_cost
    }

    fn draw(&self) -> u64 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        self.table.draw(&mut *rng)
    }

    pub async fn spin(&self, user_id: UserId) -> LedgerResult<SpinOutcome> {
        let guard = self.ledger.lock_account(user_id).await;

        if !self.ledger.get_account(user_id).is_some_and(|a| a.has_wallet()) {
            return Err(LedgerError::WalletRequired(user_id));
        }

        let cost = self.spin_cost;
        let (payout, account) = self.ledger.update(&guard, |account| {
            let available = account.balance;
            account
                .debit(cost)
                .map_err(|_| LedgerError::InsufficientBalance { available, required: cost })?;

            let payout = self.draw();
            if payout > 0 {
                let balance = account.balance;
                account
                    .credit(payout)
                    .map_err(|_| LedgerError::BalanceOverflow { balance, amount: payout })?;
            }
            Ok(payout)
        })?;

        let outcome = SpinOutcome { cost, payout, balance: account.balance };
        log::info!(
            "User {} spun: {} net={} balance={}",
            user_id,
            if outcome.is_win() { "win" } else { "no win" },
            outcome.net(),
            outcome.balance
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RelinkPolicy;
    use crate::store::MemoryStore;

    const ADDR: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

    async fn setup(table: Vec<u64>, balance: u64) -> (Arc<AccountLedger>, SpinService) {
        let ledger =
            Arc::new(AccountLedger::open(Arc::new(MemoryStore::new()), RelinkPolicy::Preserve).unwrap());
        ledger.link_wallet(1, ADDR).await.unwrap();
        if balance > 0 {
            ledger.credit(1, balance).await.unwrap();
        }
        let spin = SpinService::with_seed(ledger.clone(), PayoutTable::new(table).unwrap(), 1000, 9);
        (ledger, spin)
    }

    #[tokio::test]
    async fn test_spin_requires_wallet() {
        let (_, spin) = setup(vec![0], 0).await;
        assert_eq!(spin.spin(2).await, Err(LedgerError::WalletRequired(2)));
    }

    #[tokio::test]
    async fn test_spin_insufficient_balance() {
        let (ledger, spin) = setup(vec![0], 999).await;
        assert_eq!(
            spin.spin(1).await,
            Err(LedgerError::InsufficientBalance { available: 999, required: 1000 })
        );
        assert_eq!(ledger.get_balance(1), 999);
    }

    #[tokio::test]
    async fn test_losing_spin() {
        let (ledger, spin) = setup(vec![0], 1500).await;
        let outcome = spin.spin(1).await.unwrap();
        assert_eq!(outcome, SpinOutcome { cost: 1000, payout: 0, balance: 500 });
        assert!(!outcome.is_win());
        assert_eq!(outcome.net(), -1000);
        assert_eq!(ledger.get_balance(1), 500);
    }

    #[tokio::test]
    async fn test_winning_spin() {
        let (ledger, spin) = setup(vec![5000], 1000).await;
        let outcome = spin.spin(1).await.unwrap();
        assert_eq!(outcome, SpinOutcome { cost: 1000, payout: 5000, balance: 5000 });
        assert_eq!(outcome.net(), 4000);
        assert_eq!(ledger.get_balance(1), 5000);
    }
}
