use std::sync::{Arc, Mutex, MutexGuard};

use crate::account::{is_valid_address, Account, AccountMap, UserId};
use crate::errors::{LedgerError, LedgerResult};
use crate::ledger::locks::{AccountGuard, KeyedLocks};
use crate::ledger::RelinkPolicy;
use crate::store::BalanceStore;

pub struct AccountLedger {
    accounts: Mutex<AccountMap>,
    locks: KeyedLocks,
    store: Arc<dyn BalanceStore>,
    // Held across stage, write and commit of one mutation
    save_lock: Mutex<()>,
    relink_policy: RelinkPolicy,
}

impl AccountLedger {
    /// Load every account from `store`. A store that cannot be read is fatal
    /// to the caller: the ledger never starts without its backing data.
    pub fn open(store: Arc<dyn BalanceStore>, relink_policy: RelinkPolicy) -> LedgerResult<Self> {
        let accounts = store.load()?;
        log::info!(
            "Loaded {} accounts from {} store (relink policy: {})",
            accounts.len(),
            store.name(),
            relink_policy
        );
        Ok(Self {
            accounts: Mutex::new(accounts),
            locks: KeyedLocks::new(),
            store,
            save_lock: Mutex::new(()),
            relink_policy,
        })
    }

    fn accounts(&self) -> MutexGuard<'_, AccountMap> {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the exclusive per-user lock for a multi-step operation.
    pub async fn lock_account(&self, user_id: UserId) -> AccountGuard {
        self.locks.lock(user_id).await
    }

    /// Balance for `user_id`, 0 for users never seen.
    pub fn get_balance(&self, user_id: UserId) -> u64 {
        self.accounts().get(&user_id).map(|a| a.balance).unwrap_or(0)
    }

    pub fn get_account(&self, user_id: UserId) -> Option<Account> {
        self.accounts().get(&user_id).cloned()
    }

    pub fn snapshot(&self) -> AccountMap {
        self.accounts().clone()
    }

    pub fn account_count(&self) -> usize {
        self.accounts().len()
    }

    pub fn relink_policy(&self) -> RelinkPolicy {
        self.relink_policy
    }

    pub async fn link_wallet(&self, user_id: UserId, address: &str) -> LedgerResult<Account> {
        let address = address.trim();
        if !is_valid_address(address) {
            return Err(LedgerError::InvalidAddress(address.to_string()));
        }

        let guard = self.lock_account(user_id).await;
        let policy = self.relink_policy;
        let (_, account) = self.apply(&guard, true, |account| {
            account.wallet_address = Some(address.to_string());
            if policy == RelinkPolicy::Reset {
                account.balance = 0;
            }
            Ok(())
        })?;

        log::info!("User {} linked wallet {} (balance {})", user_id, address, account.balance);
        Ok(account)
    }

    pub async fn credit(&self, user_id: UserId, amount: u64) -> LedgerResult<Account> {
        let guard = self.lock_account(user_id).await;
        self.credit_locked(&guard, amount)
    }

    pub async fn debit(&self, user_id: UserId, amount: u64) -> LedgerResult<Account> {
        let guard = self.lock_account(user_id).await;
        self.debit_locked(&guard, amount)
    }

    pub fn credit_locked(&self, guard: &AccountGuard, amount: u64) -> LedgerResult<Account> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.update(guard, |account| {
            let balance = account.balance;
            account.credit(amount).map_err(|_| LedgerError::BalanceOverflow { balance, amount })
        })
        .map(|(_, account)| account)
    }

    pub fn debit_locked(&self, guard: &AccountGuard, amount: u64) -> LedgerResult<Account> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.update(guard, |account| {
            let available = account.balance;
            account
                .debit(amount)
                .map_err(|_| LedgerError::InsufficientBalance { available, required: amount })
        })
        .map(|(_, account)| account)
    }

    /// Run `f` against an existing account under the caller's lock and persist
    /// the result. If `f` fails, or the store write fails, nothing changes.
    pub fn update<T>(
        &self,
        guard: &AccountGuard,
        f: impl FnOnce(&mut Account) -> LedgerResult<T>,
    ) -> LedgerResult<(T, Account)> {
        self.apply(guard, false, f)
    }

    fn apply<T>(
        &self,
        guard: &AccountGuard,
        create: bool,
        f: impl FnOnce(&mut Account) -> LedgerResult<T>,
    ) -> LedgerResult<(T, Account)> {
        let user_id = guard.user_id();

        // Held until the change is committed: every save sees only committed
        // accounts plus this one change.
        let _save = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());

        let (value, updated, mut staged) = {
            let accounts = self.accounts();
            let mut working = match (accounts.get(&user_id), create) {
                (Some(account), _) => account.clone(),
                (None, true) => Account::new(user_id),
                (None, false) => return Err(LedgerError::NoAccount(user_id)),
            };
            let value = f(&mut working)?;
            (value, working, accounts.clone())
        };
        staged.insert(user_id, updated.clone());

        if let Err(e) = self.store.save(&staged) {
            log::error!("Persist failed for user {}, change dropped: {:#}", user_id, e);
            return Err(e.into());
        }
        self.accounts().insert(user_id, updated.clone());

        Ok((value, updated))
    }
}
