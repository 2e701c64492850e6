use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};

use super::BalanceStore;
use crate::account::AccountMap;

/// In-memory store for tests. Can be told to fail saves.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<AccountMap>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail (or succeed again)
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Last snapshot written
    pub fn persisted(&self) -> AccountMap {
        self.snapshot.lock().unwrap().clone()
    }
}

impl BalanceStore for MemoryStore {
    fn load(&self) -> Result<AccountMap> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    fn save(&self, accounts: &AccountMap) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("memory store configured to fail");
        }
        *self.snapshot.lock().unwrap() = accounts.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
