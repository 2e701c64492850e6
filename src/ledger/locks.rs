use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::account::UserId;

/// Per-user lock table. Holding the guard for a user excludes every other
/// ledger mutation on that user; different users never contend.
#[derive(Default)]
pub struct KeyedLocks {
    table: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

/// Proof that the caller holds the lock for `user_id`.
pub struct AccountGuard {
    user_id: UserId,
    _guard: OwnedMutexGuard<()>,
}

impl AccountGuard {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: UserId) -> AccountGuard {
        let slot = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.entry(user_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        AccountGuard { user_id, _guard: slot.lock_owned().await }
    }
}
