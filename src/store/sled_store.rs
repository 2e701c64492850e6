use std::convert::TryInto;
use std::path::Path;

use anyhow::{Context, Result};
use sled::{Batch, Db};

use super::BalanceStore;
use crate::account::{Account, AccountMap};

/// sled-backed store. Keys are big-endian user ids, values JSON accounts.
/// A snapshot is applied as one batch, so it lands atomically.
pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Ok(Self {
            db: sled::open(path).with_context(|| format!("open sled at {}", path.display()))?,
        })
    }

    fn flush(&self) -> sled::Result<usize> {
        self.db.flush()
    }
}

impl BalanceStore for SledStore {
    fn load(&self) -> Result<AccountMap> {
        let mut accounts = AccountMap::new();
        for entry in self.db.iter() {
            let (key, value) = entry?;
            let user_id = u64::from_be_bytes(
                key.as_ref().try_into().context("sled key is not a u64 user id")?,
            );
            let mut account: Account = serde_json::from_slice(&value)
                .with_context(|| format!("decode account {}", user_id))?;
            account.user_id = user_id;
            accounts.insert(user_id, account);
        }
        Ok(accounts)
    }

    fn save(&self, accounts: &AccountMap) -> Result<()> {
        let mut batch = Batch::default();
        for key in self.db.iter().keys() {
            let key = key?;
            let stale = key
                .as_ref()
                .try_into()
                .map(|k: [u8; 8]| !accounts.contains_key(&u64::from_be_bytes(k)))
                .unwrap_or(true);
            if stale {
                batch.remove(key);
            }
        }
        for (user_id, account) in accounts {
            batch.insert(user_id.to_be_bytes().to_vec(), serde_json::to_vec(account)?);
        }
        self.db.apply_batch(batch)?;
        self.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "sled"
    }
}
