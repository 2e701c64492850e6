//! Durable balance stores
//!
//! Full-snapshot persistence of the `user_id -> Account` mapping. The ledger
//! loads once at startup and saves after every acknowledged mutation.

pub mod json_file;
pub mod memory;
pub mod sled_store;

use std::path::Path;

use anyhow::{bail, Result};

use crate::account::AccountMap;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// Snapshot persistence for the account ledger.
///
/// `save` must be all-or-nothing: after a crash, `load` returns either the
/// previous snapshot or the new one, never a mix or a truncated file.
pub trait BalanceStore: Send + Sync {
    fn load(&self) -> Result<AccountMap>;

    fn save(&self, accounts: &AccountMap) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Open the configured backend ("json", "sled" or "memory").
pub fn open_store(backend: &str, path: impl AsRef<Path>) -> Result<Box<dyn BalanceStore>> {
    match backend {
        "json" => Ok(Box::new(JsonFileStore::new(path)?)),
        "sled" => Ok(Box::new(SledStore::open(path)?)),
        "memory" => Ok(Box::new(MemoryStore::new())),
        other => bail!("Unknown store backend: {}", other),
    }
}
