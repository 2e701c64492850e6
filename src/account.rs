use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type UserId = u64;

/// Full ledger snapshot as persisted by a balance store.
pub type AccountMap = BTreeMap<UserId, Account>;

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const MIN_ADDRESS_LEN: usize = 32;
const MAX_ADDRESS_LEN: usize = 44;

/// Shape check for a wallet address: base58 alphabet, 32..=44 chars.
pub fn is_valid_address(address: &str) -> bool {
    let len = address.len();
    (MIN_ADDRESS_LEN..=MAX_ADDRESS_LEN).contains(&len)
        && address.bytes().all(|b| BASE58_ALPHABET.contains(&b))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(skip)]
    pub user_id: UserId,
    #[serde(rename = "wallet", default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub balance: u64,
}

impl Account {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, wallet_address: None, balance: 0 }
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet_address.is_some()
    }

    pub fn credit(&mut self, amount: u64) -> Result<(), &'static str> {
        self.balance = self.balance.checked_add(amount).ok_or("Balance overflow")?;
        Ok(())
    }

    pub fn debit(&mut self, amount: u64) -> Result<(), &'static str> {
        if self.balance < amount {
            return Err("Insufficient funds");
        }
        self.balance -= amount;
        Ok(())
    }

    /// Zero the balance, returning what was there.
    pub fn drain(&mut self) -> u64 {
        std::mem::take(&mut self.balance)
    }
}

/// The user id is the map key on disk, so it is restored after deserializing.
pub fn rekey(mut accounts: AccountMap) -> AccountMap {
    for (user_id, account) in accounts.iter_mut() {
        account.user_id = *user_id;
    }
    accounts
}
