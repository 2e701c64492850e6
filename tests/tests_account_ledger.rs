use std::sync::Arc;

use spinledger::ledger::{AccountLedger, RelinkPolicy};
use spinledger::store::{JsonFileStore, MemoryStore, SledStore};
use spinledger::LedgerError;

const WALLET: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
const WALLET_2: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

fn memory_ledger(policy: RelinkPolicy) -> (Arc<MemoryStore>, Arc<AccountLedger>) {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(AccountLedger::open(store.clone(), policy).unwrap());
    (store, ledger)
}

#[tokio::test]
async fn test_unknown_user_has_zero_balance() {
    let (_, ledger) = memory_ledger(RelinkPolicy::Preserve);
    assert_eq!(ledger.get_balance(77), 0);
    assert!(ledger.get_account(77).is_none());
    assert_eq!(ledger.debit(77, 1).await, Err(LedgerError::NoAccount(77)));
}

#[tokio::test]
async fn test_over_debit_leaves_balance_unchanged() {
    let (store, ledger) = memory_ledger(RelinkPolicy::Preserve);
    ledger.link_wallet(1, WALLET).await.unwrap();
    ledger.credit(1, 500).await.unwrap();
    let saves = store.save_count();

    let err = ledger.debit(1, 501).await.unwrap_err();
    assert_eq!(err, LedgerError::InsufficientBalance { available: 500, required: 501 });
    assert_eq!(ledger.get_balance(1), 500);
    assert_eq!(store.save_count(), saves);
}

#[tokio::test]
async fn test_invalid_address_leaves_account_unchanged() {
    let (_, ledger) = memory_ledger(RelinkPolicy::Reset);
    ledger.link_wallet(1, WALLET).await.unwrap();
    ledger.credit(1, 900).await.unwrap();

    let too_long = "A".repeat(45);
    for bad in ["", "short", "0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl", too_long.as_str()] {
        let err = ledger.link_wallet(1, bad).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ADDRESS");
    }
    let account = ledger.get_account(1).unwrap();
    assert_eq!(account.wallet_address.as_deref(), Some(WALLET));
    assert_eq!(account.balance, 900);

    assert!(ledger.link_wallet(2, "nope").await.is_err());
    assert!(ledger.get_account(2).is_none());
}

#[tokio::test]
async fn test_relink_policies() {
    let (_, preserve) = memory_ledger(RelinkPolicy::Preserve);
    preserve.link_wallet(1, WALLET).await.unwrap();
    preserve.credit(1, 3_000).await.unwrap();
    let account = preserve.link_wallet(1, WALLET_2).await.unwrap();
    assert_eq!(account.balance, 3_000);
    assert_eq!(account.wallet_address.as_deref(), Some(WALLET_2));

    let (_, reset) = memory_ledger(RelinkPolicy::Reset);
    reset.link_wallet(1, WALLET).await.unwrap();
    reset.credit(1, 3_000).await.unwrap();
    let account = reset.link_wallet(1, WALLET_2).await.unwrap();
    assert_eq!(account.balance, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_are_serialized() {
    let (store, ledger) = memory_ledger(RelinkPolicy::Preserve);
    ledger.link_wallet(1, WALLET).await.unwrap();
    ledger.credit(1, 10_000).await.unwrap();

    // 64 debits of 250 against 10_000: exactly 40 can succeed
    let mut handles = Vec::new();
    for _ in 0..64 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move { ledger.debit(1, 250).await }));
    }
    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(ok, 40);
    assert_eq!(ledger.get_balance(1), 0);
    assert_eq!(store.persisted()[&1].balance, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_across_users() {
    let (store, ledger) = memory_ledger(RelinkPolicy::Preserve);
    for user_id in 1..=8 {
        ledger.link_wallet(user_id, WALLET).await.unwrap();
    }

    let mut handles = Vec::new();
    for user_id in 1..=8u64 {
        for _ in 0..25 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.credit(user_id, user_id).await }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let persisted = store.persisted();
    for user_id in 1..=8u64 {
        assert_eq!(ledger.get_balance(user_id), 25 * user_id);
        assert_eq!(persisted[&user_id].balance, 25 * user_id);
    }
}

#[tokio::test]
async fn test_failed_save_reverts_mutation() {
    let (store, ledger) = memory_ledger(RelinkPolicy::Preserve);
    ledger.link_wallet(1, WALLET).await.unwrap();
    ledger.credit(1, 100).await.unwrap();

    store.set_fail_saves(true);
    assert!(matches!(ledger.credit(1, 50).await, Err(LedgerError::StoreUnavailable(_))));
    assert!(matches!(ledger.link_wallet(2, WALLET_2).await, Err(LedgerError::StoreUnavailable(_))));
    assert_eq!(ledger.get_balance(1), 100);
    assert!(ledger.get_account(2).is_none());

    store.set_fail_saves(false);
    assert_eq!(ledger.credit(1, 50).await.unwrap().balance, 150);
}

#[tokio::test]
async fn test_json_store_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("data").join("users.json");

    {
        let store = Arc::new(JsonFileStore::new(&path).unwrap());
        let ledger = AccountLedger::open(store, RelinkPolicy::Preserve).unwrap();
        ledger.link_wallet(1, WALLET).await.unwrap();
        ledger.credit(1, 1_234).await.unwrap();
        ledger.link_wallet(2, WALLET_2).await.unwrap();
    }

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["1"]["wallet"], WALLET);
    assert_eq!(raw["1"]["balance"], 1_234);

    let store = Arc::new(JsonFileStore::new(&path).unwrap());
    let ledger = AccountLedger::open(store, RelinkPolicy::Preserve).unwrap();
    assert_eq!(ledger.account_count(), 2);
    assert_eq!(ledger.get_balance(1), 1_234);
    let account = ledger.get_account(2).unwrap();
    assert_eq!(account.user_id, 2);
    assert_eq!(account.wallet_address.as_deref(), Some(WALLET_2));
}

#[tokio::test]
async fn test_sled_store_reload() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(SledStore::open(dir.path().join("ledger.sled")).unwrap());

    let ledger = AccountLedger::open(store.clone(), RelinkPolicy::Preserve).unwrap();
    ledger.link_wallet(5, WALLET).await.unwrap();
    ledger.credit(5, 42).await.unwrap();
    drop(ledger);

    let reloaded = AccountLedger::open(store, RelinkPolicy::Preserve).unwrap();
    assert_eq!(reloaded.get_balance(5), 42);
    assert_eq!(reloaded.get_account(5).unwrap().user_id, 5);
}

#[tokio::test]
async fn test_store_ledger_store_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    std::fs::write(
        &path,
        format!(
            r#"{{ "10": {{ "wallet": "{}", "balance": 7000 }}, "11": {{ "balance": 0 }} }}"#,
            WALLET
        ),
    )
    .unwrap();

    let store = Arc::new(JsonFileStore::new(&path).unwrap());
    let before = spinledger::store::BalanceStore::load(store.as_ref()).unwrap();
    let ledger = AccountLedger::open(store.clone(), RelinkPolicy::Preserve).unwrap();
    assert_eq!(ledger.snapshot(), before);

    let memory = MemoryStore::new();
    spinledger::store::BalanceStore::save(&memory, &ledger.snapshot()).unwrap();
    assert_eq!(memory.persisted(), before);
    assert!(!ledger.get_account(11).unwrap().has_wallet());
}
