use std::sync::Arc;
use std::time::Duration;

use spinledger::commands::{
    parse_command_line, serve_lines, CommandDispatcher, GameServices, ReplyData,
};
use spinledger::ledger::{AccountLedger, RelinkPolicy};
use spinledger::settlement::{
    MockTransferService, SettlementConfig, TransferOutcome, WithdrawalCoordinator, WithdrawalDb,
};
use spinledger::spin::{PayoutTable, SpinService};
use spinledger::store::MemoryStore;

const WALLET: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

fn dispatcher(win_table: Vec<u64>) -> (CommandDispatcher, Arc<GameServices>, Arc<MockTransferService>) {
    let ledger =
        Arc::new(AccountLedger::open(Arc::new(MemoryStore::new()), RelinkPolicy::Preserve).unwrap());
    let spin = Arc::new(SpinService::with_seed(
        ledger.clone(),
        PayoutTable::new(win_table).unwrap(),
        1_000,
        11,
    ));
    let mock = Arc::new(MockTransferService::new("mock"));
    let withdrawals = Arc::new(WithdrawalCoordinator::new(
        ledger.clone(),
        Arc::new(WithdrawalDb::in_memory()),
        mock.clone(),
        SettlementConfig {
            min_withdraw: 20_000,
            token_decimals: 6,
            token_mint_address: "MintAddr".into(),
        },
    ));
    let services = Arc::new(GameServices { ledger, spin, withdrawals });
    (CommandDispatcher::new(services.clone()), services, mock)
}

#[test]
fn test_registered_commands() {
    let (dispatcher, _, _) = dispatcher(vec![0]);
    assert_eq!(dispatcher.commands(), vec!["balance", "spin", "start", "wallet", "withdraw"]);
}

#[tokio::test]
async fn test_start_reports_rules() {
    let (dispatcher, _, _) = dispatcher(vec![0]);
    let reply = dispatcher.dispatch(1, "/start", "").await;
    assert!(reply.ok);
    assert_eq!(reply.data, Some(ReplyData::Welcome { spin_cost: 1_000, min_withdraw: 20_000 }));
}

#[tokio::test]
async fn test_unknown_command() {
    let (dispatcher, _, _) = dispatcher(vec![0]);
    let reply = dispatcher.dispatch(1, "/jackpot", "").await;
    assert!(!reply.ok);
    assert_eq!(reply.code, "UNKNOWN_COMMAND");
}

#[tokio::test]
async fn test_wallet_then_spin_then_withdraw() {
    let (dispatcher, services, mock) = dispatcher(vec![2_000]);

    let reply = dispatcher.dispatch(1, "/spin", "").await;
    assert_eq!(reply.code, "WALLET_REQUIRED");

    let reply = dispatcher.dispatch(1, "/wallet", "not-an-address").await;
    assert_eq!(reply.code, "INVALID_ADDRESS");

    let reply = dispatcher.dispatch(1, "/WALLET", WALLET).await;
    assert_eq!(
        reply.data,
        Some(ReplyData::WalletLinked { wallet: WALLET.to_string(), balance: 0 })
    );

    services.ledger.credit(1, 19_000).await.unwrap();
    let reply = dispatcher.dispatch(1, "withdraw", "").await;
    assert_eq!(reply.code, "BELOW_MINIMUM");
    assert!(!reply.operator_alert);

    // Every spin costs 1000 and pays 2000
    let reply = dispatcher.dispatch(1, "/spin", "").await;
    match reply.data {
        Some(ReplyData::Spin(outcome)) => {
            assert_eq!(outcome.payout, 2_000);
            assert_eq!(outcome.balance, 20_000);
        }
        other => panic!("expected spin outcome, got {:?}", other),
    }

    let reply = dispatcher.dispatch(1, "/balance", "").await;
    assert_eq!(reply.data, Some(ReplyData::Balance { balance: 20_000 }));

    let reply = dispatcher.dispatch(1, "/withdraw", "").await;
    assert!(reply.ok, "{:?}", reply);
    match reply.data {
        Some(ReplyData::Withdrawal(receipt)) => {
            assert_eq!(receipt.amount, 20_000);
            assert_eq!(receipt.destination, WALLET);
        }
        other => panic!("expected withdrawal receipt, got {:?}", other),
    }
    assert_eq!(mock.calls()[0].amount_minor, 20_000_000_000);

    let reply = dispatcher.dispatch(1, "/balance", "").await;
    assert_eq!(reply.data, Some(ReplyData::Balance { balance: 0 }));
}

#[tokio::test]
async fn test_failed_withdraw_raises_operator_alert() {
    let (dispatcher, services, mock) = dispatcher(vec![0]);
    mock.set_default_result(TransferOutcome::Failed("relay rejected".into()));

    dispatcher.dispatch(3, "/wallet", WALLET).await;
    services.ledger.credit(3, 25_000).await.unwrap();

    let reply = dispatcher.dispatch(3, "/withdraw", "").await;
    assert!(!reply.ok);
    assert_eq!(reply.code, "TRANSFER_FAILED");
    assert!(reply.operator_alert);
    assert_eq!(services.ledger.get_balance(3), 0);
    assert_eq!(services.withdrawals.reconciliation_queue().len(), 1);
}

#[tokio::test]
async fn test_parsed_line_dispatches() {
    let (dispatcher, _, _) = dispatcher(vec![0]);
    let line = format!("12 /wallet {}", WALLET);
    let (user_id, name, args) = parse_command_line(&line).unwrap();
    let reply = dispatcher.dispatch(user_id, name, args).await;
    assert!(reply.ok);
    assert_eq!(reply.code, "OK");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_withdraw_does_not_hold_other_users() {
    let (dispatcher, services, mock) = dispatcher(vec![0]);
    mock.set_delay(Duration::from_millis(300));
    dispatcher.dispatch(1, "/wallet", WALLET).await;
    services.ledger.credit(1, 25_000).await.unwrap();
    dispatcher.dispatch(2, "/wallet", WALLET).await;

    let input: &[u8] = b"1 /withdraw\n\nnot a command\n2 /balance\n";
    let output = serve_lines(Arc::new(dispatcher), input, Vec::new()).await.unwrap();

    let lines: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["code"], "PARSE_ERROR");
    assert_eq!(lines[1]["user_id"], 2);
    assert_eq!(lines[1]["command"], "/balance");
    assert_eq!(lines[2]["user_id"], 1);
    assert_eq!(lines[2]["command"], "/withdraw");
    assert_eq!(lines[2]["ok"], true);
    assert_eq!(mock.call_count(), 1);
}
