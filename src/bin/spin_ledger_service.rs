use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;

use spinledger::commands::{serve_lines, CommandDispatcher, GameServices};
use spinledger::configure::{self, AppConfig};
use spinledger::ledger::AccountLedger;
use spinledger::logger::setup_logger;
use spinledger::settlement::{
    AttemptId, HttpTransferService, MockTransferService, TokenTransferService, WithdrawalCoordinator,
    WithdrawalDb,
};
use spinledger::spin::SpinService;
use spinledger::store::open_store;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML config file
    #[arg(long, default_value = configure::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read "<user_id> /<command> [args]" lines from stdin, write JSON replies (default)
    Serve,
    /// List failed withdrawals awaiting reconciliation
    Queue,
    /// Re-drive the transfer of a failed withdrawal
    Retry { attempt_id: String },
    /// Credit a failed withdrawal back to the user's balance
    Refund { attempt_id: String },
    /// List withdrawals left mid-flight by an earlier run
    Stalled,
    /// Mark a mid-flight withdrawal as failed so it can be retried or refunded
    Abandon {
        attempt_id: String,
        /// Why, e.g. "relay shows no transfer"
        #[arg(long, default_value = "operator abandoned")]
        reason: String,
    },
}

fn transfer_service(config: &AppConfig) -> Result<Arc<dyn TokenTransferService>> {
    if config.dry_run {
        log::warn!("dry_run is set: withdrawals drain balances without moving any tokens");
        return Ok(Arc::new(MockTransferService::new("dry-run")));
    }
    let service = HttpTransferService::new(
        &config.transfer_service_url,
        Duration::from_millis(config.transfer_timeout_ms),
    )?;
    Ok(Arc::new(service))
}

fn build_services(config: &AppConfig) -> Result<Arc<GameServices>> {
    let store = open_store(&config.store_backend, &config.store_path)
        .context("balance store unavailable")?;
    let ledger = Arc::new(
        AccountLedger::open(Arc::from(store), config.relink_policy)
            .context("balance store unavailable")?,
    );

    let table = config.payout_table()?;
    log::info!(
        "Spin cost {}, win rate {:.2}, expected payout {:.1}",
        config.spin_cost,
        table.win_probability(),
        table.expected_payout()
    );
    let spin = Arc::new(SpinService::new(ledger.clone(), table, config.spin_cost));

    let db = Arc::new(WithdrawalDb::open(&config.withdrawal_log_path)?);
    let withdrawals = Arc::new(WithdrawalCoordinator::new(
        ledger.clone(),
        db,
        transfer_service(config)?,
        config.settlement_config(),
    ));

    for record in withdrawals.pending_withdrawals() {
        log::warn!(
            "Withdrawal {} left {} by an earlier run: user={} amount={}; resolve with `abandon`",
            record.attempt_id, record.state, record.user_id, record.amount
        );
    }
    let failed = withdrawals.reconciliation_queue();
    if !failed.is_empty() {
        log::warn!("{} failed withdrawals await reconciliation", failed.len());
    }

    Ok(Arc::new(GameServices { ledger, spin, withdrawals }))
}

async fn serve(services: Arc<GameServices>) -> Result<()> {
    log::info!("Serving {} accounts", services.ledger.account_count());
    let dispatcher = Arc::new(CommandDispatcher::new(services));
    log::info!("Serving commands on stdin: {:?}", dispatcher.commands());

    serve_lines(dispatcher, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    log::info!("stdin closed, all replies written");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = configure::load_config_from(&args.config).context("Failed to load config")?;
    setup_logger(&config).map_err(|e| anyhow::anyhow!("Failed to set up logger: {}", e))?;

    // A ledger without its store cannot run
    let services = build_services(&config)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(services).await?,
        Command::Queue => {
            for record in services.withdrawals.reconciliation_queue() {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Command::Retry { attempt_id } => {
            let id = AttemptId::parse(&attempt_id).map_err(anyhow::Error::msg)?;
            let receipt = services.withdrawals.retry_failed(id).await?;
            println!("{}", serde_json::to_string(&receipt)?);
        }
        Command::Refund { attempt_id } => {
            let id = AttemptId::parse(&attempt_id).map_err(anyhow::Error::msg)?;
            let record = services.withdrawals.refund_failed(id).await?;
            println!("{}", serde_json::to_string(&record)?);
        }
        Command::Stalled => {
            for record in services.withdrawals.pending_withdrawals() {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Command::Abandon { attempt_id, reason } => {
            let id = AttemptId::parse(&attempt_id).map_err(anyhow::Error::msg)?;
            let record = services.withdrawals.abandon_stalled(id, &reason).await?;
            println!("{}", serde_json::to_string(&record)?);
        }
    }
    Ok(())
}
