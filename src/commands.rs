//! Command dispatch
//!
//! Maps a command name to a handler taking `(user_id, args)` and returning a
//! structured reply. No transport and no prose: the chat layer decides how
//! a reply is worded.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::account::UserId;
use crate::errors::{LedgerError, LedgerResult};
use crate::ledger::AccountLedger;
use crate::settlement::{WithdrawalCoordinator, WithdrawalReceipt};
use crate::spin::{SpinOutcome, SpinService};

/// Everything a handler can reach
pub struct GameServices {
    pub ledger: Arc<AccountLedger>,
    pub spin: Arc<SpinService>,
    pub withdrawals: Arc<WithdrawalCoordinator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyData {
    Welcome { spin_cost: u64, min_withdraw: u64 },
    WalletLinked { wallet: String, balance: u64 },
    Balance { balance: u64 },
    Spin(SpinOutcome),
    Withdrawal(WithdrawalReceipt),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    pub ok: bool,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ReplyData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when an operator has to reconcile something
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub operator_alert: bool,
}

impl CommandReply {
    pub fn success(data: ReplyData) -> Self {
        Self { ok: true, code: "OK", data: Some(data), error: None, operator_alert: false }
    }

    pub fn failure(err: &LedgerError) -> Self {
        Self {
            ok: false,
            code: err.error_code(),
            data: None,
            error: Some(err.to_string()),
            operator_alert: err.is_operator_actionable(),
        }
    }

    pub fn unknown_command(name: &str) -> Self {
        Self {
            ok: false,
            code: "UNKNOWN_COMMAND",
            data: None,
            error: Some(format!("Unknown command: {}", name)),
            operator_alert: false,
        }
    }
}

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = LedgerResult<ReplyData>> + Send + 'a>>;
type Handler = for<'a> fn(&'a GameServices, UserId, &'a str) -> HandlerFuture<'a>;

fn handle_start<'a>(svc: &'a GameServices, _user_id: UserId, _args: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        Ok(ReplyData::Welcome {
            spin_cost: svc.spin.spin_cost(),
            min_withdraw: svc.withdrawals.config().min_withdraw,
        })
    })
}

fn handle_wallet<'a>(svc: &'a GameServices, user_id: UserId, args: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        let account = svc.ledger.link_wallet(user_id, args).await?;
        Ok(ReplyData::WalletLinked {
            wallet: account.wallet_address.unwrap_or_default(),
            balance: account.balance,
        })
    })
}

fn handle_balance<'a>(svc: &'a GameServices, user_id: UserId, _args: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move { Ok(ReplyData::Balance { balance: svc.ledger.get_balance(user_id) }) })
}

fn handle_spin<'a>(svc: &'a GameServices, user_id: UserId, _args: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move { svc.spin.spin(user_id).await.map(ReplyData::Spin) })
}

fn handle_withdraw<'a>(svc: &'a GameServices, user_id: UserId, _args: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move { svc.withdrawals.withdraw(user_id).await.map(ReplyData::Withdrawal) })
}

pub struct CommandDispatcher {
    services: Arc<GameServices>,
    handlers: BTreeMap<&'static str, Handler>,
}

impl CommandDispatcher {
    pub fn new(services: Arc<GameServices>) -> Self {
        let mut handlers: BTreeMap<&'static str, Handler> = BTreeMap::new();
        handlers.insert("start", handle_start);
        handlers.insert("wallet", handle_wallet);
        handlers.insert("balance", handle_balance);
        handlers.insert("spin", handle_spin);
        handlers.insert("withdraw", handle_withdraw);
        Self { services, handlers }
    }

    /// Registered command names, for the chat layer's command menu
    pub fn commands(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Run `name` (with or without a leading '/') for `user_id`.
    pub async fn dispatch(&self, user_id: UserId, name: &str, args: &str) -> CommandReply {
        let key = name.trim().trim_start_matches('/').to_lowercase();
        let Some(handler) = self.handlers.get(key.as_str()) else {
            log::debug!("User {} sent unknown command {:?}", user_id, name);
            return CommandReply::unknown_command(name);
        };

        match handler(&self.services, user_id, args).await {
            Ok(data) => CommandReply::success(data),
            Err(err) => {
                if err.is_operator_actionable() {
                    log::error!("/{} for user {} needs attention: {}", key, user_id, err);
                } else {
                    log::info!("/{} for user {} rejected: {}", key, user_id, err);
                }
                CommandReply::failure(&err)
            }
        }
    }
}

/// Split `"<user_id> /<command> [args...]"` into its parts.
pub fn parse_command_line(line: &str) -> Option<(UserId, &str, &str)> {
    let line = line.trim();
    let (user, rest) = line.split_once(char::is_whitespace)?;
    let user_id = user.parse::<UserId>().ok()?;
    let rest = rest.trim_start();
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if !name.starts_with('/') || name.len() < 2 {
        return None;
    }
    Some((user_id, name, args.trim()))
}

/// One output line: replies can finish out of order, so each names its request
#[derive(Debug, Serialize)]
pub struct LineReply {
    pub user_id: UserId,
    pub command: String,
    #[serde(flatten)]
    pub reply: CommandReply,
}

/// Read command lines from `input` until EOF and write one JSON reply line
/// per command to `output`.
///
/// Every command runs in its own task, so a slow withdrawal only holds up
/// its own user. Returns `output` once every reply has been written.
pub async fn serve_lines<R, W>(
    dispatcher: Arc<CommandDispatcher>,
    input: R,
    mut output: W,
) -> std::io::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        Ok::<W, std::io::Error>(output)
    });

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some((user_id, name, args)) = parse_command_line(&line) else {
            let reply = serde_json::json!({ "ok": false, "code": "PARSE_ERROR", "error": line });
            let _ = tx.send(format!("{}\n", reply));
            continue;
        };
        let (command, args) = (name.to_string(), args.to_string());
        let dispatcher = dispatcher.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let reply = dispatcher.dispatch(user_id, &command, &args).await;
            match serde_json::to_string(&LineReply { user_id, command, reply }) {
                Ok(json) => {
                    let _ = tx.send(format!("{}\n", json));
                }
                Err(e) => log::error!("Failed to encode reply for user {}: {}", user_id, e),
            }
        });
    }

    // The writer finishes once the last command task drops its sender
    drop(tx);
    writer.await.map_err(std::io::Error::other)?
}
