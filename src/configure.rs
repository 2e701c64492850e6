use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::ledger::RelinkPolicy;
use crate::settlement::SettlementConfig;
use crate::spin::PayoutTable;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,

    /// "json", "sled" or "memory"
    pub store_backend: String,
    pub store_path: String,
    pub withdrawal_log_path: String,
    pub relink_policy: RelinkPolicy,

    pub spin_cost: u64,
    pub min_withdraw: u64,
    pub win_table: Vec<u64>,
    pub token_decimals: u32,
    pub token_mint_address: String,

    /// Required unless `dry_run` is set
    pub transfer_service_url: String,
    pub transfer_timeout_ms: u64,
    /// Settle withdrawals against an in-process mock instead of the relay
    pub dry_run: bool,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::Message(msg));
        if self.spin_cost == 0 {
            return fail("spin_cost must be positive".into());
        }
        if self.min_withdraw == 0 {
            return fail("min_withdraw must be positive".into());
        }
        if self.win_table.is_empty() {
            return fail("win_table must have at least one outcome".into());
        }
        if 10u64.checked_pow(self.token_decimals).is_none() {
            return fail(format!("token_decimals {} is too large", self.token_decimals));
        }
        if self.token_mint_address.trim().is_empty() {
            return fail("token_mint_address must be set".into());
        }
        if !self.dry_run && self.transfer_service_url.trim().is_empty() {
            return fail("transfer_service_url must be set (or dry_run: true)".into());
        }
        if !["json", "sled", "memory"].contains(&self.store_backend.as_str()) {
            return fail(format!("unknown store_backend {:?}", self.store_backend));
        }
        Ok(())
    }

    pub fn payout_table(&self) -> Result<PayoutTable, ConfigError> {
        PayoutTable::new(self.win_table.clone()).map_err(|e| ConfigError::Message(e.to_string()))
    }

    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            min_withdraw: self.min_withdraw,
            token_decimals: self.token_decimals,
            token_mint_address: self.token_mint_address.clone(),
        }
    }
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Defaults, then the YAML file at `path` (optional), then `APP_*` env vars.
pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    let s = Config::builder()
        // Set defaults
        .set_default("log_level", "info")?
        .set_default("log_to_file", false)?
        .set_default("log_file", "log/spinledger.log")?
        .set_default("store_backend", "json")?
        .set_default("store_path", "data/users.json")?
        .set_default("withdrawal_log_path", "data/withdrawals.json")?
        .set_default("relink_policy", "preserve")?
        .set_default("spin_cost", 1000)?
        .set_default("min_withdraw", 20000)?
        .set_default("win_table", vec![0i64, 0, 2000, 5000, 10000])?
        .set_default("token_decimals", 6)?
        .set_default("token_mint_address", "")?
        .set_default("transfer_service_url", "")?
        .set_default("transfer_timeout_ms", 30000)?
        .set_default("dry_run", false)?
        // Add configuration from a file
        .add_source(File::with_name(path).required(false))
        // Add configuration from environment variables
        .add_source(
            Environment::with_prefix("APP")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("win_table"),
        )
        .build()?;

    let config: AppConfig = s.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
