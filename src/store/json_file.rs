use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::BalanceStore;
use crate::account::{rekey, AccountMap};

/// Write `bytes` to `path` by writing a sibling temp file, syncing it, and
/// renaming it over the target.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let file = File::create(&tmp_path)
            .with_context(|| format!("create {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&tmp_path, path)
        .with_context(|| format!("rename {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}

/// JSON snapshot file, same layout as the bot's `users.json`:
/// `{ "<user_id>": { "wallet": "...", "balance": N } }`
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create store dir {}", parent.display()))?;
        }
        Ok(Self { path })
    }
}

impl BalanceStore for JsonFileStore {
    fn load(&self) -> Result<AccountMap> {
        if !self.path.exists() {
            log::info!("No balance file at {}, starting empty", self.path.display());
            return Ok(AccountMap::new());
        }
        let raw = fs::read(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        let accounts: AccountMap = serde_json::from_slice(&raw)
            .with_context(|| format!("parse {}", self.path.display()))?;
        Ok(rekey(accounts))
    }

    fn save(&self, accounts: &AccountMap) -> Result<()> {
        let json = serde_json::to_vec_pretty(accounts)?;
        write_atomic(&self.path, &json)
    }

    fn name(&self) -> &str {
        "json"
    }
}
