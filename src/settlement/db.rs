//! Withdrawal log
//!
//! Every attempt and its state, kept in memory and (optionally) snapshotted
//! to a JSON file after each change. Conditional updates guard the FSM the
//! same way a compare-and-set on a database row would.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};

use crate::account::UserId;
use crate::settlement::state::WithdrawalState;
use crate::settlement::types::{AttemptId, WithdrawalRecord};
use crate::store::json_file::write_atomic;

type RecordMap = BTreeMap<AttemptId, WithdrawalRecord>;

pub struct WithdrawalDb {
    records: Mutex<RecordMap>,
    path: Option<PathBuf>,
}

impl WithdrawalDb {
    /// Log that lives only as long as the process
    pub fn in_memory() -> Self {
        Self { records: Mutex::new(RecordMap::new()), path: None }
    }

    /// Log persisted at `path`; existing records are loaded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut records = RecordMap::new();
        if path.exists() {
            let raw = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            let list: Vec<WithdrawalRecord> = serde_json::from_slice(&raw)
                .with_context(|| format!("parse {}", path.display()))?;
            for record in list {
                records.insert(record.attempt_id, record);
            }
        }
        log::info!("Withdrawal log {} opened with {} records", path.display(), records.len());

        Ok(Self { records: Mutex::new(records), path: Some(path) })
    }

    fn records(&self) -> MutexGuard<'_, RecordMap> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flush(&self, records: &RecordMap) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let list: Vec<&WithdrawalRecord> = records.values().collect();
        write_atomic(path, &serde_json::to_vec_pretty(&list)?)
    }

    /// Insert a new record. Returns false (and changes nothing) if the
    /// attempt id is already taken.
    pub fn create(&self, record: &WithdrawalRecord) -> Result<bool> {
        let mut records = self.records();
        if records.contains_key(&record.attempt_id) {
            return Ok(false);
        }
        records.insert(record.attempt_id, record.clone());
        if let Err(e) = self.flush(&records) {
            records.remove(&record.attempt_id);
            return Err(e);
        }
        Ok(true)
    }

    /// Drop a record that is still in `expected`.
    pub fn remove_if(&self, attempt_id: AttemptId, expected: WithdrawalState) -> Result<bool> {
        let mut records = self.records();
        if records.get(&attempt_id).map(|r| r.state) != Some(expected) {
            return Ok(false);
        }
        let removed = records.remove(&attempt_id);
        if let Err(e) = self.flush(&records) {
            if let Some(record) = removed {
                records.insert(attempt_id, record);
            }
            return Err(e);
        }
        Ok(true)
    }

    pub fn get(&self, attempt_id: AttemptId) -> Option<WithdrawalRecord> {
        self.records().get(&attempt_id).cloned()
    }

    /// Move `attempt_id` from `expected` to `new`.
    /// Returns false (and changes nothing) if the record is not in `expected`.
    pub fn update_state_if(
        &self,
        attempt_id: AttemptId,
        expected: WithdrawalState,
        new: WithdrawalState,
    ) -> Result<bool> {
        self.update_if(attempt_id, expected, |record| record.state = new)
    }

    /// Apply `f` to the record if it is in `expected`, stamping `updated_at`.
    pub fn update_if(
        &self,
        attempt_id: AttemptId,
        expected: WithdrawalState,
        f: impl FnOnce(&mut WithdrawalRecord),
    ) -> Result<bool> {
        let mut records = self.records();
        let Some(current) = records.get(&attempt_id) else {
            bail!("Withdrawal not found: {}", attempt_id);
        };
        if current.state != expected {
            return Ok(false);
        }

        let previous = current.clone();
        let mut updated = previous.clone();
        f(&mut updated);
        updated.updated_at = chrono::Utc::now().timestamp_millis();
        records.insert(attempt_id, updated);

        if let Err(e) = self.flush(&records) {
            records.insert(attempt_id, previous);
            return Err(e);
        }
        Ok(true)
    }

    /// Like [`update_if`](Self::update_if), but for facts that already
    /// happened outside the process (a transfer result). The change stays in
    /// memory even if the flush fails, so the next successful flush writes it.
    pub fn record_outcome(
        &self,
        attempt_id: AttemptId,
        expected: WithdrawalState,
        f: impl FnOnce(&mut WithdrawalRecord),
    ) -> Result<bool> {
        let mut records = self.records();
        let Some(current) = records.get_mut(&attempt_id) else {
            bail!("Withdrawal not found: {}", attempt_id);
        };
        if current.state != expected {
            return Ok(false);
        }
        f(current);
        current.updated_at = chrono::Utc::now().timestamp_millis();

        self.flush(&records)?;
        Ok(true)
    }

    pub fn find_by_state(&self, state: WithdrawalState) -> Vec<WithdrawalRecord> {
        self.records().values().filter(|r| r.state == state).cloned().collect()
    }

    /// Records whose transfer outcome was never recorded
    pub fn find_stalled(&self) -> Vec<WithdrawalRecord> {
        self.records().values().filter(|r| r.state.is_stalled()).cloned().collect()
    }

    pub fn find_by_user(&self, user_id: UserId) -> Vec<WithdrawalRecord> {
        self.records().values().filter(|r| r.user_id == user_id).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}
