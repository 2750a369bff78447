//! Durable Transfer Log
//!
//! A single persisted slot holding at most one [`TransferRecord`]. The
//! coordinator is the only writer; the record is rewritten on every state
//! transition, strictly before the mutation it describes.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use tracing::{debug, warn};

use super::error::TransferError;
use super::types::TransferRecord;

/// Fixed storage key of the pending transfer
pub const TRANSFER_LOG_KEY: &str = "pending_document_transfer";

/// Key-value persistence backing the transfer log
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// One file per key under `dir`
///
/// Writes go to a temp file that is fsynced and renamed over the target, so a
/// crash never leaves a torn value behind.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create log directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        {
            let mut file =
                File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
            file.write_all(value.as_bytes())
                .with_context(|| format!("write {}", tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("sync {}", tmp.display()))?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}

/// What the log slot currently holds
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Pending(TransferRecord),
    /// Unparseable JSON or an unrecognized state; carries the raw value
    Corrupt(String),
}

/// Single-slot transfer log over a [`KeyValueStore`]
#[derive(Clone)]
pub struct TransferLog {
    store: Arc<dyn KeyValueStore>,
}

impl TransferLog {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persist (or overwrite) the pending record
    pub fn write(&self, record: &TransferRecord) -> Result<(), TransferError> {
        let json = serde_json::to_string(record)
            .map_err(|e| TransferError::Log(format!("serialize {}: {e}", record.id)))?;
        self.store
            .set(TRANSFER_LOG_KEY, &json)
            .map_err(|e| TransferError::Log(format!("{e:#}")))?;
        debug!(transfer_id = %record.id, state = %record.state, "Transfer log written");
        Ok(())
    }

    pub fn read(&self) -> Result<Option<LogEntry>, TransferError> {
        let raw = self
            .store
            .get(TRANSFER_LOG_KEY)
            .map_err(|e| TransferError::Log(format!("{e:#}")))?;

        Ok(raw.map(|raw| match serde_json::from_str::<TransferRecord>(&raw) {
            Ok(record) => LogEntry::Pending(record),
            Err(e) => {
                warn!(error = %e, "Transfer log entry could not be parsed");
                LogEntry::Corrupt(raw)
            }
        }))
    }

    pub fn clear(&self) -> Result<(), TransferError> {
        self.store
            .remove(TRANSFER_LOG_KEY)
            .map_err(|e| TransferError::Log(format!("{e:#}")))
    }
}
