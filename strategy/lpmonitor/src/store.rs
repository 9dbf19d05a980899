//! Persistence of position histories across restarts.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::history::PositionHistory;
use crate::types::PositionKey;

const STATE_VERSION: u32 = 1;

/// Keyed storage of [`PositionHistory`] records.
pub trait HistoryStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<PositionHistory>, MonitorError>;

    fn save(&self, history: &PositionHistory) -> Result<(), MonitorError>;

    fn remove(&self, key: &PositionKey) -> Result<(), MonitorError>;
}

#[derive(Serialize, Deserialize)]
struct StateDocument {
    version: u32,
    positions: Vec<PositionHistory>,
}

/// Every history in one JSON document, rewritten through a temp file and a
/// rename so a crash never leaves a truncated file behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<BTreeMap<PositionKey, PositionHistory>>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MonitorError> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(json) => {
                let document: StateDocument = serde_json::from_str(&json).map_err(|e| {
                    MonitorError::Persistence(format!("{}: {e}", path.display()))
                })?;
                if document.version != STATE_VERSION {
                    return Err(MonitorError::Persistence(format!(
                        "{}: unsupported state version {}",
                        path.display(),
                        document.version
                    )));
                }
                document
                    .positions
                    .into_iter()
                    .map(|history| (history.key.clone(), history))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::debug!(path = %path.display(), positions = records.len(), "history store opened");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<PositionKey, PositionHistory>>, MonitorError> {
        self.records
            .lock()
            .map_err(|_| MonitorError::Persistence("history store lock poisoned".to_string()))
    }

    fn flush(&self, records: &BTreeMap<PositionKey, PositionHistory>) -> Result<(), MonitorError> {
        let document = StateDocument {
            version: STATE_VERSION,
            positions: records.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| MonitorError::Persistence(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl HistoryStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<PositionHistory>, MonitorError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn save(&self, history: &PositionHistory) -> Result<(), MonitorError> {
        let mut records = self.lock()?;
        records.insert(history.key.clone(), history.clone());
        self.flush(&records)
    }

    fn remove(&self, key: &PositionKey) -> Result<(), MonitorError> {
        let mut records = self.lock()?;
        if records.remove(key).is_some() {
            self.flush(&records)?;
        }
        Ok(())
    }
}

/// Non-persistent store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<PositionKey, PositionHistory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<PositionKey, PositionHistory>>, MonitorError> {
        self.records
            .lock()
            .map_err(|_| MonitorError::Persistence("memory store lock poisoned".to_string()))
    }
}

impl HistoryStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<PositionHistory>, MonitorError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn save(&self, history: &PositionHistory) -> Result<(), MonitorError> {
        self.lock()?.insert(history.key.clone(), history.clone());
        Ok(())
    }

    fn remove(&self, key: &PositionKey) -> Result<(), MonitorError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
