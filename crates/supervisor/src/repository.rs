//! Strategy persistence
//!
//! Strategies survive restarts as `StrategyRecord` documents: the template
//! plus lifecycle state and timestamps. Two repositories are provided, an
//! in-memory one for tests and a JSON-file one that keeps one document per
//! strategy under a directory.

use crate::state::StrategyState;
use arka_ports::RepositoryError;
use arka_strategy::StrategyTemplate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Persisted form of one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub id: String,
    pub template: StrategyTemplate,
    pub state: StrategyState,
    pub created_at: DateTime<Utc>,
    pub last_state_change: DateTime<Utc>,
}

pub trait StrategyRepository: Send + Sync {
    fn save(&self, record: &StrategyRecord) -> Result<(), RepositoryError>;
    fn load(&self, id: &str) -> Result<StrategyRecord, RepositoryError>;
    fn load_all(&self) -> Result<Vec<StrategyRecord>, RepositoryError>;
    fn delete(&self, id: &str) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryRepository {
    records: RwLock<HashMap<String, StrategyRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StrategyRepository for InMemoryRepository {
    fn save(&self, record: &StrategyRecord) -> Result<(), RepositoryError> {
        self.records.write().unwrap().insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<StrategyRecord, RepositoryError> {
        self.records
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    fn load_all(&self) -> Result<Vec<StrategyRecord>, RepositoryError> {
        Ok(self.records.read().unwrap().values().cloned().collect())
    }

    fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.records
            .write()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

/// One `<id>.json` document per strategy under `dir`. Writes go through a
/// temporary file and rename so a crash never leaves a half-written
/// document behind.
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl StrategyRepository for JsonFileRepository {
    fn save(&self, record: &StrategyRecord) -> Result<(), RepositoryError> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        let path = self.path_for(&record.id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, id: &str) -> Result<StrategyRecord, RepositoryError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        let json = std::fs::read_to_string(&path)?;
        serde_json::from_str(&json).map_err(|e| RepositoryError::Corrupt(e.to_string()))
    }

    fn load_all(&self) -> Result<Vec<StrategyRecord>, RepositoryError> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&json) {
                Ok(record) => out.push(record),
                Err(e) => log::warn!("skipping corrupt strategy document {path:?}: {e}"),
            }
        }
        Ok(out)
    }

    fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }
}
