pub mod keys;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub learn_sessions: sled::Tree,
    pub behavior_events: sled::Tree,
    pub study_records: sled::Tree,
    pub anomalies: sled::Tree,
    pub progress: sled::Tree,
    pub archives: sled::Tree,
    // Secondary index trees
    pub sessions_by_user: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let learn_sessions = db.open_tree(trees::LEARN_SESSIONS)?;
        let behavior_events = db.open_tree(trees::BEHAVIOR_EVENTS)?;
        let study_records = db.open_tree(trees::STUDY_RECORDS)?;
        let anomalies = db.open_tree(trees::ANOMALIES)?;
        let progress = db.open_tree(trees::PROGRESS)?;
        let archives = db.open_tree(trees::ARCHIVES)?;
        let sessions_by_user = db.open_tree(trees::SESSIONS_BY_USER)?;

        Ok(Self {
            db,
            learn_sessions,
            behavior_events,
            study_records,
            anomalies,
            progress,
            archives,
            sessions_by_user,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
