pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub learners: sled::Tree,
    pub problems: sled::Tree,
    pub cards: sled::Tree,
    pub review_events: sled::Tree,
    pub cache_entries: sled::Tree,
    pub config_versions: sled::Tree,
    // Secondary index trees
    pub card_due_index: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let learners = db.open_tree(trees::LEARNERS)?;
        let problems = db.open_tree(trees::PROBLEMS)?;
        let cards = db.open_tree(trees::CARDS)?;
        let review_events = db.open_tree(trees::REVIEW_EVENTS)?;
        let cache_entries = db.open_tree(trees::CACHE_ENTRIES)?;
        let config_versions = db.open_tree(trees::CONFIG_VERSIONS)?;
        // Secondary index trees
        let card_due_index = db.open_tree(trees::CARD_DUE_INDEX)?;

        Ok(Self {
            db,
            learners,
            problems,
            cards,
            review_events,
            cache_entries,
            config_versions,
            card_due_index,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
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

/// Map a sled multi-tree transaction error back onto `StoreError`.
pub(crate) fn map_transaction_error(
    error: sled::transaction::TransactionError<StoreError>,
) -> StoreError {
    match error {
        sled::transaction::TransactionError::Abort(store_error) => store_error,
        sled::transaction::TransactionError::Storage(storage_error) => {
            StoreError::Sled(storage_error)
        }
    }
}
