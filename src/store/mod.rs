//! Persistent key-value storage for the decision record
//!
//! The record is kept as two string entries, mirroring browser local storage:
//! - a boolean-as-string "started" flag
//! - an integer-as-string epoch-millisecond timestamp

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::models::{DecisionRecord, StorageConfig};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur when reading or writing the store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to access store file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse store contents: {0}")]
    Parse(String),

    #[error("Failed to serialize store contents: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String-keyed persistent storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
}

/// Keys under which the decision record is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKeys {
    pub started: String,
    pub timestamp: String,
}

impl Default for RecordKeys {
    fn default() -> Self {
        StorageConfig::default().into()
    }
}

impl From<StorageConfig> for RecordKeys {
    fn from(config: StorageConfig) -> Self {
        Self {
            started: config.started_key,
            timestamp: config.timestamp_key,
        }
    }
}

/// Read the prior decision record.
///
/// An unreadable store or malformed entries yield `None`, exactly like a
/// store that never saw a transition.
pub fn load_record(
    store: &dyn KeyValueStore,
    keys: &RecordKeys,
    now_millis: i64,
) -> Option<DecisionRecord> {
    let entries = store
        .get(&keys.started)
        .and_then(|started| Ok((started, store.get(&keys.timestamp)?)));

    match entries {
        Ok((started, timestamp)) => {
            let record =
                DecisionRecord::from_entries(started.as_deref(), timestamp.as_deref(), now_millis);
            if record.is_none() && (started.is_some() || timestamp.is_some()) {
                tracing::debug!(?started, ?timestamp, "ignoring malformed decision record");
            }
            record
        }
        Err(e) => {
            tracing::warn!(error = %e, "decision store unavailable, treating as no prior session");
            None
        }
    }
}

/// Write the decision record (flag first, then timestamp)
pub fn save_record(
    store: &dyn KeyValueStore,
    keys: &RecordKeys,
    record: &DecisionRecord,
) -> StoreResult<()> {
    store.set(&keys.started, &record.started_entry())?;
    store.set(&keys.timestamp, &record.timestamp_entry())?;
    Ok(())
}
