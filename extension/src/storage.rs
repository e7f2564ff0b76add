use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

const APP_DIR_NAME: &str = "rewrite";
const STORAGE_FILE_NAME: &str = "storage.json";

pub type StorageEntries = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no data directory is available on this platform")]
    DataDirUnavailable,
    #[error("failed to access storage file: {0}")]
    Io(String),
    #[error("storage file is not a JSON object: {0}")]
    Parse(String),
}

/// Extension-local key/value storage.
///
/// File-backed stores re-read the file before every access so that separate
/// contexts sharing the same file observe each other's writes. Every access is
/// serialized through one async mutex.
pub struct LocalStore {
    entries: Mutex<StorageEntries>,
    path: Option<PathBuf>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(StorageEntries::new()),
            path: None,
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = read_entries(&path)?;
        Ok(Self {
            entries: Mutex::new(entries),
            path: Some(path),
        })
    }

    pub fn default_path() -> Result<PathBuf, StorageError> {
        let data_dir = dirs::data_dir().ok_or(StorageError::DataDirUnavailable)?;
        Ok(data_dir.join(APP_DIR_NAME).join(STORAGE_FILE_NAME))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the subset of `keys` that currently hold a value.
    pub async fn get(&self, keys: &[&str]) -> Result<StorageEntries, StorageError> {
        let mut entries = self.entries.lock().await;
        self.sync_from_disk(&mut entries).await?;

        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(*key)
                    .map(|value| ((*key).to_string(), value.clone()))
            })
            .collect())
    }

    pub async fn set(&self, items: StorageEntries) -> Result<(), StorageError> {
        self.transaction(move |entries| entries.extend(items)).await
    }

    /// Runs `apply` against the stored entries as one read-modify-write step.
    ///
    /// The change is committed to memory only after it has been persisted.
    pub async fn transaction<T>(
        &self,
        apply: impl FnOnce(&mut StorageEntries) -> T,
    ) -> Result<T, StorageError> {
        let mut entries = self.entries.lock().await;
        self.sync_from_disk(&mut entries).await?;

        let mut next = entries.clone();
        let result = apply(&mut next);
        self.persist(&next).await?;
        *entries = next;

        Ok(result)
    }

    async fn sync_from_disk(&self, entries: &mut StorageEntries) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        *entries = match tokio::fs::read_to_string(path).await {
            Ok(content) => parse_entries(&content)?,
            Err(err) if err.kind() == ErrorKind::NotFound => StorageEntries::new(),
            Err(err) => return Err(StorageError::Io(err.to_string())),
        };
        Ok(())
    }

    async fn persist(&self, entries: &StorageEntries) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StorageError::Io(err.to_string()))?;
        }

        let serialized = serde_json::to_string_pretty(entries)
            .map_err(|err| StorageError::Parse(err.to_string()))?;
        tokio::fs::write(path, serialized)
            .await
            .map_err(|err| StorageError::Io(err.to_string()))?;
        debug!(path = %path.display(), keys = entries.len(), "persisted extension storage");
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<StorageEntries, StorageError> {
    if !path.exists() {
        return Ok(StorageEntries::new());
    }

    let content = fs::read_to_string(path).map_err(|err| StorageError::Io(err.to_string()))?;
    parse_entries(&content)
}

fn parse_entries(content: &str) -> Result<StorageEntries, StorageError> {
    if content.trim().is_empty() {
        return Ok(StorageEntries::new());
    }

    serde_json::from_str::<StorageEntries>(content)
        .map_err(|err| StorageError::Parse(err.to_string()))
}
