use thiserror::Error;

use crate::config::SettingsError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("failed to load settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("failed to open extension storage: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to build rewrite client: {0}")]
    Client(String),
}
