pub mod rewrite_client;

use thiserror::Error;

use crate::storage::StorageError;

pub use rewrite_client::{RewriteApiRequest, RewriteApiResponse, RewriteClient};

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("Monthly rewrite limit reached ({used}/{limit})")]
    QuotaExceeded { used: u32, limit: u32 },
    #[error("Failed to rewrite: API request failed with status {0}")]
    Upstream(u16),
    #[error("Failed to rewrite: {0}")]
    Transport(String),
    #[error("Failed to rewrite: usage storage is unavailable: {0}")]
    Storage(#[from] StorageError),
}

impl RewriteError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, RewriteError::QuotaExceeded { .. })
    }
}
