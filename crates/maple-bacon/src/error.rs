use std::sync::Arc;

use crate::fetch::FetchError;

/// Errors surfaced by the cache and the download pipeline.
///
/// The type is `Clone` so a single terminal result can be fanned out to every
/// subscriber of a shared download.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MapleBaconError {
    #[error("Transport error: {0}")]
    Transport(#[from] FetchError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Could not decode data fetched from {locator}")]
    Decode { locator: String },

    #[error("Transformer {transformer} produced no result")]
    Transform { transformer: String },

    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: Arc<std::io::Error>,
    },

    #[error("Could not encode value for cache key {key}")]
    Encode { key: String },
}

// Manual implementation because of the Arc wrapping.
impl From<std::io::Error> for MapleBaconError {
    fn from(err: std::io::Error) -> Self {
        MapleBaconError::Storage {
            source: Arc::new(err),
        }
    }
}

impl MapleBaconError {
    /// Whether this error is the result of an explicit cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MapleBaconError::Cancelled)
    }
}

pub type Result<T, E = MapleBaconError> = std::result::Result<T, E>;
