use crate::cache::error::CacheError;
use crate::decode::error::DecodeError;
use crate::index::error::IndexError;
use crate::providers::error::ProviderError;
use crate::store::error::StoreError;
use crate::types::region::RegionError;
use crate::types::time::TimeRangeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeofetchError {
    #[error("Invalid region")]
    InvalidRegion(#[from] RegionError),

    #[error("Invalid time range")]
    InvalidTimeRange(#[from] TimeRangeError),

    #[error("Invalid variable `{name}` for data source {provider}; valid options are: {valid:?}")]
    InvalidVariable {
        provider: String,
        name: String,
        valid: Vec<String>,
    },

    #[error("Unknown data source `{name}`; registered sources are: {known:?}")]
    UnknownSource { name: String, known: Vec<String> },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Failed to create storage directory '{0}'")]
    StorageDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine storage directory: {0}")]
    StorageDirResolution(String),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
