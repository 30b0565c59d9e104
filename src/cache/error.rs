use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to create cache directory '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to list cache directory '{0}'")]
    DirRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to read metadata for cache file '{0}'")]
    Metadata(PathBuf, #[source] std::io::Error),

    #[error("Failed to delete cache file '{0}'")]
    Deletion(PathBuf, #[source] std::io::Error),
}
