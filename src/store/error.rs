use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open point database '{0}'")]
    Connect(PathBuf, #[source] sqlx::Error),

    #[error("'{0}' is not a valid table name")]
    InvalidTable(String),

    #[error("Point database query failed")]
    Query(#[from] sqlx::Error),
}
