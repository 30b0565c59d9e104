use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to read fetch index '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to write fetch index '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Failed to decode fetch index from '{0}'")]
    Decode(PathBuf, #[source] Box<bincode::error::DecodeError>),

    #[error("Failed to encode fetch index")]
    Encode(#[source] Box<bincode::error::EncodeError>),
}
