use crate::error::GeofetchError;
use log::info;
use std::io;
use std::path::{Path, PathBuf};

/// Overrides the default storage root when set.
pub const STORAGE_DIR_ENV: &str = "GEOFETCH_STORAGE";
const STORAGE_DIR_NAME: &str = "geofetch";

pub fn get_storage_dir() -> Result<PathBuf, GeofetchError> {
    if let Some(dir) = std::env::var_os(STORAGE_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|p| p.join(STORAGE_DIR_NAME))
        .ok_or_else(|| {
            GeofetchError::StorageDirResolution(format!(
                "no user data directory on this platform; set {STORAGE_DIR_ENV}"
            ))
        })
}

pub async fn ensure_storage_dir_exists(path: &Path) -> Result<(), GeofetchError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(GeofetchError::StorageDirCreation(
            path.to_path_buf(),
            io::Error::other("path exists but is not a directory"),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating storage directory: {}", path.display());
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| GeofetchError::StorageDirCreation(path.to_path_buf(), e))
        }
        Err(e) => Err(GeofetchError::StorageDirCreation(path.to_path_buf(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_nested_storage_dir() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        ensure_storage_dir_exists(&nested).await.unwrap();
        assert!(nested.is_dir());
        // Second call is a no-op.
        ensure_storage_dir_exists(&nested).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_file_as_storage_dir() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = ensure_storage_dir_exists(file.path()).await;
        assert!(matches!(result, Err(GeofetchError::StorageDirCreation(..))));
    }
}
