//! Raw file cache: provider downloads kept on disk under `<root>/<provider>/`.
//!
//! A file's presence is the only cache-hit signal. The ERA5 download and the
//! CMEMS subset tool both write to a temporary file in the same directory and
//! rename it only on success, so a present file is always complete.

pub mod error;

use crate::cache::error::CacheError;
use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::fs;

/// What a [`RawFileCache::clear`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub files: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct RawFileCache {
    root: PathBuf,
}

impl RawFileCache {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn provider_dir(&self, provider: &str) -> PathBuf {
        self.root.join(provider)
    }

    pub fn path_for(&self, provider: &str, file_name: &str) -> PathBuf {
        self.provider_dir(provider).join(file_name)
    }

    pub async fn contains(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false)
    }

    pub async fn ensure_provider_dir(&self, provider: &str) -> Result<PathBuf, CacheError> {
        let dir = self.provider_dir(provider);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::DirCreation(dir.clone(), e))?;
        Ok(dir)
    }

    /// Deletes every raw file of `provider`. Never touches the point database.
    pub async fn clear(&self, provider: &str) -> Result<ClearReport, CacheError> {
        let dir = self.provider_dir(provider);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Failed to clear {} cache: directory not found at {:?}",
                    provider, dir
                );
                return Ok(ClearReport::default());
            }
            Err(e) => return Err(CacheError::DirRead(dir, e)),
        };

        let mut report = ClearReport::default();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::DirRead(dir.clone(), e))?
        {
            let path = entry.path();
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| CacheError::Metadata(path.clone(), e))?;
            if !metadata.is_file() {
                continue;
            }
            fs::remove_file(&path)
                .await
                .map_err(|e| CacheError::Deletion(path, e))?;
            report.files += 1;
            report.bytes += metadata.len();
        }

        if report.files == 0 {
            info!("{} cache is empty", provider);
        } else {
            info!(
                "Emptied {} cache (deleted {} files, {:.1} MB)",
                provider,
                report.files,
                report.bytes as f64 / 1e6
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clear_missing_dir_reports_nothing() {
        let root = tempfile::tempdir().unwrap();
        let cache = RawFileCache::new(root.path());
        let report = cache.clear("era5").await.unwrap();
        assert_eq!(report, ClearReport::default());
    }

    #[tokio::test]
    async fn test_clear_empty_dir() {
        let root = tempfile::tempdir().unwrap();
        let cache = RawFileCache::new(root.path());
        cache.ensure_provider_dir("era5").await.unwrap();
        let report = cache.clear("era5").await.unwrap();
        assert_eq!(report.files, 0);
        assert_eq!(report.bytes, 0);
    }

    #[tokio::test]
    async fn test_clear_counts_files_and_bytes() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let cache = RawFileCache::new(root.path());
        cache.ensure_provider_dir("era5").await?;
        cache.ensure_provider_dir("cmems").await?;
        fs::write(cache.path_for("era5", "a.grib2"), vec![0u8; 1000]).await?;
        fs::write(cache.path_for("era5", "b.grib2"), vec![0u8; 24]).await?;
        fs::write(cache.path_for("cmems", "c.nc"), b"keep").await?;
        let db = root.path().join("geospatial.db");
        fs::write(&db, b"db").await?;

        let report = cache.clear("era5").await?;
        assert_eq!(report, ClearReport { files: 2, bytes: 1024 });
        assert!(!cache.contains(&cache.path_for("era5", "a.grib2")).await);
        assert!(cache.contains(&cache.path_for("cmems", "c.nc")).await);
        assert!(db.exists());
        Ok(())
    }
}
