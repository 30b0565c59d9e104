use crate::cache::RawFileCache;
use crate::error::GeofetchError;
use crate::providers::error::ProviderError;
use crate::providers::Provider;
use crate::store::PointStore;
use crate::types::catalog::Variable;
use crate::types::region::BoundingBox;
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task;

/// Runs one (provider, variable, region, day) through cache, decode and ingest.
///
/// Fetches are serialised: clones share one lock, so no two provider requests
/// or store writes of the same client overlap.
#[derive(Debug, Clone)]
pub struct FetchOrchestrator {
    cache: RawFileCache,
    store: PointStore,
    fetch_lock: Arc<Mutex<()>>,
}

impl FetchOrchestrator {
    pub fn new(cache: RawFileCache, store: PointStore) -> Self {
        Self {
            cache,
            store,
            fetch_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn cache(&self) -> &RawFileCache {
        &self.cache
    }

    pub fn store(&self) -> &PointStore {
        &self.store
    }

    /// Cache path of the raw file for (variable, region, day). Providers that
    /// download global grids share one file across regions.
    pub fn raw_file_path(
        &self,
        provider: &dyn Provider,
        variable: &Variable,
        region: &BoundingBox,
        day: NaiveDate,
    ) -> PathBuf {
        let file_name = if provider.subsets_server_side() {
            provider.raw_file_name(variable, region, day)
        } else {
            provider.raw_file_name(variable, &BoundingBox::global(), day)
        };
        self.cache.path_for(provider.name(), &file_name)
    }

    /// Makes sure the samples of the raw file for `day` are in the point store.
    ///
    /// The provider is only contacted when the raw file is not cached. The file
    /// is decoded and offered to the store either way; duplicates are ignored.
    /// Returns `true` if at least one new row was written.
    ///
    /// A file that fails to decode stays on disk.
    pub async fn fetch(
        &self,
        provider: &Arc<dyn Provider>,
        variable: &Variable,
        region: &BoundingBox,
        day: NaiveDate,
    ) -> Result<bool, GeofetchError> {
        let _guard = self.fetch_lock.lock().await;
        self.cache.ensure_provider_dir(provider.name()).await?;
        let raw_file = self.raw_file_path(provider.as_ref(), variable, region, day);

        if self.cache.contains(&raw_file).await {
            info!(
                "Cache hit for {} {} on {} at {:?}",
                provider.name(),
                variable,
                day,
                raw_file
            );
        } else {
            warn!(
                "Cache miss for {} {} on {}. Fetching {:?}",
                provider.name(),
                variable,
                day,
                raw_file
            );
            if !provider.subsets_server_side() {
                debug!(
                    "{} serves global grids, {} is applied while decoding",
                    provider.name(),
                    region
                );
            }
            provider.fetch(variable, region, day, &raw_file).await?;
            if !self.cache.contains(&raw_file).await {
                return Err(ProviderError::MissingOutput(raw_file).into());
            }
        }

        let samples = {
            let provider = Arc::clone(provider);
            let raw_file = raw_file.clone();
            let variable = *variable;
            let region = *region;
            task::spawn_blocking(move || provider.decode(&raw_file, &variable, &region)).await?
        }
        .map_err(|e| {
            error!("Failed to decode {:?}, raw file kept: {}", raw_file, e);
            e
        })?;

        let report = self.store.insert_ignore(variable.table, &samples).await?;
        info!(
            "{} {}: inserted {} new rows (before {}, after {}) in region {} on {}",
            provider.name(),
            variable.table,
            report.inserted(),
            report.before,
            report.after,
            region,
            day
        );
        Ok(report.after > report.before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::error::DecodeError;
    use crate::providers::mock::{MockProvider, MOCK_VARIABLES};

    struct Fixture {
        _root: tempfile::TempDir,
        mock: Arc<MockProvider>,
        provider: Arc<dyn Provider>,
        orchestrator: FetchOrchestrator,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockProvider::new());
        let provider: Arc<dyn Provider> = mock.clone();
        let orchestrator = FetchOrchestrator::new(
            RawFileCache::new(root.path()),
            PointStore::in_dir(root.path()),
        );
        Fixture {
            _root: root,
            mock,
            provider,
            orchestrator,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 2, 1).unwrap()
    }

    fn region() -> BoundingBox {
        BoundingBox::new(-64.2, -63.4, 46.2, 47.0).unwrap()
    }

    #[tokio::test]
    async fn test_second_fetch_is_a_cache_hit_and_adds_nothing() {
        let f = fixture();
        let height = MOCK_VARIABLES[0];

        let first = f
            .orchestrator
            .fetch(&f.provider, &height, &region(), day())
            .await
            .unwrap();
        assert!(first);
        assert_eq!(f.mock.fetch_calls(), 1);
        let rows = f.orchestrator.store().row_count(height.table).await.unwrap();

        let second = f
            .orchestrator
            .fetch(&f.provider, &height, &region(), day())
            .await
            .unwrap();
        assert!(!second);
        assert_eq!(f.mock.fetch_calls(), 1);
        assert_eq!(
            f.orchestrator.store().row_count(height.table).await.unwrap(),
            rows
        );
    }

    #[tokio::test]
    async fn test_only_unmasked_cells_inside_region_are_stored() {
        let f = fixture();
        let height = MOCK_VARIABLES[0];
        f.orchestrator
            .fetch(&f.provider, &height, &region(), day())
            .await
            .unwrap();

        // lons -64.0 and -63.5, lats 46.5 and 47.0, two hours; the masked cell is dropped.
        assert_eq!(
            f.orchestrator.store().row_count(height.table).await.unwrap(),
            8
        );
        let everything = crate::types::time::TimeRange::for_day(day());
        let series = f
            .orchestrator
            .store()
            .query(height.table, &BoundingBox::global(), &everything)
            .await
            .unwrap();
        assert_eq!(series.len(), 8);
        for (value, lat, lon, _) in series.rows() {
            assert!(region().contains(lat, lon));
            assert!(value.is_finite());
        }
    }

    #[tokio::test]
    async fn test_refetch_after_cache_clear_adds_nothing() {
        let f = fixture();
        let height = MOCK_VARIABLES[0];
        f.orchestrator
            .fetch(&f.provider, &height, &region(), day())
            .await
            .unwrap();
        f.orchestrator.cache().clear("mock").await.unwrap();

        let again = f
            .orchestrator
            .fetch(&f.provider, &height, &region(), day())
            .await
            .unwrap();
        assert!(!again);
        assert_eq!(f.mock.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let f = fixture();
        f.mock.set_fail_fetch(true);
        let height = MOCK_VARIABLES[0];
        let result = f
            .orchestrator
            .fetch(&f.provider, &height, &region(), day())
            .await;
        assert!(matches!(
            result,
            Err(GeofetchError::Provider(ProviderError::Auth { .. }))
        ));
        let raw_file = f
            .orchestrator
            .raw_file_path(f.provider.as_ref(), &height, &region(), day());
        assert!(!raw_file.exists());
        assert_eq!(
            f.orchestrator.store().row_count(height.table).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_global_raw_file_is_shared_across_regions() {
        let f = fixture();
        let height = MOCK_VARIABLES[0];
        let east = BoundingBox::new(-63.6, -63.4, 46.2, 47.0).unwrap();
        f.orchestrator
            .fetch(&f.provider, &height, &region(), day())
            .await
            .unwrap();
        let added = f
            .orchestrator
            .fetch(&f.provider, &height, &east, day())
            .await
            .unwrap();

        // One download; the second region is cut from the cached global grid.
        assert_eq!(f.mock.fetch_calls(), 1);
        assert!(!added);
        assert_eq!(
            f.orchestrator.raw_file_path(f.provider.as_ref(), &height, &region(), day()),
            f.orchestrator.raw_file_path(f.provider.as_ref(), &height, &east, day())
        );
    }

    #[tokio::test]
    async fn test_server_side_subsets_are_cached_per_region() {
        let f = fixture();
        f.mock.set_subsets_server_side(true);
        let height = MOCK_VARIABLES[0];
        let west = BoundingBox::new(-64.2, -63.8, 46.2, 47.0).unwrap();
        f.orchestrator
            .fetch(&f.provider, &height, &region(), day())
            .await
            .unwrap();
        f.orchestrator
            .fetch(&f.provider, &height, &west, day())
            .await
            .unwrap();
        assert_eq!(f.mock.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_of_one_day_download_once() {
        let f = fixture();
        let height = MOCK_VARIABLES[0];
        let (region_a, region_b) = (region(), region());
        let (a, b) = tokio::join!(
            f.orchestrator.fetch(&f.provider, &height, &region_a, day()),
            f.orchestrator.fetch(&f.provider, &height, &region_b, day()),
        );
        // Exactly one of them wrote the rows.
        assert!(a.unwrap() ^ b.unwrap());
        assert_eq!(f.mock.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_raw_file() {
        let f = fixture();
        f.mock.set_corrupt_output(true);
        let height = MOCK_VARIABLES[0];
        let result = f
            .orchestrator
            .fetch(&f.provider, &height, &region(), day())
            .await;
        assert!(matches!(
            result,
            Err(GeofetchError::Decode(DecodeError::Json(..)))
        ));
        let raw_file = f
            .orchestrator
            .raw_file_path(f.provider.as_ref(), &height, &region(), day());
        assert!(raw_file.exists());
    }
}
