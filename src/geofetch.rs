//! The main entry point: a client that fetches reanalysis grids on demand,
//! keeps them as points in a local database and serves region/time queries.

use crate::cache::{ClearReport, RawFileCache};
use crate::error::GeofetchError;
use crate::index::span_index::SpanIndex;
use crate::index::FetchIndex;
use crate::pipeline::orchestrator::FetchOrchestrator;
use crate::pipeline::query::QueryLayer;
use crate::providers::{default_providers, Provider};
use crate::store::PointStore;
use crate::types::catalog::{Product, Variable};
use crate::types::region::BoundingBox;
use crate::types::sample::PointSeries;
use crate::types::time::TimeRange;
use crate::utils::{ensure_storage_dir_exists, get_storage_dir};
use bon::bon;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Client for loading ERA5 and CMEMS data by bounding box and time range.
///
/// Everything lives under one storage root:
///
/// * `<root>/<provider>/` holds the raw files as downloaded,
/// * `<root>/geospatial.db` holds the decoded points, one table per variable,
/// * `<root>/fetch_index.bin` remembers which (region, day) requests were completed.
///
/// Create one with [`Geofetch::new()`] for the defaults, or with
/// [`Geofetch::builder()`] to pick the storage root, the providers or the
/// fetch index.
///
/// # Examples
///
/// ```rust,no_run
/// # use geofetch::{BoundingBox, Geofetch, GeofetchError, IntoUtcDateTime};
/// # use chrono::NaiveDate;
/// # #[tokio::main]
/// # async fn main() -> Result<(), GeofetchError> {
/// let client = Geofetch::new().await?;
/// let gulf = BoundingBox::new(-64.4, -63.4, 46.1, 47.0)?;
/// let day = NaiveDate::from_ymd_opt(2016, 2, 1).unwrap();
///
/// let waves = client
///     .load()
///     .source("era5")
///     .variable("waveheight")
///     .region(gulf)
///     .start(day.into_utc())
///     .end(day.and_hms_opt(23, 0, 0).unwrap().into_utc())
///     .call()
///     .await?;
/// println!("{} wave heights", waves.len());
/// # Ok(())
/// # }
/// ```
pub struct Geofetch {
    storage_dir: PathBuf,
    providers: Vec<Arc<dyn Provider>>,
    query: QueryLayer,
}

impl std::fmt::Debug for Geofetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geofetch")
            .field("storage_dir", &self.storage_dir)
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[bon]
impl Geofetch {
    /// Creates a client with the default storage root, the ERA5 and CMEMS
    /// providers and a persistent fetch index.
    ///
    /// The storage root is `$GEOFETCH_STORAGE` when set, otherwise
    /// `geofetch` inside the platform's data directory. It is created if
    /// it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`GeofetchError::StorageDirResolution`] if no storage root can be
    /// determined, [`GeofetchError::StorageDirCreation`] if it cannot be created
    /// and [`GeofetchError::Index`] if an existing fetch index is unreadable.
    pub async fn new() -> Result<Self, GeofetchError> {
        Self::builder().build().await
    }

    /// Creates a client with some defaults replaced.
    ///
    /// Start with [`Geofetch::builder()`], set any of the options below and
    /// finish with `.build().await`.
    ///
    /// * `storage_dir` - Root for raw files, the point database and the fetch index.
    /// * `providers` - Replaces the registered providers (ERA5 and CMEMS by default).
    /// * `index` - Replaces the persistent [`SpanIndex`] stored in the storage root.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use geofetch::{Era5, Era5Config, Geofetch, GeofetchError, Provider, SpanIndex};
    /// # use std::sync::Arc;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), GeofetchError> {
    /// let era5 = Era5::new(Era5Config {
    ///     poll_interval: std::time::Duration::from_secs(5),
    ///     ..Default::default()
    /// });
    /// let client = Geofetch::builder()
    ///     .storage_dir("/tmp/geofetch")
    ///     .providers(vec![Arc::new(era5) as Arc<dyn Provider>])
    ///     .index(Box::new(SpanIndex::in_memory()))
    ///     .build()
    ///     .await?;
    /// assert_eq!(client.storage_dir().to_str(), Some("/tmp/geofetch"));
    /// # Ok(())
    /// # }
    /// ```
    #[builder(start_fn = builder, finish_fn = build)]
    #[doc(hidden)]
    pub async fn build_client(
        #[builder(into)] storage_dir: Option<PathBuf>,
        providers: Option<Vec<Arc<dyn Provider>>>,
        index: Option<Box<dyn FetchIndex>>,
    ) -> Result<Self, GeofetchError> {
        let storage_dir = match storage_dir {
            Some(dir) => dir,
            None => get_storage_dir()?,
        };
        ensure_storage_dir_exists(&storage_dir).await?;

        let index = match index {
            Some(index) => index,
            None => Box::new(SpanIndex::in_dir(&storage_dir).await?),
        };
        let store = PointStore::in_dir(&storage_dir);
        let orchestrator = FetchOrchestrator::new(RawFileCache::new(&storage_dir), store.clone());

        Ok(Self {
            providers: providers.unwrap_or_else(default_providers),
            query: QueryLayer::new(orchestrator, store, index),
            storage_dir,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// The point database behind this client.
    pub fn store(&self) -> &PointStore {
        self.query.orchestrator().store()
    }

    /// Names of the registered providers, in registration order.
    pub fn sources(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    fn provider(&self, source: &str) -> Result<&Arc<dyn Provider>, GeofetchError> {
        self.providers
            .iter()
            .find(|p| p.name() == source)
            .ok_or_else(|| GeofetchError::UnknownSource {
                name: source.to_string(),
                known: self.sources().iter().map(|s| s.to_string()).collect(),
            })
    }

    /// The raw variables `source` can download, each stored in its own table.
    pub fn variables(&self, source: &str) -> Result<&[Variable], GeofetchError> {
        Ok(self.provider(source)?.variables())
    }

    /// The names accepted by [`Geofetch::load`] for `source`.
    pub fn products(&self, source: &str) -> Result<&[Product], GeofetchError> {
        Ok(self.provider(source)?.products())
    }

    /// Loads a product for a region and time range.
    ///
    /// Unless `fetch(false)` is set, every UTC day of the range that was not
    /// loaded before for this region is downloaded (or taken from the raw
    /// cache), decoded and stored first. The result is read from the point
    /// database and ordered by time, latitude, longitude.
    ///
    /// Finish the builder with `.call().await`.
    ///
    /// # Arguments
    ///
    /// * `source` - Provider name, `"era5"` or `"cmems"` by default.
    /// * `variable` - A product name of that provider, see [`Geofetch::products`].
    ///   Magnitude products such as `"wind_uv"` combine their two components.
    /// * `region` - The [`BoundingBox`] to load.
    /// * `start`, `end` - Inclusive UTC bounds. [`crate::IntoUtcDateTime`] converts
    ///   naive and local datetimes.
    /// * `fetch` - Whether to fetch missing days first. Defaults to `true`.
    ///
    /// # Errors
    ///
    /// * [`GeofetchError::UnknownSource`] / [`GeofetchError::InvalidVariable`] for
    ///   names that are not registered.
    /// * [`GeofetchError::InvalidTimeRange`] if `start` is after `end`.
    /// * [`GeofetchError::Provider`] if a download fails; days fetched before the
    ///   failure stay stored.
    /// * [`GeofetchError::Decode`] if a raw file is unreadable; the file is kept.
    /// * [`GeofetchError::Store`] for database failures.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use geofetch::{BoundingBox, Geofetch, GeofetchError};
    /// # use chrono::{TimeZone, Utc};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), GeofetchError> {
    /// let client = Geofetch::new().await?;
    /// let around = BoundingBox::new(-65.177, -63.177, 43.554, 45.554)?;
    ///
    /// let wind = client
    ///     .load()
    ///     .source("era5")
    ///     .variable("wind_uv")
    ///     .region(around)
    ///     .start(Utc.with_ymd_and_hms(2016, 3, 9, 0, 0, 0).unwrap())
    ///     .end(Utc.with_ymd_and_hms(2016, 3, 11, 0, 0, 0).unwrap())
    ///     .call()
    ///     .await?;
    ///
    /// for (speed, lat, lon, hour) in wind.rows().take(5) {
    ///     println!("{hour} {lat} {lon}: {speed:.2} m/s");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn load(
        &self,
        source: &str,
        variable: &str,
        region: BoundingBox,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        fetch: Option<bool>,
    ) -> Result<PointSeries, GeofetchError> {
        let provider = self.provider(source)?;
        let product = provider
            .product(variable)
            .ok_or_else(|| GeofetchError::InvalidVariable {
                provider: provider.name().to_string(),
                name: variable.to_string(),
                valid: provider
                    .products()
                    .iter()
                    .map(|p| p.name.to_string())
                    .collect(),
            })?;
        let range = TimeRange::new(start, end)?;

        self.query
            .load(provider, &product, &region, &range, fetch.unwrap_or(true))
            .await
    }

    /// Makes sure one day of one raw variable is stored, without querying.
    ///
    /// Returns `true` when new rows were written. The fetch index is not
    /// consulted, so the raw cache decides whether the provider is contacted.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use geofetch::{BoundingBox, Geofetch, GeofetchError};
    /// # use chrono::NaiveDate;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), GeofetchError> {
    /// let client = Geofetch::new().await?;
    /// let added = client
    ///     .fetch()
    ///     .source("era5")
    ///     .variable("significant_height_of_combined_wind_waves_and_swell")
    ///     .region(BoundingBox::new(-64.4, -63.4, 46.1, 47.0)?)
    ///     .day(NaiveDate::from_ymd_opt(2016, 2, 1).unwrap())
    ///     .call()
    ///     .await?;
    /// println!("new rows written: {added}");
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn fetch(
        &self,
        source: &str,
        variable: &str,
        region: BoundingBox,
        day: NaiveDate,
    ) -> Result<bool, GeofetchError> {
        let provider = self.provider(source)?;
        let resolved = provider
            .variable(variable)
            .ok_or_else(|| GeofetchError::InvalidVariable {
                provider: provider.name().to_string(),
                name: variable.to_string(),
                valid: provider
                    .variables()
                    .iter()
                    .map(|v| v.name.to_string())
                    .collect(),
            })?;

        self.query
            .orchestrator()
            .fetch(provider, &resolved, &region, day)
            .await
    }

    /// Deletes every raw file downloaded for `source`.
    ///
    /// Stored points and the fetch index are left alone, so later loads of
    /// the same requests are still answered from the database.
    pub async fn clear_cache(&self, source: &str) -> Result<ClearReport, GeofetchError> {
        let provider = self.provider(source)?;
        Ok(self.query.orchestrator().cache().clear(provider.name()).await?)
    }
}
