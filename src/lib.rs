mod cache;
pub mod decode;
mod error;
mod geofetch;
mod index;
mod pipeline;
mod providers;
mod store;
mod types;
mod utils;

pub use error::GeofetchError;
pub use geofetch::*;

pub use cache::error::CacheError;
pub use cache::{ClearReport, RawFileCache};
pub use decode::error::DecodeError;
pub use index::error::IndexError;
pub use index::span_index::{FetchedSpan, SpanIndex, INDEX_FILE_NAME};
pub use index::{dataset_key, FetchIndex};
pub use store::error::StoreError;
pub use store::{InsertReport, PointStore, DATABASE_FILE_NAME};
pub use utils::STORAGE_DIR_ENV;

pub use providers::cmems::{Cmems, CmemsConfig};
pub use providers::credentials::CdsCredentials;
pub use providers::era5::{Era5, Era5Config, Era5Format};
pub use providers::error::ProviderError;
pub use providers::{default_providers, Provider};

pub use types::catalog::{Correction, Product, ProductKind, Variable};
pub use types::region::{BoundingBox, RegionError};
pub use types::sample::{PointSample, PointSeries};
pub use types::time::{
    epoch_hours, from_epoch_hours, stored_hour, IntoUtcDateTime, TimeRange, TimeRangeError,
    EPOCH_ANCHOR,
};
