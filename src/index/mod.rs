//! Region/time index: which (dataset, region, time range) requests have
//! already been fetched, so the query layer can skip them.

pub mod error;
pub mod span_index;

use crate::index::error::IndexError;
use crate::types::region::BoundingBox;
use crate::types::time::TimeRange;
use async_trait::async_trait;

/// Coverage bookkeeping keyed by dataset, `"<provider>/<table>"`.
#[async_trait]
pub trait FetchIndex: Send + Sync {
    /// True when a previously recorded request fully contains this one.
    fn covers(&self, dataset: &str, region: &BoundingBox, range: &TimeRange) -> bool;

    /// Remembers that this request has been fetched and ingested.
    async fn record(
        &mut self,
        dataset: &str,
        region: &BoundingBox,
        range: &TimeRange,
    ) -> Result<(), IndexError>;
}

pub fn dataset_key(provider: &str, table: &str) -> String {
    format!("{provider}/{table}")
}
