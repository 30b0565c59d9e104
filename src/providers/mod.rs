//! Remote data providers.
//!
//! A [`Provider`] knows how to name, download and decode the raw file for one
//! (variable, region, day). Everything else (caching, ingestion, coverage
//! tracking) is shared and lives in the pipeline.

pub mod cmems;
pub mod credentials;
pub mod era5;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;

use crate::decode::error::DecodeError;
use crate::providers::error::ProviderError;
use crate::types::catalog::{Product, Variable};
use crate::types::region::BoundingBox;
use crate::types::sample::PointSample;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::Path;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Short lowercase identifier, also the raw cache subdirectory and the `source` column.
    fn name(&self) -> &'static str;

    /// Whether raw files only hold the requested region. Providers returning
    /// `false` download global grids and the raw file name omits the region.
    fn subsets_server_side(&self) -> bool;

    fn variables(&self) -> &[Variable];

    fn products(&self) -> &[Product];

    /// Deterministic file name for the raw file covering (variable, region, day).
    fn raw_file_name(&self, variable: &Variable, region: &BoundingBox, day: NaiveDate) -> String;

    /// Downloads the raw file to `target`. Only called on a cache miss.
    async fn fetch(
        &self,
        variable: &Variable,
        region: &BoundingBox,
        day: NaiveDate,
        target: &Path,
    ) -> Result<(), ProviderError>;

    /// Decodes a raw file into masked, normalised, region-filtered samples.
    /// Blocking; the pipeline runs it off the async executor.
    fn decode(
        &self,
        raw_file: &Path,
        variable: &Variable,
        region: &BoundingBox,
    ) -> Result<Vec<PointSample>, DecodeError>;

    /// Looks a variable up by request name or by table name.
    fn variable(&self, name: &str) -> Option<Variable> {
        self.variables()
            .iter()
            .find(|v| v.name == name || v.table == name)
            .copied()
    }

    fn product(&self, name: &str) -> Option<Product> {
        self.products().iter().find(|p| p.name == name).copied()
    }
}

/// The providers registered by default.
pub fn default_providers() -> Vec<std::sync::Arc<dyn Provider>> {
    vec![
        std::sync::Arc::new(era5::Era5::default()),
        std::sync::Arc::new(cmems::Cmems::default()),
    ]
}
