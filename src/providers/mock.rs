//! Offline provider for pipeline tests. Raw files are small JSON grids.

use crate::decode::error::DecodeError;
use crate::decode::{select, unmasked, GridValue};
use crate::providers::error::ProviderError;
use crate::providers::Provider;
use crate::types::catalog::{Correction, Product, Variable};
use crate::types::region::BoundingBox;
use crate::types::sample::PointSample;
use crate::types::time::IntoUtcDateTime;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const MOCK_VARIABLES: [Variable; 3] = [
    Variable::new("height", "mock_height"),
    Variable::new("u", "mock_u"),
    Variable::new("v", "mock_v"),
];

pub const MOCK_PRODUCTS: [Product; 4] = [
    Product::stored("height", "height"),
    Product::magnitude("uv", "u", "v"),
    Product::corrected("height_flux", "height", Correction::HOURLY_FLUX),
    Product::stored("u", "u"),
];

/// Longitudes in [0, 360) like a global reanalysis grid: 295.5 is -64.5.
pub const MOCK_LATS: [f64; 3] = [46.0, 46.5, 47.0];
pub const MOCK_LONS: [f64; 3] = [295.5, 296.0, 296.5];
pub const MOCK_HOURS: [i64; 2] = [0, 12];

#[derive(Debug, Serialize, Deserialize)]
struct MockCell {
    /// `None` marks a masked cell.
    value: Option<f64>,
    lat: f64,
    lon: f64,
    hour: i64,
}

#[derive(Debug, Default)]
pub struct MockProvider {
    fetch_calls: AtomicUsize,
    fail_fetch: AtomicBool,
    corrupt_output: AtomicBool,
    server_side: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_corrupt_output(&self, corrupt: bool) {
        self.corrupt_output.store(corrupt, Ordering::SeqCst);
    }

    /// Pretends raw files only hold the requested region.
    pub fn set_subsets_server_side(&self, server_side: bool) {
        self.server_side.store(server_side, Ordering::SeqCst);
    }

    /// Deterministic value of a cell: u is 3, v is 4, height varies with position.
    pub fn value_of(variable: &Variable, lat: f64, lon: f64, hour: i64) -> f64 {
        match variable.name {
            "u" => 3.0,
            "v" => 4.0,
            _ => lat + (lon - 295.0) + hour as f64 * 100.0,
        }
    }

    fn cells(variable: &Variable) -> Vec<MockCell> {
        let mut cells = Vec::new();
        for hour in MOCK_HOURS {
            for lat in MOCK_LATS {
                for lon in MOCK_LONS {
                    cells.push(MockCell {
                        value: Some(Self::value_of(variable, lat, lon, hour)),
                        lat,
                        lon,
                        hour,
                    });
                }
            }
        }
        // Land cell, must never reach the store.
        cells.push(MockCell {
            value: None,
            lat: 46.5,
            lon: 296.25,
            hour: 0,
        });
        cells
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn subsets_server_side(&self) -> bool {
        self.server_side.load(Ordering::SeqCst)
    }

    fn variables(&self) -> &[Variable] {
        &MOCK_VARIABLES
    }

    fn products(&self) -> &[Product] {
        &MOCK_PRODUCTS
    }

    fn raw_file_name(&self, variable: &Variable, region: &BoundingBox, day: NaiveDate) -> String {
        format!(
            "mock_{}_{}W{}E{}S{}N_{}.json",
            variable.name,
            region.west(),
            region.east(),
            region.south(),
            region.north(),
            day.format("%Y-%m-%d")
        )
    }

    async fn fetch(
        &self,
        variable: &Variable,
        _region: &BoundingBox,
        day: NaiveDate,
        target: &Path,
    ) -> Result<(), ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ProviderError::Auth {
                provider: "mock".to_string(),
                message: "rejected".to_string(),
            });
        }
        let body = if self.corrupt_output.load(Ordering::SeqCst) {
            b"{ not json".to_vec()
        } else {
            let payload = (day, Self::cells(variable));
            serde_json::to_vec(&payload)
                .map_err(|e| ProviderError::DownloadIo(std::io::Error::other(e)))?
        };
        tokio::fs::write(target, body)
            .await
            .map_err(|e| ProviderError::Io(target.to_path_buf(), e))
    }

    fn decode(
        &self,
        raw_file: &Path,
        _variable: &Variable,
        region: &BoundingBox,
    ) -> Result<Vec<PointSample>, DecodeError> {
        let bytes =
            std::fs::read(raw_file).map_err(|e| DecodeError::Io(raw_file.to_path_buf(), e))?;
        let (day, cells): (NaiveDate, Vec<MockCell>) = serde_json::from_slice(&bytes)
            .map_err(|e| DecodeError::Json(raw_file.to_path_buf(), e))?;
        let midnight = day.into_utc();
        let grid = cells.into_iter().map(|cell| GridValue {
            value: cell.value.unwrap_or(f64::NAN),
            lat: cell.lat,
            lon: cell.lon,
            time: midnight + TimeDelta::hours(cell.hour),
        });
        Ok(select(grid, unmasked, region, self.name()).collect())
    }
}
