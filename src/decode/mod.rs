//! Turning provider-native grid files into [`PointSample`]s.
//!
//! Every format-specific reader produces [`GridValue`]s and hands them to
//! [`select`], which applies the same three steps for all providers: drop
//! masked cells, move longitudes into [-180, 180), keep what falls inside the
//! requested region.

pub mod cf_time;
pub mod error;
pub mod grib;
#[cfg(feature = "netcdf")]
pub mod netcdf;

use crate::types::region::BoundingBox;
use crate::types::sample::PointSample;
use crate::types::time::stored_hour;
use chrono::{DateTime, Utc};

/// A single decoded grid cell, before any filtering. `time` is the validity time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridValue {
    pub value: f64,
    pub lat: f64,
    pub lon: f64,
    pub time: DateTime<Utc>,
}

/// Maps any longitude onto [-180, 180). 270 becomes -90, 180 becomes -180.
pub fn normalize_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Default mask: cells decoded as NaN or infinity (land, bitmap-masked) are invalid.
pub fn unmasked(cell: &GridValue) -> bool {
    cell.value.is_finite()
}

/// Mask for formats that flag invalid cells with a sentinel instead of NaN.
pub fn not_fill_value(fill: f64) -> impl Fn(&GridValue) -> bool {
    move |cell| unmasked(cell) && cell.value != fill
}

/// Applies `mask`, normalises longitudes and keeps cells inside `region`.
pub fn select<'a, I, M>(
    cells: I,
    mask: M,
    region: &'a BoundingBox,
    source: &'a str,
) -> impl Iterator<Item = PointSample> + 'a
where
    I: IntoIterator<Item = GridValue>,
    I::IntoIter: 'a,
    M: Fn(&GridValue) -> bool + 'a,
{
    cells
        .into_iter()
        .filter(move |cell| mask(cell))
        .map(|cell| GridValue {
            lon: normalize_longitude(cell.lon),
            ..cell
        })
        .filter(move |cell| region.contains(cell.lat, cell.lon))
        .map(move |cell| PointSample {
            value: cell.value,
            lat: cell.lat,
            lon: cell.lon,
            time: stored_hour(cell.time),
            source: source.to_string(),
        })
}
