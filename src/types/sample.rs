//! Point samples as stored in the database, and the parallel-array series
//! handed back to callers of `load`.

use crate::types::time::from_epoch_hours;
use chrono::{DateTime, Utc};
use polars::prelude::{df, DataFrame, IntoLazy, LazyFrame, PolarsResult};
use serde::{Deserialize, Serialize};

/// One observation: `time` is whole hours since the epoch anchor, `source` tags the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSample {
    pub value: f64,
    pub lat: f64,
    pub lon: f64,
    pub time: i64,
    pub source: String,
}

/// Query results as parallel arrays, ordered by (time, lat, lon).
///
/// Times are epoch hours as `f64`, because some products report bin-centre
/// times that fall on the half hour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSeries {
    pub values: Vec<f64>,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub times: Vec<f64>,
}

impl PointSeries {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            lats: Vec::with_capacity(capacity),
            lons: Vec::with_capacity(capacity),
            times: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: f64, lat: f64, lon: f64, time: f64) {
        self.values.push(value);
        self.lats.push(lat);
        self.lons.push(lon);
        self.times.push(time);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates `(value, lat, lon, time)` rows.
    pub fn rows(&self) -> impl Iterator<Item = (f64, f64, f64, f64)> + '_ {
        self.values
            .iter()
            .zip(&self.lats)
            .zip(&self.lons)
            .zip(&self.times)
            .map(|(((v, lat), lon), t)| (*v, *lat, *lon, *t))
    }

    /// Timestamps converted back to calendar time.
    pub fn datetimes(&self) -> Vec<DateTime<Utc>> {
        self.times.iter().map(|h| from_epoch_hours(*h)).collect()
    }

    /// Columns `val`, `lat`, `lon`, `time`.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        df!(
            "val" => &self.values,
            "lat" => &self.lats,
            "lon" => &self.lons,
            "time" => &self.times,
        )
    }

    pub fn lazy(&self) -> PolarsResult<LazyFrame> {
        Ok(self.to_dataframe()?.lazy())
    }
}

impl FromIterator<PointSample> for PointSeries {
    fn from_iter<I: IntoIterator<Item = PointSample>>(iter: I) -> Self {
        let mut series = PointSeries::empty();
        for sample in iter {
            series.push(sample.value, sample.lat, sample.lon, sample.time as f64);
        }
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f64, time: i64) -> PointSample {
        PointSample {
            value,
            lat: 46.5,
            lon: -64.0,
            time,
            source: "era5".to_string(),
        }
    }

    #[test]
    fn test_collect_from_samples() {
        let series: PointSeries = vec![sample(1.0, 10), sample(2.0, 11)].into_iter().collect();
        assert_eq!(series.len(), 2);
        assert_eq!(series.values, vec![1.0, 2.0]);
        assert_eq!(series.times, vec![10.0, 11.0]);
        assert_eq!(series.rows().nth(1), Some((2.0, 46.5, -64.0, 11.0)));
    }

    #[test]
    fn test_dataframe_columns() -> PolarsResult<()> {
        let series: PointSeries = vec![sample(1.5, 0)].into_iter().collect();
        let frame = series.lazy()?.collect()?;
        assert_eq!(frame.shape(), (1, 4));
        assert_eq!(frame.get_column_names(), ["val", "lat", "lon", "time"]);
        Ok(())
    }

    #[test]
    fn test_empty_series_is_well_formed() -> PolarsResult<()> {
        let series = PointSeries::empty();
        assert!(series.is_empty());
        assert_eq!(series.to_dataframe()?.shape(), (0, 4));
        assert!(series.datetimes().is_empty());
        Ok(())
    }
}
