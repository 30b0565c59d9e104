//! NetCDF reader used for CMEMS subsets and ERA5 NetCDF downloads. Needs the
//! system NetCDF library.

use crate::decode::cf_time::CfTimeAxis;
use crate::decode::error::DecodeError;
use crate::decode::{not_fill_value, select, unmasked, GridValue};
use crate::types::region::BoundingBox;
use crate::types::sample::PointSample;
use std::path::Path;

const LATITUDE_NAMES: [&str; 2] = ["latitude", "lat"];
const LONGITUDE_NAMES: [&str; 2] = ["longitude", "lon"];
// CDS NetCDF files name their time axis `valid_time`.
const TIME_NAMES: [&str; 2] = ["time", "valid_time"];

/// Decodes `variable` (dimensions `time, [depth,] latitude, longitude`) into
/// samples inside `region`. Only the first depth level is read.
pub fn decode_netcdf(
    path: &Path,
    variable: &str,
    region: &BoundingBox,
    source: &str,
) -> Result<Vec<PointSample>, DecodeError> {
    let nc_error = |e: ::netcdf::Error| DecodeError::NetCdf {
        path: path.to_path_buf(),
        source: e,
    };
    let shape_error = |message: String| DecodeError::Shape {
        path: path.to_path_buf(),
        message,
    };

    let file = ::netcdf::open(path).map_err(nc_error)?;
    let var = file
        .variable(variable)
        .ok_or_else(|| DecodeError::MissingVariable {
            path: path.to_path_buf(),
            variable: variable.to_string(),
        })?;

    let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let (n_times, n_depths, n_lats, n_lons) = match dims[..] {
        [t, y, x] => (t, 1, y, x),
        [t, z, y, x] => (t, z, y, x),
        _ => {
            return Err(shape_error(format!(
                "'{variable}' has {} dimensions, expected 3 or 4",
                dims.len()
            )))
        }
    };

    let times = read_time_axis(&file, path)?;
    let lats = read_coordinate(&file, &LATITUDE_NAMES, path)?;
    let lons = read_coordinate(&file, &LONGITUDE_NAMES, path)?;
    if times.len() != n_times || lats.len() != n_lats || lons.len() != n_lons {
        return Err(shape_error(format!(
            "coordinate lengths ({}, {}, {}) do not match '{variable}' {:?}",
            times.len(),
            lats.len(),
            lons.len(),
            dims
        )));
    }

    let raw: Vec<f64> = var.get_values(..).map_err(nc_error)?;
    let scale = get_f64_attr(&var, "scale_factor").unwrap_or(1.0);
    let offset = get_f64_attr(&var, "add_offset").unwrap_or(0.0);
    let fill = get_f64_attr(&var, "_FillValue")
        .or_else(|| get_f64_attr(&var, "missing_value"))
        .unwrap_or(f64::NAN);

    let per_time = n_depths * n_lats * n_lons;
    if raw.len() != n_times * per_time {
        return Err(shape_error(format!(
            "'{variable}' holds {} values, expected {}",
            raw.len(),
            n_times * per_time
        )));
    }

    let (lats, lons) = (&lats, &lons);
    let per_level = n_lats * n_lons;
    let cells = times.iter().enumerate().flat_map(|(t, &time)| {
        let level = &raw[t * per_time..t * per_time + per_level];
        level.iter().enumerate().map(move |(i, &packed)| GridValue {
            value: packed,
            lat: lats[i / n_lons],
            lon: lons[i % n_lons],
            time,
        })
    });

    // Fill values are compared in packed units, so unpack after masking.
    let masked: Vec<GridValue> = if fill.is_nan() {
        cells.filter(unmasked).collect()
    } else {
        let keep = not_fill_value(fill);
        cells.filter(|cell| keep(cell)).collect()
    };
    let unpacked = masked.into_iter().map(|cell| GridValue {
        value: cell.value * scale + offset,
        ..cell
    });

    Ok(select(unpacked, unmasked, region, source).collect())
}

fn read_time_axis(
    file: &::netcdf::File,
    path: &Path,
) -> Result<Vec<chrono::DateTime<chrono::Utc>>, DecodeError> {
    let var = TIME_NAMES
        .iter()
        .find_map(|name| file.variable(name))
        .ok_or_else(|| DecodeError::MissingTime(path.to_path_buf()))?;
    let units = var
        .attribute_value("units")
        .and_then(Result::ok)
        .and_then(|value| match value {
            ::netcdf::AttributeValue::Str(units) => Some(units),
            _ => None,
        })
        .ok_or_else(|| DecodeError::MissingTime(path.to_path_buf()))?;
    let axis = CfTimeAxis::parse(&units).ok_or_else(|| DecodeError::TimeUnits {
        path: path.to_path_buf(),
        units: units.clone(),
    })?;

    let offsets: Vec<f64> = var.get_values(..).map_err(|e| DecodeError::NetCdf {
        path: path.to_path_buf(),
        source: e,
    })?;
    offsets
        .into_iter()
        .map(|offset| {
            axis.instant(offset).ok_or_else(|| DecodeError::TimeUnits {
                path: path.to_path_buf(),
                units: units.clone(),
            })
        })
        .collect()
}

fn read_coordinate(
    file: &::netcdf::File,
    names: &[&str],
    path: &Path,
) -> Result<Vec<f64>, DecodeError> {
    let var = names
        .iter()
        .find_map(|name| file.variable(name))
        .ok_or_else(|| DecodeError::MissingVariable {
            path: path.to_path_buf(),
            variable: names.join("/"),
        })?;
    var.get_values(..).map_err(|e| DecodeError::NetCdf {
        path: path.to_path_buf(),
        source: e,
    })
}

fn get_f64_attr(var: &::netcdf::Variable, name: &str) -> Option<f64> {
    if !var.attributes().any(|attr| attr.name() == name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    f64::try_from(value).ok()
}
