use std::path::PathBuf;
use thiserror::Error;

/// A raw file could not be turned into samples. The file is left on disk.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to read raw file '{0}'")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse GRIB2 file '{path}'")]
    Grib {
        path: PathBuf,
        #[source]
        source: grib::GribError,
    },

    #[cfg(feature = "netcdf")]
    #[error("Failed to read NetCDF file '{path}'")]
    NetCdf {
        path: PathBuf,
        #[source]
        source: netcdf::Error,
    },

    /// Raw files written as JSON grids, such as those of test providers.
    #[error("Failed to parse JSON raw file '{0}'")]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("Variable '{variable}' not found in raw file '{path}'")]
    MissingVariable { path: PathBuf, variable: String },

    #[error("Message in '{0}' has no usable validity time")]
    MissingTime(PathBuf),

    #[error("Unrecognised time units '{units}' in '{path}'")]
    TimeUnits { path: PathBuf, units: String },

    #[error("'{path}' is not a usable raw file: {message}")]
    Format { path: PathBuf, message: String },

    #[error("Grid in '{path}' is inconsistent: {message}")]
    Shape { path: PathBuf, message: String },

    #[error("Cannot decode '{path}': {reason}")]
    Unsupported { path: PathBuf, reason: String },
}
