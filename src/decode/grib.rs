//! GRIB2 reader used for ERA5 downloads.

use crate::decode::error::DecodeError;
use crate::decode::{select, unmasked, GridValue};
use crate::types::region::BoundingBox;
use crate::types::sample::PointSample;
use ::grib::Grib2SubmessageDecoder;
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

const GRIB_MAGIC: &[u8; 4] = b"GRIB";
/// Octet 8 of the indicator section.
const EDITION_OFFSET: usize = 7;

/// Checks the indicator section at the start of a raw file. The `grib` crate
/// skips anything that is not a GRIB2 message, so HTML error pages, truncated
/// downloads and GRIB1 files would otherwise decode to nothing.
fn check_indicator(path: &Path, head: &[u8]) -> Result<(), DecodeError> {
    if head.len() <= EDITION_OFFSET || !head.starts_with(GRIB_MAGIC) {
        return Err(DecodeError::Format {
            path: path.to_path_buf(),
            message: "no GRIB indicator section at the start of the file".to_string(),
        });
    }
    match head[EDITION_OFFSET] {
        2 => Ok(()),
        1 => Err(DecodeError::Unsupported {
            path: path.to_path_buf(),
            reason: "GRIB edition 1 is not supported, request NetCDF instead".to_string(),
        }),
        edition => Err(DecodeError::Format {
            path: path.to_path_buf(),
            message: format!("unknown GRIB edition {edition}"),
        }),
    }
}

/// Decodes every message of a GRIB2 file into samples inside `region`.
///
/// The timestamp of each message is its validity time: the reference time plus
/// the forecast step. For ERA5 forecast fields (accumulations) the reference
/// time is the 06:00/18:00 forecast start, so the step matters.
///
/// A file without at least one GRIB2 message is an error, never an empty result.
pub fn decode_grib(
    path: &Path,
    region: &BoundingBox,
    source: &str,
) -> Result<Vec<PointSample>, DecodeError> {
    let grib_error = |e: ::grib::GribError| DecodeError::Grib {
        path: path.to_path_buf(),
        source: e,
    };
    let io_error = |e: std::io::Error| DecodeError::Io(path.to_path_buf(), e);

    let mut file = File::open(path).map_err(io_error)?;
    let mut head = Vec::with_capacity(EDITION_OFFSET + 1);
    (&mut file)
        .take(EDITION_OFFSET as u64 + 1)
        .read_to_end(&mut head)
        .map_err(io_error)?;
    check_indicator(path, &head)?;
    file.rewind().map_err(io_error)?;

    let grib2 = ::grib::from_reader(BufReader::new(file)).map_err(grib_error)?;

    let mut messages = 0usize;
    let mut samples = Vec::new();
    for (index, submessage) in grib2.iter() {
        messages += 1;
        let valid_time = submessage
            .temporal_info()
            .forecast_time_target
            .ok_or_else(|| DecodeError::MissingTime(path.to_path_buf()))?;
        debug!(
            "Processing GRIB message {:?} with validity time {}",
            index, valid_time
        );

        let latlons: Vec<(f32, f32)> = submessage.latlons().map_err(grib_error)?.collect();
        let decoder = Grib2SubmessageDecoder::from(submessage).map_err(grib_error)?;
        let values: Vec<f32> = decoder.dispatch().map_err(grib_error)?.collect();

        if values.len() != latlons.len() {
            return Err(DecodeError::Shape {
                path: path.to_path_buf(),
                message: format!(
                    "{} values for {} grid points",
                    values.len(),
                    latlons.len()
                ),
            });
        }

        let cells = latlons
            .into_iter()
            .zip(values)
            .map(|((lat, lon), value)| GridValue {
                value: value as f64,
                lat: lat as f64,
                lon: lon as f64,
                time: valid_time,
            });
        samples.extend(select(cells, unmasked, region, source));
    }

    if messages == 0 {
        return Err(DecodeError::Format {
            path: path.to_path_buf(),
            message: "file holds no GRIB2 messages".to_string(),
        });
    }
    Ok(samples)
}
