//! Geographic bounding boxes used for every fetch and query.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegionError {
    #[error("Region bounds must be finite numbers")]
    NotFinite,

    #[error("West bound {west} must be smaller than east bound {east}")]
    WestNotBeforeEast { west: f64, east: f64 },

    #[error("South bound {south} must be smaller than north bound {north}")]
    SouthNotBeforeNorth { south: f64, north: f64 },

    #[error("Latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// A validated rectangular region in degrees, longitudes in the [-180, 180] convention.
///
/// Every constructor, deserialisation included, goes through the checks of
/// [`BoundingBox::new`], so any `BoundingBox` in circulation satisfies
/// `west < east` and `south < north`.
///
/// # Examples
///
/// ```
/// use geofetch::BoundingBox;
///
/// // Gulf of St. Lawrence
/// let region = BoundingBox::new(-64.4, -63.4, 46.1, 47.0).unwrap();
/// assert!(region.contains(46.5, -64.0));
/// assert!(BoundingBox::new(-63.4, -64.4, 46.1, 47.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoundingBox")]
pub struct BoundingBox {
    west: f64,
    east: f64,
    south: f64,
    north: f64,
}

/// Unchecked wire form of [`BoundingBox`].
#[derive(Deserialize)]
struct RawBoundingBox {
    west: f64,
    east: f64,
    south: f64,
    north: f64,
}

impl TryFrom<RawBoundingBox> for BoundingBox {
    type Error = RegionError;

    fn try_from(raw: RawBoundingBox) -> Result<Self, Self::Error> {
        BoundingBox::new(raw.west, raw.east, raw.south, raw.north)
    }
}

impl BoundingBox {
    pub fn new(west: f64, east: f64, south: f64, north: f64) -> Result<Self, RegionError> {
        if ![west, east, south, north].iter().all(|v| v.is_finite()) {
            return Err(RegionError::NotFinite);
        }
        for lat in [south, north] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(RegionError::LatitudeOutOfRange(lat));
            }
        }
        for lon in [west, east] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(RegionError::LongitudeOutOfRange(lon));
            }
        }
        if west >= east {
            return Err(RegionError::WestNotBeforeEast { west, east });
        }
        if south >= north {
            return Err(RegionError::SouthNotBeforeNorth { south, north });
        }
        Ok(Self {
            west,
            east,
            south,
            north,
        })
    }

    /// The whole globe.
    pub fn global() -> Self {
        Self {
            west: -180.0,
            east: 180.0,
            south: -90.0,
            north: 90.0,
        }
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    /// Inclusive on all four edges.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.south <= lat && lat <= self.north && self.west <= lon && lon <= self.east
    }

    /// True if `other` lies entirely inside `self`.
    pub fn encloses(&self, other: &BoundingBox) -> bool {
        self.west <= other.west
            && other.east <= self.east
            && self.south <= other.south
            && other.north <= self.north
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "west={} east={} south={} north={}",
            self.west, self.east, self.south, self.north
        )
    }
}
