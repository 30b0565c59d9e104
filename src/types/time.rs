//! Time handling: the epoch anchor used by the point database, inclusive UTC
//! time ranges, and conversions from the usual chrono types.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use std::fmt;
use thiserror::Error;

/// Stored times are hours since this instant (2000-01-01T00:00:00Z).
pub const EPOCH_ANCHOR: DateTime<Utc> = DateTime::from_timestamp_nanos(946_684_800_000_000_000);

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Hours elapsed since [`EPOCH_ANCHOR`], fractional.
pub fn epoch_hours(datetime: DateTime<Utc>) -> f64 {
    (datetime - EPOCH_ANCHOR).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

/// The integer hour stored in the point database for `datetime`.
pub fn stored_hour(datetime: DateTime<Utc>) -> i64 {
    epoch_hours(datetime).floor() as i64
}

pub fn from_epoch_hours(hours: f64) -> DateTime<Utc> {
    EPOCH_ANCHOR + TimeDelta::milliseconds((hours * MILLIS_PER_HOUR).round() as i64)
}

pub trait IntoUtcDateTime {
    fn into_utc(self) -> DateTime<Utc>;
}

impl IntoUtcDateTime for NaiveDateTime {
    fn into_utc(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self)
    }
}

/// Midnight UTC of the date.
impl IntoUtcDateTime for NaiveDate {
    fn into_utc(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.and_time(chrono::NaiveTime::MIN))
    }
}

impl IntoUtcDateTime for DateTime<Local> {
    fn into_utc(self) -> DateTime<Utc> {
        self.with_timezone(&Utc)
    }
}

impl IntoUtcDateTime for DateTime<Utc> {
    fn into_utc(self) -> DateTime<Utc> {
        self
    }
}

impl IntoUtcDateTime for DateTime<FixedOffset> {
    fn into_utc(self) -> DateTime<Utc> {
        self.with_timezone(&Utc)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("Time range start {start} is after end {end}")]
pub struct TimeRangeError {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// An inclusive UTC time window.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use geofetch::TimeRange;
///
/// let day = NaiveDate::from_ymd_opt(2016, 2, 1).unwrap();
/// let range = TimeRange::new(day, NaiveDate::from_ymd_opt(2016, 2, 3).unwrap()).unwrap();
/// assert_eq!(range.days().count(), 3);
/// assert_eq!(TimeRange::for_day(day).days().collect::<Vec<_>>(), vec![day]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(
        start: impl IntoUtcDateTime,
        end: impl IntoUtcDateTime,
    ) -> Result<Self, TimeRangeError> {
        let start = start.into_utc();
        let end = end.into_utc();
        if start > end {
            return Err(TimeRangeError { start, end });
        }
        Ok(Self { start, end })
    }

    /// The 24 hours of a UTC calendar date, from midnight to the last microsecond.
    pub fn for_day(day: NaiveDate) -> Self {
        let start = day.into_utc();
        let end = start + TimeDelta::days(1) - TimeDelta::microseconds(1);
        Self { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn start_hours(&self) -> f64 {
        epoch_hours(self.start)
    }

    pub fn end_hours(&self) -> f64 {
        epoch_hours(self.end)
    }

    /// Every UTC calendar date the range touches, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.end.date_naive();
        self.start
            .date_naive()
            .iter_days()
            .take_while(move |day| *day <= last)
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_anchor() {
        assert_eq!(
            EPOCH_ANCHOR,
            Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(epoch_hours(EPOCH_ANCHOR), 0.0);
    }

    #[test]
    fn test_epoch_hours_round_trip() {
        let dt = Utc.with_ymd_and_hms(2016, 2, 1, 6, 0, 0).unwrap();
        let hours = epoch_hours(dt);
        assert_eq!(hours, 141_006.0);
        assert_eq!(stored_hour(dt), 141_006);
        assert_eq!(from_epoch_hours(hours), dt);
        assert_eq!(
            from_epoch_hours(hours - 0.5),
            Utc.with_ymd_and_hms(2016, 2, 1, 5, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_stored_hour_floors_before_anchor() {
        let dt = Utc.with_ymd_and_hms(1999, 12, 31, 23, 30, 0).unwrap();
        assert_eq!(stored_hour(dt), -1);
    }

    #[test]
    fn test_rejects_reversed_range() {
        let a = Utc.with_ymd_and_hms(2016, 2, 2, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2016, 2, 1, 0, 0, 0).unwrap();
        assert!(TimeRange::new(a, b).is_err());
        assert!(TimeRange::new(b, a).is_ok());
    }

    #[test]
    fn test_day_window_excludes_next_midnight() {
        let day = NaiveDate::from_ymd_opt(2016, 2, 1).unwrap();
        let range = TimeRange::for_day(day);
        let next_midnight = NaiveDate::from_ymd_opt(2016, 2, 2).unwrap().into_utc();
        assert!(range.end() < next_midnight);
        assert!(range.end_hours() > range.start_hours() + 23.0);
        assert!(range.end_hours() < range.start_hours() + 24.0);
    }

    #[test]
    fn test_days_spans_partial_days() {
        let start = Utc.with_ymd_and_hms(2016, 3, 9, 18, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2016, 3, 11, 3, 0, 0).unwrap();
        let days: Vec<_> = TimeRange::new(start, end).unwrap().days().collect();
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2016, 3, 9).unwrap(),
                NaiveDate::from_ymd_opt(2016, 3, 10).unwrap(),
                NaiveDate::from_ymd_opt(2016, 3, 11).unwrap(),
            ]
        );
    }
}
