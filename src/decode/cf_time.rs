//! CF-convention time axes: `"<unit> since <reference date>"`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

/// A parsed time axis: offsets are multiples of `unit_seconds` after `reference`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CfTimeAxis {
    pub unit_seconds: f64,
    pub reference: DateTime<Utc>,
}

impl CfTimeAxis {
    /// Parses strings such as `hours since 1950-01-01` or
    /// `seconds since 1970-01-01 00:00:00`. Returns `None` for anything else.
    pub fn parse(units: &str) -> Option<Self> {
        let (unit, reference) = units.trim().split_once(" since ")?;
        let unit_seconds = match unit.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" | "s" | "sec" | "secs" => 1.0,
            "minute" | "minutes" | "min" | "mins" => 60.0,
            "hour" | "hours" | "h" | "hr" | "hrs" => 3600.0,
            "day" | "days" | "d" => 86_400.0,
            _ => return None,
        };
        Some(Self {
            unit_seconds,
            reference: parse_reference(reference.trim())?,
        })
    }

    /// The instant `offset` units after the reference.
    pub fn instant(&self, offset: f64) -> Option<DateTime<Utc>> {
        let millis = offset * self.unit_seconds * 1000.0;
        if !millis.is_finite() {
            return None;
        }
        self.reference
            .checked_add_signed(TimeDelta::milliseconds(millis.round() as i64))
    }
}

fn parse_reference(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim_end_matches('Z').trim_end_matches(" UTC");
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
        .map(|naive| naive.and_utc())
}
