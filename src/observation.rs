//! Raw meteorological observation received per prediction request.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// A single weather reading plus the two most recent power measurements.
///
/// Created per request and discarded once the prediction has been logged.
/// Field names match the JSON body accepted by `POST /predict`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Observation {
    /// Ambient temperature (°C).
    pub temperature: f64,
    /// Relative humidity (%).
    pub humidity: f64,
    /// Global horizontal irradiance (W/m²).
    pub ghi: f64,
    /// Wall-clock time of the reading.
    #[serde(with = "timestamp")]
    pub timestamp: NaiveDateTime,
    /// Power output one interval ago (W).
    pub power_t_1: f64,
    /// Power output two intervals ago (W).
    pub power_t_2: f64,
}

impl Observation {
    /// Hour of day (0-23) of the reading, as written by the caller.
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Serde adapter for observation timestamps.
///
/// Accepts naive ISO-8601 (`2024-06-01T12:00:00`, optional fractional
/// seconds, `T` or space separator) and RFC 3339 with an offset. An offset
/// is dropped after parsing: the wall-clock time is kept, not converted to
/// UTC. The end-of-day form `24:00:00` reads as `00:00:00` of the next day.
/// Serializes back to naive ISO-8601.
pub mod timestamp {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    /// Parses a timestamp string in any of the accepted layouts.
    pub fn parse(s: &str) -> Option<NaiveDateTime> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.naive_local());
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .or_else(|| end_of_day(s))
    }

    /// `YYYY-MM-DDT24:00:00[.000]` as midnight of the following day.
    fn end_of_day(s: &str) -> Option<NaiveDateTime> {
        let (date, time) = s.split_once(['T', ' '])?;
        let (hms, frac) = time.split_once('.').unwrap_or((time, ""));
        if hms != "24:00:00" || !frac.bytes().all(|b| b == b'0') {
            return None;
        }
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()?
            .succ_opt()?
            .and_hms_opt(0, 0, 0)
    }

    /// Formats a timestamp the way it is written to the prediction log.
    pub fn format(ts: &NaiveDateTime) -> String {
        ts.format(OUTPUT_FORMAT).to_string()
    }

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D>(d: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| {
            D::Error::custom(format!(
                "invalid timestamp \"{raw}\", expected ISO-8601 such as 2024-06-01T12:00:00"
            ))
        })
    }
}
