//! Sample-stream timestamps and their ISO-8601 representation.
//!
//! Stream time arrives as `(whole seconds, fractional seconds)` since the
//! UNIX epoch. The sidecar stores it as `YYYY-MM-DDTHH:MM:SS.fffffffffZ`.
//! Arithmetic is done in integer nanoseconds so that differences between
//! two timestamps are exact.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetaError;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// How stream time is turned into capture datetimes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    /// Stream timestamps are real UTC time and are stored verbatim
    Absolute,
    /// Stream timestamps count from an arbitrary epoch (e.g. device power-on);
    /// the first one is pinned to the host clock
    #[default]
    Relative,
}

/// Whole and fractional seconds, as carried by an `rx_time` tag
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpec {
    pub secs: u64,
    pub frac: f64,
}

impl TimeSpec {
    pub fn new(secs: u64, frac: f64) -> Self {
        Self { secs, frac }
    }

    pub fn to_nanos(&self) -> i128 {
        self.secs as i128 * NANOS_PER_SEC + (self.frac * 1e9).round() as i128
    }

    pub fn from_nanos(nanos: i128) -> Result<Self, MetaError> {
        if nanos < 0 {
            return Err(MetaError::InvalidTime(format!(
                "{} ns is before the epoch",
                nanos
            )));
        }
        let secs = u64::try_from(nanos / NANOS_PER_SEC)
            .map_err(|_| MetaError::InvalidTime(format!("{} ns out of range", nanos)))?;
        let frac = (nanos % NANOS_PER_SEC) as f64 / 1e9;
        Ok(Self { secs, frac })
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + self.frac
    }

    pub fn to_datetime(&self) -> Result<DateTime<Utc>, MetaError> {
        let nanos = self.to_nanos();
        let secs = i64::try_from(nanos.div_euclid(NANOS_PER_SEC))
            .map_err(|_| MetaError::InvalidTime(format!("{:?} out of range", self)))?;
        let sub = nanos.rem_euclid(NANOS_PER_SEC) as u32;
        DateTime::from_timestamp(secs, sub)
            .ok_or_else(|| MetaError::InvalidTime(format!("{:?} out of range", self)))
    }

    pub fn from_datetime(dt: &DateTime<Utc>) -> Result<Self, MetaError> {
        let secs = u64::try_from(dt.timestamp())
            .map_err(|_| MetaError::InvalidTime(format!("{} is before the epoch", dt)))?;
        Ok(Self {
            secs,
            frac: dt.timestamp_subsec_nanos() as f64 / 1e9,
        })
    }

    /// This time moved forward by `samples` at `sample_rate`
    pub fn advanced_by_samples(&self, samples: u64, sample_rate: f64) -> Result<Self, MetaError> {
        Self::from_nanos(self.to_nanos() + samples_to_nanos(samples, sample_rate))
    }
}

/// Duration of `samples` at `sample_rate`, in nanoseconds
pub fn samples_to_nanos(samples: u64, sample_rate: f64) -> i128 {
    if sample_rate <= 0.0 {
        return 0;
    }
    (samples as f64 / sample_rate * 1e9).round() as i128
}

pub fn duration_from_nanos(nanos: i128) -> Duration {
    let clamped = nanos.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
    Duration::nanoseconds(clamped)
}

/// Nanoseconds from `earlier` to `later`; negative if reversed
pub fn nanos_between(earlier: &DateTime<Utc>, later: &DateTime<Utc>) -> i128 {
    let secs = later.timestamp() as i128 - earlier.timestamp() as i128;
    let sub = later.timestamp_subsec_nanos() as i128 - earlier.timestamp_subsec_nanos() as i128;
    secs * NANOS_PER_SEC + sub
}

/// Format as SigMF `core:datetime`
pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

/// Parse a SigMF `core:datetime`; a missing zone designator is taken as UTC
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, MetaError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| MetaError::InvalidTime(format!("{}: {}", s, e)))
}

/// serde adapter for `Option<DateTime<Utc>>` stored as `core:datetime`
pub mod iso8601_opt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&format_iso8601(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|s| parse_iso8601(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_difference() {
        let a = TimeSpec::new(2, 0.5);
        let b = TimeSpec::new(4, 0.8);
        assert_eq!(b.to_nanos() - a.to_nanos(), 2_300_000_000);
    }

    #[test]
    fn test_iso_round_trip() {
        let t = TimeSpec::new(1_600_000_000, 0.25);
        let dt = t.to_datetime().unwrap();
        let text = format_iso8601(&dt);
        assert_eq!(text, "2020-09-13T12:26:40.250000000Z");
        let back = TimeSpec::from_datetime(&parse_iso8601(&text).unwrap()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_parse_variants() {
        let dt = parse_iso8601("2020-01-01T00:00:00Z").unwrap();
        assert_eq!(dt.timestamp(), 1_577_836_800);
        let dt = parse_iso8601("2020-01-01T00:00:00.5").unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 500);
        assert!(parse_iso8601("yesterday").is_err());
    }

    #[test]
    fn test_advance_by_samples() {
        let t = TimeSpec::new(10, 0.0);
        let later = t.advanced_by_samples(500, 1000.0).unwrap();
        assert_eq!(later, TimeSpec::new(10, 0.5));
        // No rate means no advance
        assert_eq!(t.advanced_by_samples(500, 0.0).unwrap(), t);
    }

    #[test]
    fn test_nanos_between() {
        let a = TimeSpec::new(2, 0.5).to_datetime().unwrap();
        let b = TimeSpec::new(4, 0.8).to_datetime().unwrap();
        assert_eq!(nanos_between(&a, &b), 2_300_000_000);
        assert_eq!(nanos_between(&b, &a), -2_300_000_000);
    }
}
