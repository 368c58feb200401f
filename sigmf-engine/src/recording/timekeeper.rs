//! Turns stream time into capture datetimes.

use chrono::{DateTime, Utc};
use sigmf_core::time::{duration_from_nanos, samples_to_nanos};
use sigmf_core::{MetaError, TimeMode, TimeSpec};

#[derive(Debug, Clone, Copy)]
struct Reference {
    host: DateTime<Utc>,
    stream: TimeSpec,
    /// Stream offset at which the reference time was seen
    offset: u64,
}

/// In relative mode the first stream time seen is pinned to the host clock;
/// later times are placed relative to it.
#[derive(Debug, Clone)]
pub struct Timekeeper {
    mode: TimeMode,
    reference: Option<Reference>,
}

impl Timekeeper {
    pub fn new(mode: TimeMode) -> Self {
        Self {
            mode,
            reference: None,
        }
    }

    pub fn mode(&self) -> TimeMode {
        self.mode
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Datetime for a stream time seen at stream `offset`
    pub fn datetime_for(&mut self, time: TimeSpec, offset: u64) -> Result<DateTime<Utc>, MetaError> {
        match self.mode {
            TimeMode::Absolute => time.to_datetime(),
            TimeMode::Relative => match self.reference {
                Some(r) => {
                    let delta = time.to_nanos() - r.stream.to_nanos();
                    Ok(r.host + duration_from_nanos(delta))
                }
                None => {
                    let host = Utc::now();
                    self.reference = Some(Reference {
                        host,
                        stream: time,
                        offset,
                    });
                    Ok(host)
                }
            },
        }
    }

    /// Datetime of stream `offset` derived from elapsed samples since the
    /// reference. Only available in relative mode once a reference exists.
    pub fn datetime_at(&self, offset: u64, sample_rate: Option<f64>) -> Option<DateTime<Utc>> {
        if self.mode != TimeMode::Relative {
            return None;
        }
        let r = self.reference?;
        let rate = sample_rate.filter(|r| *r > 0.0)?;
        let elapsed = offset.checked_sub(r.offset)?;
        Some(r.host + duration_from_nanos(samples_to_nanos(elapsed, rate)))
    }
}
