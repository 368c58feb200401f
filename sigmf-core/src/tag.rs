//! Inline stream tags and how they map onto sidecar fields.
//!
//! | Tag key      | Sidecar field                       |
//! |--------------|-------------------------------------|
//! | `rx_time`    | capture `core:datetime`             |
//! | `rx_freq`    | capture `core:frequency`            |
//! | `rx_rate`    | global `core:sample_rate`           |
//! | `packet_len` | annotation `core:sample_count`      |
//! | other        | annotation key (namespaced)         |

use std::fmt;

use crate::time::TimeSpec;
use crate::value::MetaValue;

pub const TIME_KEY: &str = "rx_time";
pub const FREQ_KEY: &str = "rx_freq";
pub const RATE_KEY: &str = "rx_rate";
pub const PACKET_LEN_KEY: &str = "packet_len";

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Meta(MetaValue),
    Time(TimeSpec),
}

impl TagValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Meta(v) => v.as_f64(),
            TagValue::Time(t) => Some(t.as_secs_f64()),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TagValue::Meta(v) => v.as_u64(),
            TagValue::Time(_) => None,
        }
    }

    pub fn as_time(&self) -> Option<TimeSpec> {
        match self {
            TagValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Scalar form for storing in an annotation
    pub fn into_meta(self) -> MetaValue {
        match self {
            TagValue::Meta(v) => v,
            TagValue::Time(t) => MetaValue::Double(t.as_secs_f64()),
        }
    }
}

macro_rules! tag_value_from {
    ($($t:ty),*) => {
        $(impl From<$t> for TagValue {
            fn from(v: $t) -> Self {
                TagValue::Meta(v.into())
            }
        })*
    };
}

tag_value_from!(bool, i64, u64, f64, &str, String, MetaValue);

impl From<TimeSpec> for TagValue {
    fn from(t: TimeSpec) -> Self {
        TagValue::Time(t)
    }
}

/// Where a tag lands in the sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagRole {
    Time,
    Frequency,
    Rate,
    PacketLength,
    Annotation,
}

/// Point-in-stream key/value event
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTag {
    /// Absolute sample offset in the stream that carries it
    pub offset: u64,
    pub key: String,
    pub value: TagValue,
}

impl StreamTag {
    pub fn new(offset: u64, key: &str, value: impl Into<TagValue>) -> Self {
        Self {
            offset,
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn time(offset: u64, time: TimeSpec) -> Self {
        Self::new(offset, TIME_KEY, time)
    }

    pub fn role(&self) -> TagRole {
        match self.key.as_str() {
            TIME_KEY => TagRole::Time,
            FREQ_KEY => TagRole::Frequency,
            RATE_KEY => TagRole::Rate,
            PACKET_LEN_KEY => TagRole::PacketLength,
            _ => TagRole::Annotation,
        }
    }

    /// Tags that describe the capture or the global setup
    pub fn is_capture_tag(&self) -> bool {
        matches!(self.role(), TagRole::Time | TagRole::Frequency | TagRole::Rate)
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            TagValue::Meta(v) => write!(f, "@{} {}={}", self.offset, self.key, v),
            TagValue::Time(t) => write!(f, "@{} {}=({}, {})", self.offset, self.key, t.secs, t.frac),
        }
    }
}
