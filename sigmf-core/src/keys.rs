//! Metadata key names and the well-known `core:` fields.

use crate::error::MetaError;
use crate::format::FormatDescriptor;
use crate::value::{MetaMap, MetaValue};

pub const SIGMF_VERSION: &str = "1.0.0";

pub const DATATYPE: &str = "core:datatype";
pub const VERSION: &str = "core:version";
pub const SAMPLE_RATE: &str = "core:sample_rate";
pub const DESCRIPTION: &str = "core:description";
pub const AUTHOR: &str = "core:author";
pub const LICENSE: &str = "core:license";
pub const HARDWARE: &str = "core:hw";
pub const NUM_CHANNELS: &str = "core:num_channels";
pub const SHA512: &str = "core:sha512";
pub const OFFSET: &str = "core:offset";
pub const METADATA_ONLY: &str = "core:metadata_only";

pub const SAMPLE_START: &str = "core:sample_start";
pub const SAMPLE_COUNT: &str = "core:sample_count";
pub const FREQUENCY: &str = "core:frequency";
pub const DATETIME: &str = "core:datetime";

pub const LATITUDE: &str = "core:latitude";
pub const LONGITUDE: &str = "core:longitude";
pub const GENERATOR: &str = "core:generator";

/// Namespace given to tag keys that have none
pub const UNKNOWN_NAMESPACE: &str = "unknown:";

/// Global keys that describe the hardware setup rather than one file, and so
/// survive when a recording is closed and a new one opened.
const PERSISTENT_GLOBAL_KEYS: [&str; 8] = [
    DATATYPE,
    VERSION,
    SAMPLE_RATE,
    DESCRIPTION,
    AUTHOR,
    LICENSE,
    HARDWARE,
    NUM_CHANNELS,
];

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// `namespace:name`, both parts made of word characters
pub fn is_valid_key(key: &str) -> bool {
    match key.split_once(':') {
        Some((ns, name)) => is_word(ns) && is_word(name),
        None => false,
    }
}

pub fn validate_key(key: &str) -> Result<(), MetaError> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(MetaError::InvalidKey(key.to_string()))
    }
}

/// Give a namespace to stream tag keys that lack one, e.g. `foo` -> `unknown:foo`
pub fn sanitize_tag_key(key: &str) -> String {
    if is_valid_key(key) {
        key.to_string()
    } else {
        format!("{}{}", UNKNOWN_NAMESPACE, key)
    }
}

/// Inverse of [`sanitize_tag_key`] for playback
pub fn strip_unknown(key: &str) -> &str {
    key.strip_prefix(UNKNOWN_NAMESPACE).unwrap_or(key)
}

/// Fresh global object for a recording in `format`
pub fn new_global(format: &FormatDescriptor, num_channels: usize) -> MetaMap {
    let mut global = MetaMap::new();
    global.insert(DATATYPE.to_string(), MetaValue::String(format.to_string()));
    global.insert(VERSION.to_string(), MetaValue::String(SIGMF_VERSION.to_string()));
    if num_channels > 1 {
        global.insert(NUM_CHANNELS.to_string(), MetaValue::UInt64(num_channels as u64));
    }
    global
}

/// Drop every per-file global key, keeping the setup description
pub fn reset_global(global: &mut MetaMap) {
    global.retain(|k, _| PERSISTENT_GLOBAL_KEYS.contains(&k.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("core:sample_rate"));
        assert!(is_valid_key("test:a1"));
        assert!(!is_valid_key("rx_freq"));
        assert!(!is_valid_key("core:"));
        assert!(!is_valid_key(":x"));
        assert!(!is_valid_key("a:b:c"));
        assert!(!is_valid_key("a b:c"));
        assert!(validate_key("bad").is_err());
    }

    #[test]
    fn test_unknown_namespace_round_trip() {
        assert_eq!(sanitize_tag_key("my_tag"), "unknown:my_tag");
        assert_eq!(sanitize_tag_key("test:foo"), "test:foo");
        assert_eq!(strip_unknown("unknown:my_tag"), "my_tag");
        assert_eq!(strip_unknown("test:foo"), "test:foo");
    }

    #[test]
    fn test_reset_keeps_setup_keys() {
        let format = FormatDescriptor::parse("cf32").unwrap();
        let mut global = new_global(&format, 1);
        global.insert(SAMPLE_RATE.into(), MetaValue::Double(1e6));
        global.insert(AUTHOR.into(), MetaValue::from(""));
        global.insert("test:a".into(), MetaValue::from("x"));
        global.insert(SHA512.into(), MetaValue::from("abc"));
        reset_global(&mut global);
        assert!(global.contains_key(SAMPLE_RATE));
        assert!(global.contains_key(AUTHOR));
        assert!(global.contains_key(DATATYPE));
        assert!(!global.contains_key("test:a"));
        assert!(!global.contains_key(SHA512));
    }

    #[test]
    fn test_num_channels_only_when_multi() {
        let format = FormatDescriptor::parse("ci16").unwrap();
        assert!(!new_global(&format, 1).contains_key(NUM_CHANNELS));
        assert_eq!(
            new_global(&format, 2).get(NUM_CHANNELS),
            Some(&MetaValue::UInt64(2))
        );
    }
}
