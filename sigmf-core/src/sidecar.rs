//! The `.sigmf-meta` JSON document.

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::error::MetaError;
use crate::keys;
use crate::segments::{AnnotationSegment, CaptureSegment, SegmentStore};
use crate::value::{MetaMap, MetaValue};

/// Exactly the three top-level sections; all of them must be present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SidecarDocument {
    pub global: MetaMap,
    pub captures: Vec<CaptureSegment>,
    pub annotations: Vec<AnnotationSegment>,
}

impl SidecarDocument {
    /// Snapshot of a recording, with both segment lists in offset order
    pub fn from_store(global: &MetaMap, store: &SegmentStore) -> Self {
        Self {
            global: global.clone(),
            captures: store.captures().to_vec(),
            annotations: store.annotations().to_vec(),
        }
    }

    pub fn into_store(self) -> (MetaMap, SegmentStore) {
        let store = SegmentStore::from_parts(self.captures, self.annotations);
        (self.global, store)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, MetaError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, MetaError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize with four-space indentation
    pub fn write_pretty<W: Write>(&self, writer: W) -> Result<(), serde_json::Error> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
        self.serialize(&mut serializer)
    }

    pub fn to_pretty_string(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        self.write_pretty(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn sample_rate(&self) -> Option<f64> {
        self.global.get(keys::SAMPLE_RATE).and_then(MetaValue::as_f64)
    }

    pub fn datatype(&self) -> Option<&str> {
        self.global.get(keys::DATATYPE).and_then(MetaValue::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "global": {
            "core:datatype": "cf32_le",
            "core:sample_rate": 1000000.0,
            "core:version": "1.0.0"
        },
        "captures": [
            {"core:sample_start": 100, "core:frequency": 915000000.0},
            {"core:sample_start": 0, "core:datetime": "2020-01-01T00:00:00Z"}
        ],
        "annotations": [
            {"core:sample_start": 10, "core:sample_count": 5, "core:comment": "hi"}
        ]
    }"#;

    #[test]
    fn test_parse_and_sort() {
        let doc = SidecarDocument::from_json_str(SAMPLE).unwrap();
        assert_eq!(doc.datatype(), Some("cf32_le"));
        assert_eq!(doc.sample_rate(), Some(1e6));
        let (_, store) = doc.into_store();
        assert_eq!(store.captures()[0].sample_start, 0);
        assert_eq!(store.captures()[1].frequency, Some(915e6));
        assert_eq!(store.annotations().len(), 1);
    }

    #[test]
    fn test_missing_section_is_malformed() {
        let err = SidecarDocument::from_json_str(r#"{"global": {}, "captures": []}"#).unwrap_err();
        assert!(matches!(err, MetaError::MalformedSidecar(_)));
        let err = SidecarDocument::from_json_str("not json").unwrap_err();
        assert!(matches!(err, MetaError::MalformedSidecar(_)));
        let err = SidecarDocument::from_json_str(
            r#"{"global": {}, "captures": [], "annotations": [], "extra": 1}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MetaError::MalformedSidecar(_)));
    }

    #[test]
    fn test_nested_global_is_malformed() {
        let err = SidecarDocument::from_json_str(
            r#"{"global": {"core:extensions": [1]}, "captures": [], "annotations": []}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MetaError::MalformedSidecar(_)));
    }

    #[test]
    fn test_pretty_output_has_three_keys() {
        let doc = SidecarDocument::from_json_str(SAMPLE).unwrap();
        let text = doc.to_pretty_string().unwrap();
        assert!(text.contains("\n    \"annotations\""));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(value["annotations"][0]["core:sample_count"], 5);
        assert_eq!(value["captures"][1]["core:sample_start"], 0);
    }
}
