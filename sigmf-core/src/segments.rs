//! Capture and annotation segments, and the store that keeps them ordered.
//!
//! Both collections are sorted by `sample_start`. Captures are unique per
//! offset; annotations are unique per `(sample_start, sample_count)`, where an
//! unset count is distinct from every numeric count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetaError;
use crate::filter::KeyFilter;
use crate::keys;
use crate::time::{self, iso8601_opt};
use crate::value::{MetaMap, MetaValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureSegment {
    #[serde(rename = "core:sample_start")]
    pub sample_start: u64,
    #[serde(
        rename = "core:frequency",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub frequency: Option<f64>,
    #[serde(
        rename = "core:sample_rate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sample_rate: Option<f64>,
    #[serde(
        rename = "core:datetime",
        default,
        skip_serializing_if = "Option::is_none",
        with = "iso8601_opt"
    )]
    pub datetime: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: MetaMap,
}

impl CaptureSegment {
    pub fn at(sample_start: u64) -> Self {
        Self {
            sample_start,
            ..Default::default()
        }
    }

    /// Set one field by its sidecar key, routing `core:` fields to their typed slot
    pub fn set_field(&mut self, key: &str, value: MetaValue) -> Result<(), MetaError> {
        keys::validate_key(key)?;
        let wrong_type = |expected: &str| MetaError::UnsupportedValue {
            key: key.to_string(),
            kind: format!("{} (expected {})", value.kind(), expected),
        };
        match key {
            keys::SAMPLE_START => return Err(MetaError::InvalidKey(key.to_string())),
            keys::FREQUENCY => {
                self.frequency = Some(value.as_f64().ok_or_else(|| wrong_type("number"))?)
            }
            keys::SAMPLE_RATE => {
                self.sample_rate = Some(value.as_f64().ok_or_else(|| wrong_type("number"))?)
            }
            keys::DATETIME => {
                let text = value.as_str().ok_or_else(|| wrong_type("string"))?;
                self.datetime = Some(time::parse_iso8601(text)?);
            }
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// Field-wise merge: fields present in `other` overwrite, absent ones are kept
    pub fn merge(&mut self, other: CaptureSegment) {
        if other.frequency.is_some() {
            self.frequency = other.frequency;
        }
        if other.sample_rate.is_some() {
            self.sample_rate = other.sample_rate;
        }
        if other.datetime.is_some() {
            self.datetime = other.datetime;
        }
        self.extra.extend(other.extra);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSegment {
    #[serde(rename = "core:sample_start")]
    pub sample_start: u64,
    #[serde(
        rename = "core:sample_count",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sample_count: Option<u64>,
    #[serde(flatten)]
    pub keys: MetaMap,
}

impl AnnotationSegment {
    pub fn new(sample_start: u64, sample_count: Option<u64>) -> Self {
        Self {
            sample_start,
            sample_count,
            keys: MetaMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.keys.insert(key.to_string(), value.into());
        self
    }

    fn same_range(&self, other: &AnnotationSegment) -> bool {
        self.sample_start == other.sample_start && self.sample_count == other.sample_count
    }

    /// Whether `offset` falls inside this annotation. An annotation without a
    /// count covers only its start sample.
    pub fn covers(&self, offset: u64) -> bool {
        let len = self.sample_count.unwrap_or(0).max(1);
        offset >= self.sample_start && offset - self.sample_start < len
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentStore {
    captures: Vec<CaptureSegment>,
    annotations: Vec<AnnotationSegment>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from loaded segments, merging duplicates and sorting
    pub fn from_parts(captures: Vec<CaptureSegment>, annotations: Vec<AnnotationSegment>) -> Self {
        let mut store = Self::new();
        for capture in captures {
            store.upsert_capture(capture);
        }
        for annotation in annotations {
            store.upsert_annotation(annotation);
        }
        store
    }

    pub fn captures(&self) -> &[CaptureSegment] {
        &self.captures
    }

    pub fn annotations(&self) -> &[AnnotationSegment] {
        &self.annotations
    }

    pub fn into_parts(self) -> (Vec<CaptureSegment>, Vec<AnnotationSegment>) {
        (self.captures, self.annotations)
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty() && self.annotations.is_empty()
    }

    /// Forget everything; used when a new recording starts
    pub fn clear(&mut self) {
        self.captures.clear();
        self.annotations.clear();
    }

    pub fn first_capture(&self) -> Option<&CaptureSegment> {
        self.captures.first()
    }

    pub fn capture_mut(&mut self, index: usize) -> Option<&mut CaptureSegment> {
        self.captures.get_mut(index)
    }

    pub fn upsert_capture(&mut self, seg: CaptureSegment) -> &mut CaptureSegment {
        match self
            .captures
            .binary_search_by_key(&seg.sample_start, |c| c.sample_start)
        {
            Ok(index) => {
                self.captures[index].merge(seg);
                &mut self.captures[index]
            }
            Err(index) => {
                self.captures.insert(index, seg);
                &mut self.captures[index]
            }
        }
    }

    pub fn upsert_annotation(&mut self, seg: AnnotationSegment) -> &mut AnnotationSegment {
        self.upsert_annotation_filtered(seg, &KeyFilter::keep())
    }

    /// Merge `seg` into the annotation with the same range, first removing
    /// the existing keys that `filter` selects. A new range is appended.
    pub fn upsert_annotation_filtered(
        &mut self,
        seg: AnnotationSegment,
        filter: &KeyFilter,
    ) -> &mut AnnotationSegment {
        if let Some(index) = self.annotations.iter().position(|a| a.same_range(&seg)) {
            let existing = &mut self.annotations[index];
            filter.apply(&mut existing.keys);
            existing.keys.extend(seg.keys);
            return &mut self.annotations[index];
        }

        let (start, count) = (seg.sample_start, seg.sample_count);
        self.annotations.push(seg);
        self.annotations.sort_by_key(|a| a.sample_start);
        let index = self
            .annotations
            .iter()
            .rposition(|a| a.sample_start == start && a.sample_count == count)
            .unwrap_or(self.annotations.len() - 1);
        &mut self.annotations[index]
    }

    /// Capture segment in effect at `offset`
    pub fn capture_at_or_before(&self, offset: u64) -> Option<&CaptureSegment> {
        let end = self.captures.partition_point(|c| c.sample_start <= offset);
        end.checked_sub(1).map(|i| &self.captures[i])
    }

    pub fn annotations_overlapping(&self, offset: u64) -> impl Iterator<Item = &AnnotationSegment> {
        self.annotations.iter().filter(move |a| a.covers(offset))
    }

    /// Run `filter` over every stored annotation; returns the number of keys removed
    pub fn filter_annotation_keys(&mut self, filter: &KeyFilter) -> usize {
        self.annotations
            .iter_mut()
            .map(|a| filter.apply(&mut a.keys))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_upsert_merges_fields() {
        let mut store = SegmentStore::new();
        store.upsert_capture(CaptureSegment {
            frequency: Some(100e6),
            ..CaptureSegment::at(0)
        });
        let mut update = CaptureSegment::at(0);
        update.extra.insert("test:x".into(), MetaValue::UInt64(1));
        store.upsert_capture(update);
        assert_eq!(store.captures().len(), 1);
        assert_eq!(store.captures()[0].frequency, Some(100e6));
        assert_eq!(store.captures()[0].extra.get("test:x"), Some(&MetaValue::UInt64(1)));
    }

    #[test]
    fn test_capture_order() {
        let mut store = SegmentStore::new();
        for start in [500, 0, 250] {
            store.upsert_capture(CaptureSegment::at(start));
        }
        let starts: Vec<u64> = store.captures().iter().map(|c| c.sample_start).collect();
        assert_eq!(starts, vec![0, 250, 500]);
    }

    #[test]
    fn test_annotation_identity() {
        let mut store = SegmentStore::new();
        store.upsert_annotation(AnnotationSegment::new(10, Some(5)).with("test:a", 1u64));
        store.upsert_annotation(AnnotationSegment::new(10, Some(5)).with("test:b", 2u64));
        assert_eq!(store.annotations().len(), 1);
        assert_eq!(store.annotations()[0].keys.len(), 2);

        store.upsert_annotation(AnnotationSegment::new(10, Some(6)).with("test:c", 3u64));
        store.upsert_annotation(AnnotationSegment::new(10, None).with("test:d", 4u64));
        assert_eq!(store.annotations().len(), 3);
    }

    #[test]
    fn test_annotation_stable_sort() {
        let mut store = SegmentStore::new();
        store.upsert_annotation(AnnotationSegment::new(20, None).with("test:a", true));
        store.upsert_annotation(AnnotationSegment::new(5, Some(1)).with("test:b", true));
        store.upsert_annotation(AnnotationSegment::new(5, Some(2)).with("test:c", true));
        let order: Vec<(u64, Option<u64>)> = store
            .annotations()
            .iter()
            .map(|a| (a.sample_start, a.sample_count))
            .collect();
        assert_eq!(order, vec![(5, Some(1)), (5, Some(2)), (20, None)]);
    }

    #[test]
    fn test_clear_filter_only_touches_existing() {
        let mut store = SegmentStore::new();
        store.upsert_annotation(
            AnnotationSegment::new(0, Some(10))
                .with("blargh:old", 1u64)
                .with("test:keep", 2u64),
        );
        let merged = store.upsert_annotation_filtered(
            AnnotationSegment::new(0, Some(10)).with("blargh:new", 3u64),
            &KeyFilter::clear("blargh:*"),
        );
        assert!(!merged.keys.contains_key("blargh:old"));
        assert!(merged.keys.contains_key("blargh:new"));
        assert!(merged.keys.contains_key("test:keep"));
    }

    #[test]
    fn test_lookups() {
        let mut store = SegmentStore::new();
        store.upsert_capture(CaptureSegment::at(0));
        store.upsert_capture(CaptureSegment::at(100));
        assert_eq!(store.capture_at_or_before(99).map(|c| c.sample_start), Some(0));
        assert_eq!(store.capture_at_or_before(100).map(|c| c.sample_start), Some(100));

        store.upsert_annotation(AnnotationSegment::new(50, Some(10)));
        store.upsert_annotation(AnnotationSegment::new(55, None));
        assert_eq!(store.annotations_overlapping(55).count(), 2);
        assert_eq!(store.annotations_overlapping(59).count(), 1);
        assert_eq!(store.annotations_overlapping(60).count(), 0);

        let empty = SegmentStore::new();
        assert!(empty.capture_at_or_before(0).is_none());
    }

    #[test]
    fn test_set_field_routes_core_keys() {
        let mut seg = CaptureSegment::at(0);
        seg.set_field("core:frequency", MetaValue::UInt64(2_400_000_000)).unwrap();
        seg.set_field("test:label", MetaValue::from("x")).unwrap();
        seg.set_field("core:datetime", MetaValue::from("2021-01-01T00:00:00Z")).unwrap();
        assert_eq!(seg.frequency, Some(2.4e9));
        assert!(seg.datetime.is_some());
        assert!(seg.extra.contains_key("test:label"));
        assert!(seg.set_field("core:frequency", MetaValue::from("fast")).is_err());
        assert!(seg.set_field("nonamespace", MetaValue::Null).is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let mut seg = CaptureSegment::at(7);
        seg.frequency = Some(1.5);
        let value = serde_json::to_value(&seg).unwrap();
        assert_eq!(value["core:sample_start"], 7);
        assert_eq!(value["core:frequency"], 1.5);
        assert!(value.get("core:datetime").is_none());

        let annotation: AnnotationSegment = serde_json::from_str(
            r#"{"core:sample_start": 3, "core:sample_count": 4, "test:x": -1}"#,
        )
        .unwrap();
        assert_eq!(annotation.sample_count, Some(4));
        assert_eq!(annotation.keys.get("test:x"), Some(&MetaValue::Int64(-1)));
    }
}
