//! Adds annotations to a recording that is already on disk.
//!
//! Annotations may be placed by sample index or by stream time. Time is
//! converted to samples with the recording's `core:sample_rate`; in absolute
//! mode it is first made relative to the datetime of the first capture.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Deserialize;
use sigmf_core::time::nanos_between;
use sigmf_core::value::get_f64;
use sigmf_core::{
    keys, AnnotationSegment, KeyFilter, MetaError, MetaMap, MetaValue, SegmentStore,
    SidecarDocument, TimeMode, TimeSpec,
};
use std::path::Path;

use crate::error::Result;
use crate::storage::{self, RecordingPaths};

/// One annotation to add
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnnotationRequest {
    pub sample_start: Option<u64>,
    pub sample_count: Option<u64>,
    /// Used when `sample_start` is not given
    pub time: Option<TimeSpec>,
    pub duration: Option<TimeSpec>,
    #[serde(flatten)]
    pub keys: MetaMap,
}

impl AnnotationRequest {
    pub fn at_sample(sample_start: u64, sample_count: Option<u64>) -> Self {
        Self {
            sample_start: Some(sample_start),
            sample_count,
            ..Default::default()
        }
    }

    pub fn at_time(time: TimeSpec, duration: Option<TimeSpec>) -> Self {
        Self {
            time: Some(time),
            duration,
            ..Default::default()
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.keys.insert(key.to_string(), value.into());
        self
    }
}

fn nanos_to_samples(nanos: i128, rate: f64) -> Result<u64> {
    if nanos < 0 {
        return Err(MetaError::InvalidTime(format!("{} ns is before the recording", nanos)).into());
    }
    Ok((nanos as f64 * rate / 1e9).round() as u64)
}

pub struct AnnotationWriter {
    paths: RecordingPaths,
    time_mode: TimeMode,
    global: MetaMap,
    store: SegmentStore,
    /// Datetime of capture 0, needed in absolute mode
    start_time: Option<DateTime<Utc>>,
}

impl AnnotationWriter {
    /// Load the sidecar of the recording at `path`
    pub fn open(path: impl AsRef<Path>, filter: KeyFilter, time_mode: TimeMode) -> Result<Self> {
        let paths = RecordingPaths::new(path);
        let doc = storage::read_sidecar(&paths.meta)?;
        let (global, mut store) = doc.into_store();

        let removed = store.filter_annotation_keys(&filter);
        if removed > 0 {
            info!(
                "Cleared {} annotation keys matching '{}' in {}",
                removed,
                filter.pattern,
                paths.meta.display()
            );
        }

        let start_time = store.first_capture().and_then(|c| c.datetime);
        if time_mode == TimeMode::Absolute && start_time.is_none() {
            return Err(MetaError::InvalidTime(format!(
                "absolute time needs a {} on the first capture of {}",
                keys::DATETIME,
                paths.meta.display()
            ))
            .into());
        }

        Ok(Self {
            paths,
            time_mode,
            global,
            store,
            start_time,
        })
    }

    pub fn paths(&self) -> &RecordingPaths {
        &self.paths
    }

    pub fn segments(&self) -> &SegmentStore {
        &self.store
    }

    fn sample_rate(&self) -> Result<f64> {
        get_f64(&self.global, keys::SAMPLE_RATE)
            .filter(|r| *r > 0.0)
            .ok_or_else(|| {
                MetaError::InvalidTime(format!(
                    "placing by time needs {} in {}",
                    keys::SAMPLE_RATE,
                    self.paths.meta.display()
                ))
                .into()
            })
    }

    /// Sample offset of a stream time
    fn time_to_sample(&self, time: TimeSpec) -> Result<u64> {
        let rate = self.sample_rate()?;
        let nanos = match (self.time_mode, self.start_time) {
            (TimeMode::Absolute, Some(start)) => nanos_between(&start, &time.to_datetime()?),
            _ => time.to_nanos(),
        };
        nanos_to_samples(nanos, rate)
    }

    pub fn add(&mut self, request: AnnotationRequest) -> Result<()> {
        for key in request.keys.keys() {
            keys::validate_key(key)?;
        }
        let (start, count) = match (request.sample_start, request.time) {
            (Some(start), _) => (start, request.sample_count),
            (None, Some(time)) => {
                let start = self.time_to_sample(time)?;
                let count = match request.duration {
                    Some(d) => Some(nanos_to_samples(d.to_nanos(), self.sample_rate()?)?),
                    None => request.sample_count,
                };
                (start, count)
            }
            (None, None) => {
                return Err(MetaError::MalformedSidecar(
                    "annotation needs a sample_start or a time".to_string(),
                )
                .into())
            }
        };

        debug!("Annotation at {} (+{:?}): {} keys", start, count, request.keys.len());
        let mut seg = AnnotationSegment::new(start, count);
        seg.keys = request.keys;
        self.store.upsert_annotation(seg);
        Ok(())
    }

    /// Rewrite the sidecar with the new annotations
    pub fn finish(self) -> Result<RecordingPaths> {
        let doc = SidecarDocument::from_store(&self.global, &self.store);
        storage::write_sidecar(&self.paths.meta, &doc)?;
        info!(
            "Wrote {} annotations to {}",
            self.store.annotations().len(),
            self.paths.meta.display()
        );
        Ok(self.paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sigmf_core::ErrorCategory;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_sidecar(dir: &TempDir, sidecar: serde_json::Value) -> PathBuf {
        let base = dir.path().join("annotated");
        let paths = RecordingPaths::new(&base);
        fs::write(&paths.data, [0u8; 16]).unwrap();
        let doc: SidecarDocument = serde_json::from_value(sidecar).unwrap();
        storage::write_sidecar(&paths.meta, &doc).unwrap();
        base
    }

    fn sample_sidecar() -> serde_json::Value {
        json!({
            "global": {"core:datatype": "ri8", "core:sample_rate": 1000.0},
            "captures": [{"core:sample_start": 0, "core:datetime": "2024-01-01T00:00:10.000000000Z"}],
            "annotations": [
                {"core:sample_start": 5, "core:sample_count": 2, "blargh:old": 1, "other:x": 2}
            ]
        })
    }

    #[test]
    fn test_add_by_sample_merges() {
        let temp_dir = TempDir::new().unwrap();
        let base = create_test_sidecar(&temp_dir, sample_sidecar());
        let mut writer = AnnotationWriter::open(&base, KeyFilter::keep(), TimeMode::Relative).unwrap();
        writer
            .add(AnnotationRequest::at_sample(5, Some(2)).with("test:new", "a"))
            .unwrap();
        writer
            .add(AnnotationRequest::at_sample(9, None).with("test:other", true))
            .unwrap();
        writer.finish().unwrap();

        let doc = storage::read_sidecar(&RecordingPaths::new(&base).meta).unwrap();
        assert_eq!(doc.annotations.len(), 2);
        let first = &doc.annotations[0];
        assert_eq!(first.keys.get("blargh:old"), Some(&MetaValue::UInt64(1)));
        assert_eq!(first.keys.get("test:new"), Some(&MetaValue::from("a")));
        assert_eq!(doc.annotations[1].sample_start, 9);
    }

    #[test]
    fn test_clear_filter_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let base = create_test_sidecar(&temp_dir, sample_sidecar());
        let writer =
            AnnotationWriter::open(&base, KeyFilter::clear("blargh:*"), TimeMode::Relative).unwrap();
        let keys = &writer.segments().annotations()[0].keys;
        assert!(!keys.contains_key("blargh:old"));
        assert!(keys.contains_key("other:x"));
    }

    #[test]
    fn test_time_placement() {
        let temp_dir = TempDir::new().unwrap();
        let base = create_test_sidecar(&temp_dir, sample_sidecar());

        let mut writer = AnnotationWriter::open(&base, KeyFilter::keep(), TimeMode::Relative).unwrap();
        writer
            .add(
                AnnotationRequest::at_time(TimeSpec::new(1, 0.5), Some(TimeSpec::new(0, 0.25)))
                    .with("test:rel", 1u64),
            )
            .unwrap();
        let seg = writer.segments().annotations().last().unwrap().clone();
        assert_eq!((seg.sample_start, seg.sample_count), (1500, Some(250)));

        // 2024-01-01T00:00:12.5Z is 2.5 s after capture 0
        let mut writer = AnnotationWriter::open(&base, KeyFilter::keep(), TimeMode::Absolute).unwrap();
        writer
            .add(AnnotationRequest::at_time(TimeSpec::new(1_704_067_212, 0.5), None))
            .unwrap();
        assert!(writer
            .segments()
            .annotations()
            .iter()
            .any(|a| a.sample_start == 2500));

        let err = writer
            .add(AnnotationRequest::at_time(TimeSpec::new(1_704_067_200, 0.0), None))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Type);
    }

    #[test]
    fn test_absolute_needs_datetime() {
        let temp_dir = TempDir::new().unwrap();
        let base = create_test_sidecar(
            &temp_dir,
            json!({
                "global": {"core:datatype": "ri8"},
                "captures": [{"core:sample_start": 0}],
                "annotations": []
            }),
        );
        assert!(AnnotationWriter::open(&base, KeyFilter::keep(), TimeMode::Absolute).is_err());

        let mut writer = AnnotationWriter::open(&base, KeyFilter::keep(), TimeMode::Relative).unwrap();
        // No sample rate to convert with
        assert!(writer
            .add(AnnotationRequest::at_time(TimeSpec::new(1, 0.0), None))
            .is_err());
        assert!(writer.add(AnnotationRequest::default()).is_err());
        assert!(writer
            .add(AnnotationRequest::at_sample(0, None).with("nonamespace", 1u64))
            .is_err());
    }

    #[test]
    fn test_request_from_message() {
        let request: AnnotationRequest = serde_json::from_value(json!({
            "sample_start": 10,
            "sample_count": 4,
            "test:label": "burst"
        }))
        .unwrap();
        assert_eq!(
            request,
            AnnotationRequest::at_sample(10, Some(4)).with("test:label", "burst")
        );
    }
}
