//! Playback source - reads a SigMF pair and emits samples with their tags.
//!
//! The stream starts at the first capture segment's `sample_start`; earlier
//! samples in the data file are never emitted. Every capture, annotation
//! and the global sample rate is turned back into stream tags at its offset
//! in this visible stream.

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use serde::Deserialize;
use sigmf_core::convert::{needs_swap, swap_element_bytes};
use sigmf_core::keys::{self, strip_unknown};
use sigmf_core::tag::{FREQ_KEY, PACKET_LEN_KEY, RATE_KEY};
use sigmf_core::value::get_f64;
use sigmf_core::{
    FormatDescriptor, MetaError, MetaMap, MetaValue, SampleConverter, SegmentStore, StreamTag,
    TimeSpec,
};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::commands::{SourceCommand, SourceHandle};
use crate::error::{EngineError, Result};
use crate::storage::{self, RecordingPaths};

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Loaded,
    Playing,
    Finished,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Loaded => write!(f, "loaded"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Finished => write!(f, "finished"),
        }
    }
}

/// Playback status information
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
    pub state: String,
    pub filename: String,
    /// Position within the current pass, in samples
    pub position: u64,
    /// Samples per pass
    pub length: u64,
    /// Completed passes when repeating
    pub repeat_index: u64,
    pub repeat: bool,
}

/// Playback settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SourceConfig {
    /// Datatype of the data file; taken from the sidecar when unset
    pub input_format: Option<String>,
    /// Datatype to emit; same as the input when unset
    pub output_format: Option<String>,
    /// Start over at the first visible sample after the last one
    pub repeat: bool,
    /// Key of a tag emitted at the start of every pass
    pub begin_tag: Option<String>,
    pub command_capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            input_format: None,
            output_format: None,
            repeat: false,
            begin_tag: None,
            command_capacity: 16,
        }
    }
}

/// One block of output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceChunk {
    pub samples: Vec<u8>,
    pub items: usize,
    /// Tags with absolute offsets in the emitted stream
    pub tags: Vec<StreamTag>,
    /// Global metadata, published with the first chunk of every pass
    pub global: Option<MetaMap>,
}

/// Stream tags for one pass, in emission order, at offsets relative to the
/// first visible sample
fn build_schedule(global: &MetaMap, store: &SegmentStore, first_sample: u64) -> Vec<StreamTag> {
    let mut schedule = Vec::new();

    if let Some(rate) = get_f64(global, keys::SAMPLE_RATE) {
        schedule.push(StreamTag::new(0, RATE_KEY, rate));
    }

    for capture in store.captures() {
        let local = capture.sample_start - first_sample;
        if let Some(freq) = capture.frequency {
            schedule.push(StreamTag::new(local, FREQ_KEY, freq));
        }
        if let Some(rate) = capture.sample_rate {
            schedule.push(StreamTag::new(local, RATE_KEY, rate));
        }
        if let Some(dt) = capture.datetime {
            match TimeSpec::from_datetime(&dt) {
                Ok(t) => schedule.push(StreamTag::time(local, t)),
                Err(e) => warn!("Skipping capture datetime at {}: {}", capture.sample_start, e),
            }
        }
        for (key, value) in &capture.extra {
            schedule.push(StreamTag::new(local, strip_unknown(key), value.clone()));
        }
    }

    for annotation in store.annotations() {
        let Some(local) = annotation.sample_start.checked_sub(first_sample) else {
            debug!(
                "Skipping annotation at {} before first capture at {}",
                annotation.sample_start, first_sample
            );
            continue;
        };
        if let Some(count) = annotation.sample_count {
            schedule.push(StreamTag::new(local, PACKET_LEN_KEY, count));
        }
        for (key, value) in &annotation.keys {
            schedule.push(StreamTag::new(local, strip_unknown(key), value.clone()));
        }
    }

    // Stable: at equal offsets the global, capture, annotation order holds
    schedule.sort_by_key(|t| t.offset);
    schedule
}

struct SourceState {
    reader: BufReader<File>,
    swap: bool,
    element_size: usize,
    input_item_size: usize,
    converter: SampleConverter,
    global: MetaMap,
    store: SegmentStore,
    schedule: Vec<StreamTag>,
    first_sample: u64,
    visible_len: u64,
    position: u64,
    next_tag: usize,
    repeat: bool,
    repeat_index: u64,
    begin_tag: Option<String>,
    state: PlaybackState,
}

impl SourceState {
    fn rewind(&mut self) -> io::Result<()> {
        // A first capture past the end of the data leaves nothing to seek to
        if self.visible_len > 0 {
            let start = self
                .first_sample
                .checked_mul(self.input_item_size as u64)
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("sample {} is not addressable", self.first_sample),
                    )
                })?;
            self.reader.seek(SeekFrom::Start(start))?;
        }
        self.position = 0;
        self.next_tag = 0;
        Ok(())
    }

    fn apply(&mut self, command: SourceCommand) {
        match command {
            SourceCommand::SetBeginTag { tag } => {
                debug!("Begin tag set to {:?}", tag);
                self.begin_tag = tag;
            }
        }
    }

    fn work(&mut self, max_items: usize) -> Result<Option<SourceChunk>> {
        if self.visible_len == 0 || max_items == 0 {
            self.state = PlaybackState::Finished;
            return Ok(None);
        }
        if self.position >= self.visible_len {
            if !self.repeat {
                if self.state != PlaybackState::Finished {
                    info!("Playback finished after {} samples", self.visible_len);
                }
                self.state = PlaybackState::Finished;
                return Ok(None);
            }
            self.repeat_index += 1;
            self.rewind()?;
            debug!("Repeating, pass {}", self.repeat_index);
        }
        self.state = PlaybackState::Playing;

        let items = (max_items as u64).min(self.visible_len - self.position) as usize;
        let mut raw = vec![0u8; items * self.input_item_size];
        self.reader.read_exact(&mut raw)?;
        if self.swap {
            swap_element_bytes(&mut raw, self.element_size);
        }
        let mut samples = Vec::new();
        self.converter.convert(&raw, &mut samples);

        let base = self.repeat_index * self.visible_len;
        let mut chunk = SourceChunk {
            samples,
            items,
            tags: Vec::new(),
            global: None,
        };

        if self.position == 0 {
            if let Some(key) = &self.begin_tag {
                chunk
                    .tags
                    .push(StreamTag::new(base, key, MetaValue::UInt64(self.repeat_index)));
            }
            chunk.global = Some(self.global.clone());
        }

        let end = self.position + items as u64;
        while let Some(tag) = self.schedule.get(self.next_tag) {
            if tag.offset >= end {
                break;
            }
            chunk.tags.push(tag.clone().with_offset(base + tag.offset));
            self.next_tag += 1;
        }

        self.position = end;
        Ok(Some(chunk))
    }
}

/// SigMF playback source
pub struct SigmfSource {
    paths: RecordingPaths,
    input_format: FormatDescriptor,
    output_format: FormatDescriptor,
    num_channels: usize,
    state: Mutex<SourceState>,
    commands_tx: Sender<SourceCommand>,
    commands_rx: Receiver<SourceCommand>,
}

impl SigmfSource {
    /// Load the sidecar and open the data file of the recording at `path`
    pub fn open(path: impl AsRef<Path>, config: SourceConfig) -> Result<Self> {
        let paths = RecordingPaths::new(path);
        let doc = storage::read_sidecar(&paths.meta)?;

        if doc.global.contains_key(keys::METADATA_ONLY) {
            return Err(EngineError::MetadataOnly);
        }

        let input_format = match (&config.input_format, doc.datatype()) {
            (Some(given), _) => FormatDescriptor::parse(given)?,
            (None, Some(datatype)) => FormatDescriptor::parse(datatype)?,
            (None, None) => {
                return Err(MetaError::MalformedSidecar(format!(
                    "{} has no {}",
                    paths.meta.display(),
                    keys::DATATYPE
                ))
                .into())
            }
        };
        let output_format = match &config.output_format {
            Some(s) => FormatDescriptor::parse(s)?,
            None => input_format.with_native_order(),
        };
        let converter = SampleConverter::new(input_format, output_format)?;

        let num_channels = doc
            .global
            .get(keys::NUM_CHANNELS)
            .and_then(MetaValue::as_u64)
            .unwrap_or(1)
            .max(1) as usize;

        let file = match File::open(&paths.data) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::MissingFile(paths.data.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let input_item_size = input_format.sample_size_bytes() * num_channels;
        let total = file.metadata()?.len() / input_item_size as u64;

        let (global, store) = doc.into_store();
        let first_sample = store.first_capture().map(|c| c.sample_start).unwrap_or(0);
        let visible_len = total.saturating_sub(first_sample);
        if first_sample > total {
            warn!(
                "First capture at {} is beyond the {} samples in {}",
                first_sample,
                total,
                paths.data.display()
            );
        }
        let schedule = build_schedule(&global, &store, first_sample);

        let mut state = SourceState {
            reader: BufReader::new(file),
            swap: needs_swap(&input_format),
            element_size: input_format.element_size_bytes(),
            input_item_size,
            converter,
            global,
            store,
            schedule,
            first_sample,
            visible_len,
            position: 0,
            next_tag: 0,
            repeat: config.repeat,
            repeat_index: 0,
            begin_tag: config.begin_tag,
            state: PlaybackState::Loaded,
        };
        state.rewind()?;

        info!(
            "Loaded {}: {} x{}, {} samples from offset {}",
            paths.data.display(),
            input_format,
            num_channels,
            visible_len,
            first_sample
        );

        let (commands_tx, commands_rx) = bounded(config.command_capacity.max(1));
        Ok(Self {
            paths,
            input_format,
            output_format,
            num_channels,
            state: Mutex::new(state),
            commands_tx,
            commands_rx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn paths(&self) -> &RecordingPaths {
        &self.paths
    }

    pub fn input_format(&self) -> FormatDescriptor {
        self.input_format
    }

    pub fn output_format(&self) -> FormatDescriptor {
        self.output_format
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Bytes per emitted item (all channels)
    pub fn item_size(&self) -> usize {
        self.output_format.sample_size_bytes() * self.num_channels
    }

    /// Samples in one pass
    pub fn visible_len(&self) -> u64 {
        self.lock().visible_len
    }

    pub fn global(&self) -> MetaMap {
        self.lock().global.clone()
    }

    pub fn segments(&self) -> SegmentStore {
        self.lock().store.clone()
    }

    pub fn handle(&self) -> SourceHandle {
        SourceHandle::new(self.commands_tx.clone())
    }

    /// Change the begin tag for passes that start from now on
    pub fn set_begin_tag(&self, tag: Option<&str>) {
        self.lock().begin_tag = tag.map(str::to_string);
    }

    pub fn status(&self) -> PlaybackStatus {
        let state = self.lock();
        PlaybackStatus {
            state: state.state.to_string(),
            filename: self.paths.data.display().to_string(),
            position: state.position,
            length: state.visible_len,
            repeat_index: state.repeat_index,
            repeat: state.repeat,
        }
    }

    /// Produce up to `max_items` samples. `None` means the end of the data
    /// (never, when repeating a non-empty recording).
    pub fn work(&self, max_items: usize) -> Result<Option<SourceChunk>> {
        let mut state = self.lock();
        while let Ok(command) = self.commands_rx.try_recv() {
            state.apply(command);
        }
        state.work(max_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{CaptureTarget, SigmfSink, SinkConfig};
    use crate::storage::write_sidecar;
    use serde_json::json;
    use sigmf_core::{ErrorCategory, SidecarDocument, TagValue, TimeMode};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn i16_bytes(values: impl IntoIterator<Item = i16>) -> Vec<u8> {
        values.into_iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    fn i16_values(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect()
    }

    /// Write `count` ri16 samples 0..count with a hand-made sidecar
    fn create_test_recording(dir: &TempDir, count: i16, sidecar: serde_json::Value) -> PathBuf {
        let base = dir.path().join("rec");
        let paths = RecordingPaths::new(&base);
        fs::write(&paths.data, i16_bytes(0..count)).unwrap();
        let doc: SidecarDocument = serde_json::from_value(sidecar).unwrap();
        write_sidecar(&paths.meta, &doc).unwrap();
        base
    }

    fn play_all(source: &SigmfSource, chunk: usize) -> (Vec<u8>, Vec<StreamTag>) {
        let mut samples = Vec::new();
        let mut tags = Vec::new();
        while let Some(out) = source.work(chunk).unwrap() {
            samples.extend(out.samples);
            tags.extend(out.tags);
        }
        (samples, tags)
    }

    #[test]
    fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("rt");
        let mut config = SinkConfig::with_format("ci16");
        config.time_mode = TimeMode::Absolute;
        config.sample_rate = Some(48000.0);
        let sink = SigmfSink::create(&base, config).unwrap();

        let data = i16_bytes((0..200).map(|v| v * 3 - 100));
        let tags = vec![
            StreamTag::new(0, "rx_freq", 1.0e9),
            StreamTag::time(0, TimeSpec::new(1_700_000_000, 0.25)),
            StreamTag::new(40, "rx_freq", 1.1e9),
            StreamTag::new(60, "burst", "yes"),
            StreamTag::new(60, "packet_len", 8u64),
        ];
        sink.work(&data[..160], &tags[..2]).unwrap();
        sink.work(&data[160..], &tags[2..]).unwrap();
        sink.close().unwrap();

        let source = SigmfSource::open(&base, SourceConfig::default()).unwrap();
        let (samples, out_tags) = play_all(&source, 33);
        assert_eq!(samples, data);

        let find = |offset: u64, key: &str| {
            out_tags
                .iter()
                .find(|t| t.offset == offset && t.key == key)
                .map(|t| t.value.clone())
        };
        assert_eq!(find(0, "rx_rate"), Some(TagValue::from(48000.0)));
        assert_eq!(find(0, "rx_freq"), Some(TagValue::from(1.0e9)));
        assert_eq!(
            find(0, "rx_time"),
            Some(TagValue::Time(TimeSpec::new(1_700_000_000, 0.25)))
        );
        assert_eq!(find(40, "rx_freq"), Some(TagValue::from(1.1e9)));
        assert_eq!(find(60, "burst"), Some(TagValue::from("yes")));
        assert_eq!(find(60, "packet_len"), Some(TagValue::from(8u64)));
    }

    #[test]
    fn test_skips_to_first_capture() {
        let temp_dir = TempDir::new().unwrap();
        let base = create_test_recording(
            &temp_dir,
            1000,
            json!({
                "global": {"core:datatype": "ri16", "core:version": "1.0.0"},
                "captures": [{"core:sample_start": 500, "core:frequency": 7.0}],
                "annotations": [
                    {"core:sample_start": 510, "core:sample_count": 2, "test:x": 1},
                    {"core:sample_start": 10, "test:early": true}
                ]
            }),
        );
        let source = SigmfSource::open(&base, SourceConfig::default()).unwrap();
        assert_eq!(source.visible_len(), 500);
        let (samples, tags) = play_all(&source, 64);
        let values = i16_values(&samples);
        assert_eq!(values.len(), 500);
        assert_eq!(values[0], 500);
        assert_eq!(tags[0], StreamTag::new(0, "rx_freq", 7.0));
        assert!(tags.iter().any(|t| t.offset == 10 && t.key == "test:x"));
        assert!(!tags.iter().any(|t| t.key == "test:early"));
    }

    #[test]
    fn test_first_capture_past_end_plays_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let base = create_test_recording(
            &temp_dir,
            8,
            json!({
                "global": {"core:datatype": "ci16"},
                "captures": [{"core:sample_start": 4611686018427387904u64}],
                "annotations": []
            }),
        );
        let source = SigmfSource::open(&base, SourceConfig::default()).unwrap();
        assert_eq!(source.visible_len(), 0);
        assert!(source.work(16).unwrap().is_none());
        assert_eq!(source.status().state, "finished");
    }

    #[test]
    fn test_tag_order_at_offset_zero() {
        let temp_dir = TempDir::new().unwrap();
        let base = create_test_recording(
            &temp_dir,
            4,
            json!({
                "global": {"core:datatype": "ri16", "core:sample_rate": 8.0},
                "captures": [{"core:sample_start": 0, "core:frequency": 3.0}],
                "annotations": [{"core:sample_start": 0, "unknown:label": "a"}]
            }),
        );
        let config = SourceConfig {
            begin_tag: Some("begin".into()),
            ..Default::default()
        };
        let source = SigmfSource::open(&base, config).unwrap();
        let chunk = source.work(4).unwrap().unwrap();
        let keys: Vec<&str> = chunk.tags.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["begin", "rx_rate", "rx_freq", "label"]);
        assert!(chunk.tags.iter().all(|t| t.offset == 0));
        assert!(chunk.global.is_some());
    }

    #[test]
    fn test_repeat_offsets() {
        let temp_dir = TempDir::new().unwrap();
        let base = create_test_recording(
            &temp_dir,
            10,
            json!({
                "global": {"core:datatype": "ri16"},
                "captures": [{"core:sample_start": 0}],
                "annotations": [{"core:sample_start": 3, "test:mark": 1}]
            }),
        );
        let config = SourceConfig {
            repeat: true,
            begin_tag: Some("begin".into()),
            ..Default::default()
        };
        let source = SigmfSource::open(&base, config).unwrap();
        let mut tags = Vec::new();
        let mut samples = Vec::new();
        for _ in 0..8 {
            let chunk = source.work(4).unwrap().unwrap();
            samples.extend(i16_values(&chunk.samples));
            tags.extend(chunk.tags);
        }
        assert_eq!(samples.len(), 28);
        assert_eq!(&samples[8..12], &[8, 9, 0, 1]);
        let marks: Vec<u64> = tags
            .iter()
            .filter(|t| t.key == "test:mark")
            .map(|t| t.offset)
            .collect();
        assert_eq!(marks, vec![3, 13, 23]);
        let begins: Vec<(u64, TagValue)> = tags
            .iter()
            .filter(|t| t.key == "begin")
            .map(|t| (t.offset, t.value.clone()))
            .collect();
        assert_eq!(
            begins,
            vec![
                (0, TagValue::from(0u64)),
                (10, TagValue::from(1u64)),
                (20, TagValue::from(2u64))
            ]
        );
    }

    #[test]
    fn test_set_begin_tag_command() {
        let temp_dir = TempDir::new().unwrap();
        let base = create_test_recording(
            &temp_dir,
            2,
            json!({"global": {"core:datatype": "ri16"}, "captures": [], "annotations": []}),
        );
        let config = SourceConfig {
            repeat: true,
            ..Default::default()
        };
        let source = SigmfSource::open(&base, config).unwrap();
        assert!(source.work(2).unwrap().unwrap().tags.is_empty());
        source
            .handle()
            .send_message(&json!({"command": "set_begin_tag", "tag": "loop"}))
            .unwrap();
        let chunk = source.work(2).unwrap().unwrap();
        assert_eq!(chunk.tags, vec![StreamTag::new(2, "loop", 1u64)]);
        source.set_begin_tag(None);
        assert!(source.work(2).unwrap().unwrap().tags.is_empty());
    }

    #[test]
    fn test_open_errors() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("nothing");
        assert!(matches!(
            SigmfSource::open(&base, SourceConfig::default()),
            Err(EngineError::MissingFile(_))
        ));

        let paths = RecordingPaths::new(&base);
        fs::write(&paths.meta, "{\"global\": {}}").unwrap();
        let err = SigmfSource::open(&base, SourceConfig::default()).err().unwrap();
        assert_eq!(err.category(), ErrorCategory::MalformedSidecar);

        let base = create_test_recording(
            &temp_dir,
            2,
            json!({"global": {"core:datatype": "ri16", "core:metadata_only": true},
                   "captures": [], "annotations": []}),
        );
        assert!(matches!(
            SigmfSource::open(&base, SourceConfig::default()),
            Err(EngineError::MetadataOnly)
        ));

        let base = create_test_recording(
            &temp_dir,
            2,
            json!({"global": {"core:datatype": "ri16"}, "captures": [], "annotations": []}),
        );
        fs::remove_file(RecordingPaths::new(&base).data).unwrap();
        assert!(matches!(
            SigmfSource::open(&base, SourceConfig::default()),
            Err(EngineError::MissingFile(_))
        ));
    }

    #[test]
    fn test_output_conversion() {
        let temp_dir = TempDir::new().unwrap();
        let base = create_test_recording(
            &temp_dir,
            3,
            json!({"global": {"core:datatype": "ri16"}, "captures": [], "annotations": []}),
        );
        let config = SourceConfig {
            output_format: Some("rf32".into()),
            ..Default::default()
        };
        let source = SigmfSource::open(&base, config).unwrap();
        assert_eq!(source.item_size(), 4);
        let chunk = source.work(3).unwrap().unwrap();
        let floats: Vec<f32> = chunk
            .samples
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(floats.len(), 3);
        assert_eq!(floats[0], 0.0);
        assert!((floats[1] - 1.0 / 32767.0).abs() < 1e-9);
        assert!((floats[2] - 2.0 / 32767.0).abs() < 1e-9);

        let config = SourceConfig {
            output_format: Some("cu8".into()),
            ..Default::default()
        };
        let err = SigmfSource::open(&base, config).err().unwrap();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_foreign_byte_order_is_swapped() {
        let temp_dir = TempDir::new().unwrap();
        let foreign = if cfg!(target_endian = "little") {
            "ri16_be"
        } else {
            "ri16_le"
        };
        let base = temp_dir.path().join("swapped");
        let paths = RecordingPaths::new(&base);
        let raw: Vec<u8> = [1i16, 258]
            .iter()
            .flat_map(|v| {
                let mut b = v.to_ne_bytes();
                b.reverse();
                b
            })
            .collect();
        fs::write(&paths.data, raw).unwrap();
        let doc: SidecarDocument = serde_json::from_value(json!({
            "global": {"core:datatype": foreign}, "captures": [], "annotations": []
        }))
        .unwrap();
        write_sidecar(&paths.meta, &doc).unwrap();

        let source = SigmfSource::open(&base, SourceConfig::default()).unwrap();
        let chunk = source.work(2).unwrap().unwrap();
        assert_eq!(i16_values(&chunk.samples), vec![1, 258]);
    }

    #[test]
    fn test_capture_extras_become_tags() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("extras");
        let sink = SigmfSink::create(&base, SinkConfig::with_format("ri8")).unwrap();
        sink.set_capture_meta(CaptureTarget::Index(0), "test:gain", 30u64)
            .unwrap();
        sink.work(&[0u8; 4], &[]).unwrap();
        sink.close().unwrap();

        let source = SigmfSource::open(&base, SourceConfig::default()).unwrap();
        let (_, tags) = play_all(&source, 16);
        assert!(tags.contains(&StreamTag::new(0, "test:gain", 30u64)));
        assert!(tags.iter().any(|t| t.key == "rx_time"));
        assert_eq!(source.status().state, "finished");
    }
}
