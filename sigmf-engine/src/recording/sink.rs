//! Recording sink - writes a sample stream and its tags to a SigMF pair.
//!
//! The host calls [`SigmfSink::work`] with consecutive chunks of samples and
//! the stream tags that fall inside them. Tag offsets are absolute stream
//! offsets; the sink translates them into offsets relative to the first
//! sample of the currently open file.
//!
//! Control commands may come from another thread through a [`SinkHandle`].
//! They are queued on a bounded channel and applied under the same lock as
//! the sample path, at the start of the next chunk.

use chrono::Utc;
use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use serde::Deserialize;
use sigmf_core::keys::{self, sanitize_tag_key};
use sigmf_core::value::get_f64;
use sigmf_core::{
    AnnotationSegment, CaptureSegment, FormatDescriptor, KeyFilter, MetaMap, MetaValue,
    SegmentStore, SidecarDocument, StreamTag, TagRole, TimeMode, TimeSpec,
};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::commands::{CaptureTarget, SinkCommand, SinkHandle};
use super::session::RecordingSession;
use super::timekeeper::Timekeeper;
use crate::error::{EngineError, Result};
use crate::storage::RecordingPaths;

/// Recording sink settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SinkConfig {
    /// SigMF datatype, e.g. `cf32` or `ci16_le`
    pub format: String,
    pub time_mode: TimeMode,
    pub num_channels: usize,
    pub sample_rate: Option<f64>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub hardware: Option<String>,
    /// Applied to existing annotation keys when a tag merges into them
    pub annotation_filter: KeyFilter,
    /// Capacity of the command queue
    pub command_capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            format: "cf32".to_string(),
            time_mode: TimeMode::Relative,
            num_channels: 1,
            sample_rate: None,
            description: None,
            author: None,
            license: None,
            hardware: None,
            annotation_filter: KeyFilter::keep(),
            command_capacity: 64,
        }
    }
}

impl SinkConfig {
    pub fn with_format(format: &str) -> Self {
        Self {
            format: format.to_string(),
            ..Default::default()
        }
    }

    fn initial_global(&self, format: &FormatDescriptor) -> MetaMap {
        let mut global = keys::new_global(format, self.num_channels);
        if let Some(rate) = self.sample_rate {
            global.insert(keys::SAMPLE_RATE.to_string(), MetaValue::Double(rate));
        }
        let strings = [
            (keys::DESCRIPTION, &self.description),
            (keys::AUTHOR, &self.author),
            (keys::LICENSE, &self.license),
            (keys::HARDWARE, &self.hardware),
        ];
        for (key, value) in strings {
            if let Some(v) = value {
                global.insert(key.to_string(), MetaValue::String(v.clone()));
            }
        }
        global
    }
}

/// Events received while no file is open, attributed to offset 0 of the
/// next recording.
#[derive(Debug, Default)]
struct PreOpenBuffer {
    capture: CaptureSegment,
    has_capture: bool,
    /// Last stream time seen, with the stream offset it arrived at
    time: Option<(TimeSpec, u64)>,
    annotations: Vec<AnnotationSegment>,
}

impl PreOpenBuffer {
    fn add_annotation(&mut self, seg: AnnotationSegment) {
        match self
            .annotations
            .iter_mut()
            .find(|a| a.sample_count == seg.sample_count)
        {
            Some(existing) => existing.keys.extend(seg.keys),
            None => self.annotations.push(seg),
        }
    }
}

/// What a group of tags at one offset turns into
#[derive(Debug)]
struct TagGroup {
    capture: CaptureSegment,
    has_capture: bool,
    time: Option<TimeSpec>,
    rate: Option<f64>,
    annotation: AnnotationSegment,
    has_annotation: bool,
}

impl TagGroup {
    fn collect(tags: &[StreamTag]) -> Self {
        let mut group = TagGroup {
            capture: CaptureSegment::default(),
            has_capture: false,
            time: None,
            rate: None,
            annotation: AnnotationSegment::default(),
            has_annotation: false,
        };
        for tag in tags {
            match tag.role() {
                TagRole::Rate => match tag.value.as_f64() {
                    Some(rate) => group.rate = Some(rate),
                    None => warn!("Ignoring non-numeric rate tag {}", tag),
                },
                TagRole::Frequency => match tag.value.as_f64() {
                    Some(freq) => {
                        group.capture.frequency = Some(freq);
                        group.has_capture = true;
                    }
                    None => warn!("Ignoring non-numeric frequency tag {}", tag),
                },
                TagRole::Time => match tag.value.as_time() {
                    Some(t) => {
                        group.time = Some(t);
                        group.has_capture = true;
                    }
                    None => warn!("Ignoring time tag without a time value {}", tag),
                },
                TagRole::PacketLength => {
                    group.annotation.sample_count = tag.value.as_u64();
                    group.has_annotation = true;
                }
                TagRole::Annotation => {
                    group
                        .annotation
                        .keys
                        .insert(sanitize_tag_key(&tag.key), tag.value.clone().into_meta());
                    group.has_annotation = true;
                }
            }
        }
        group
    }
}

struct SinkState {
    session: RecordingSession,
    global: MetaMap,
    store: SegmentStore,
    pending: PreOpenBuffer,
    timekeeper: Timekeeper,
    annotation_filter: KeyFilter,
    /// Samples seen since the sink was created, open or not
    items_consumed: u64,
}

impl SinkState {
    fn sample_rate(&self) -> Option<f64> {
        get_f64(&self.global, keys::SAMPLE_RATE)
    }

    fn document(&self) -> SidecarDocument {
        SidecarDocument::from_store(&self.global, &self.store)
    }

    fn open(&mut self, path: &Path) -> Result<RecordingPaths> {
        let paths = RecordingPaths::new(path);
        if self.session.is_open() {
            debug!("Closing current recording before opening {}", paths.data.display());
            self.close()?;
        }
        self.session.open(paths.clone(), self.items_consumed)?;
        self.start_recording();
        Ok(paths)
    }

    /// Install capture 0 and replay everything buffered while closed
    fn start_recording(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let mut first = CaptureSegment::at(0);
        if pending.has_capture {
            first.merge(pending.capture);
        }

        if let Some((time, seen_at)) = pending.time {
            // Move the time forward to the sample that opens the file
            let elapsed = self.items_consumed.saturating_sub(seen_at);
            let advanced = match self.sample_rate() {
                Some(rate) => time.advanced_by_samples(elapsed, rate).unwrap_or(time),
                None => time,
            };
            match self.timekeeper.datetime_for(advanced, self.items_consumed) {
                Ok(dt) => first.datetime = Some(dt),
                Err(e) => warn!("Dropping buffered time {:?}: {}", time, e),
            }
        }

        if first.datetime.is_none() {
            let derived = self
                .timekeeper
                .datetime_at(self.items_consumed, self.sample_rate());
            first.datetime = Some(derived.unwrap_or_else(Utc::now));
        }
        self.store.upsert_capture(first);

        for mut annotation in pending.annotations {
            annotation.sample_start = 0;
            self.store
                .upsert_annotation_filtered(annotation, &self.annotation_filter);
        }
    }

    fn close(&mut self) -> Result<Option<RecordingPaths>> {
        if !self.session.is_open() {
            return Ok(None);
        }
        let doc = self.document();
        let result = self.session.close(&doc);
        keys::reset_global(&mut self.global);
        self.store.clear();
        result
    }

    /// Forget the metadata of an abandoned recording
    fn discard(&mut self) {
        keys::reset_global(&mut self.global);
        self.store.clear();
        self.pending = PreOpenBuffer::default();
    }

    fn abort(&mut self) -> Option<PathBuf> {
        let temp = self.session.abandon()?;
        self.discard();
        Some(temp)
    }

    fn flush(&mut self) -> Result<()> {
        let doc = self.document();
        self.session.flush(&doc)
    }

    fn set_global(&mut self, key: &str, value: MetaValue) -> Result<()> {
        keys::validate_key(key)?;
        self.global.insert(key.to_string(), value);
        Ok(())
    }

    fn set_capture(&mut self, target: CaptureTarget, key: &str, value: MetaValue) -> Result<()> {
        if !self.session.is_open() {
            debug!("Buffering capture field {} until a file is open", key);
            self.pending.capture.set_field(key, value)?;
            self.pending.has_capture = true;
            return Ok(());
        }
        match target {
            CaptureTarget::Index(index) => {
                let capture = self
                    .store
                    .capture_mut(index)
                    .ok_or(EngineError::InvalidCaptureIndex(index))?;
                capture.set_field(key, value)?;
            }
            CaptureTarget::SampleStart(start) => {
                let mut seg = CaptureSegment::at(start);
                seg.set_field(key, value)?;
                self.store.upsert_capture(seg);
            }
        }
        Ok(())
    }

    fn set_annotation(
        &mut self,
        sample_start: u64,
        sample_count: Option<u64>,
        key: &str,
        value: MetaValue,
    ) -> Result<()> {
        keys::validate_key(key)?;
        let seg = AnnotationSegment::new(sample_start, sample_count).with(key, value);
        self.store.upsert_annotation(seg);
        Ok(())
    }

    fn record_position(&mut self, latitude: f64, longitude: f64) {
        let seg = AnnotationSegment::new(0, None)
            .with(keys::LATITUDE, latitude)
            .with(keys::LONGITUDE, longitude)
            .with(keys::GENERATOR, "GPS Message");
        match self.session.offset_base() {
            Some(base) => {
                let seg = AnnotationSegment {
                    sample_start: self.items_consumed - base,
                    ..seg
                };
                self.store.upsert_annotation(seg);
            }
            None => self.pending.add_annotation(seg),
        }
    }

    fn apply(&mut self, command: SinkCommand) -> Result<()> {
        match command {
            SinkCommand::Open { filename } => self.open(&filename).map(|_| ()),
            SinkCommand::Close => self.close().map(|_| ()),
            SinkCommand::Flush => self.flush(),
            SinkCommand::SetGlobalMeta { key, val } => {
                let value = MetaValue::from_json(&key, val)?;
                self.set_global(&key, value)
            }
            SinkCommand::SetCaptureMeta {
                index,
                sample_start,
                key,
                val,
            } => {
                let value = MetaValue::from_json(&key, val)?;
                let target = match (index, sample_start) {
                    (Some(i), _) => CaptureTarget::Index(i),
                    (None, Some(s)) => CaptureTarget::SampleStart(s),
                    (None, None) => {
                        return Err(EngineError::InvalidCommand(
                            "set_capture_meta needs index or sample_start".to_string(),
                        ))
                    }
                };
                self.set_capture(target, &key, value)
            }
            SinkCommand::SetAnnotationMeta {
                sample_start,
                sample_count,
                key,
                val,
            } => {
                let value = MetaValue::from_json(&key, val)?;
                self.set_annotation(sample_start, sample_count, &key, value)
            }
            SinkCommand::Gps {
                latitude,
                longitude,
            } => {
                self.record_position(latitude, longitude);
                Ok(())
            }
        }
    }

    /// Fold one offset's worth of tags into the store (file open)
    fn handle_group(&mut self, offset: u64, base: u64, tags: &[StreamTag]) {
        let group = TagGroup::collect(tags);
        let local = match offset.checked_sub(base) {
            Some(local) => local,
            None => {
                debug!("Tag at {} precedes the open file (starts at {}), using 0", offset, base);
                0
            }
        };

        if let Some(rate) = group.rate {
            self.global
                .insert(keys::SAMPLE_RATE.to_string(), MetaValue::Double(rate));
        }

        if group.has_capture {
            let mut capture = group.capture;
            capture.sample_start = local;
            if let Some(time) = group.time {
                match self.timekeeper.datetime_for(time, offset) {
                    Ok(dt) => capture.datetime = Some(dt),
                    Err(e) => warn!("Ignoring time {:?} at {}: {}", time, offset, e),
                }
            } else {
                let already_timed = self
                    .store
                    .capture_at_or_before(local)
                    .map(|c| c.sample_start == local && c.datetime.is_some())
                    .unwrap_or(false);
                if !already_timed {
                    capture.datetime = self.timekeeper.datetime_at(offset, self.sample_rate());
                }
            }
            self.store.upsert_capture(capture);
        }

        if group.has_annotation {
            let mut annotation = group.annotation;
            annotation.sample_start = local;
            self.store
                .upsert_annotation_filtered(annotation, &self.annotation_filter);
        }
    }

    /// Hold tags that arrive while no file is open
    fn buffer_group(&mut self, offset: u64, tags: &[StreamTag]) {
        let group = TagGroup::collect(tags);
        debug!("Buffering {} tag(s) at {} until a file is open", tags.len(), offset);
        if let Some(rate) = group.rate {
            self.global
                .insert(keys::SAMPLE_RATE.to_string(), MetaValue::Double(rate));
        }
        if group.has_capture {
            self.pending.capture.merge(group.capture);
            self.pending.has_capture = true;
        }
        if let Some(time) = group.time {
            self.pending.time = Some((time, offset));
        }
        if group.has_annotation {
            self.pending.add_annotation(group.annotation);
        }
    }

    fn process(&mut self, bytes: &[u8], items: u64, tags: &[StreamTag]) -> Result<()> {
        let mut sorted: Vec<StreamTag> = tags.to_vec();
        sorted.sort_by_key(|t| t.offset);

        let base = self.session.offset_base();
        for group in sorted.chunk_by(|a, b| a.offset == b.offset) {
            let offset = group[0].offset;
            match base {
                Some(base) => self.handle_group(offset, base, group),
                None => self.buffer_group(offset, group),
            }
        }

        let result = self.session.write(bytes, items);
        self.items_consumed += items;
        if result.is_err() {
            self.discard();
        }
        result
    }
}

/// SigMF recording sink
pub struct SigmfSink {
    format: FormatDescriptor,
    num_channels: usize,
    state: Mutex<SinkState>,
    commands_tx: Sender<SinkCommand>,
    commands_rx: Receiver<SinkCommand>,
}

impl SigmfSink {
    /// Validate the configuration; no file is opened
    pub fn new(config: SinkConfig) -> Result<Self> {
        let format = FormatDescriptor::parse(&config.format)?;
        format.require_native()?;
        if config.num_channels == 0 {
            return Err(EngineError::InvalidCommand(
                "a sink needs at least one channel".to_string(),
            ));
        }

        let (commands_tx, commands_rx) = bounded(config.command_capacity.max(1));
        let state = SinkState {
            session: RecordingSession::Closed,
            global: config.initial_global(&format),
            store: SegmentStore::new(),
            pending: PreOpenBuffer::default(),
            timekeeper: Timekeeper::new(config.time_mode),
            annotation_filter: config.annotation_filter.clone(),
            items_consumed: 0,
        };
        debug!("Created sink for {} x{}", format, config.num_channels);

        Ok(Self {
            format,
            num_channels: config.num_channels,
            state: Mutex::new(state),
            commands_tx,
            commands_rx,
        })
    }

    /// Create a sink and open `path` straight away
    pub fn create(path: impl AsRef<Path>, config: SinkConfig) -> Result<Self> {
        let sink = Self::new(config)?;
        sink.open(path)?;
        Ok(sink)
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn format(&self) -> FormatDescriptor {
        self.format
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Bytes per item handed to [`SigmfSink::work`] (all channels)
    pub fn item_size(&self) -> usize {
        self.format.sample_size_bytes() * self.num_channels
    }

    pub fn handle(&self) -> SinkHandle {
        SinkHandle::new(self.commands_tx.clone())
    }

    /// Open a new recording, closing the current one first
    pub fn open(&self, path: impl AsRef<Path>) -> Result<RecordingPaths> {
        self.lock().open(path.as_ref())
    }

    /// Finish the current recording. Returns its paths, or `None` if no file
    /// was open.
    pub fn close(&self) -> Result<Option<RecordingPaths>> {
        self.lock().close()
    }

    /// Write the sidecar of the open recording without closing it
    pub fn flush(&self) -> Result<()> {
        self.lock().flush()
    }

    pub fn is_open(&self) -> bool {
        self.lock().session.is_open()
    }

    /// Paths of the open recording
    pub fn current_paths(&self) -> Option<RecordingPaths> {
        self.lock().session.current().map(|r| r.paths().clone())
    }

    /// Samples seen since creation, whether or not a file was open
    pub fn items_consumed(&self) -> u64 {
        self.lock().items_consumed
    }

    /// Current in-memory sidecar contents
    pub fn metadata(&self) -> SidecarDocument {
        self.lock().document()
    }

    pub fn set_global_meta(&self, key: &str, value: impl Into<MetaValue>) -> Result<()> {
        self.lock().set_global(key, value.into())
    }

    /// Set a global field from JSON; arrays and objects are rejected
    pub fn set_global_meta_json(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let value = MetaValue::from_json(key, value)?;
        self.lock().set_global(key, value)
    }

    pub fn set_capture_meta(
        &self,
        target: CaptureTarget,
        key: &str,
        value: impl Into<MetaValue>,
    ) -> Result<()> {
        self.lock().set_capture(target, key, value.into())
    }

    pub fn set_annotation_meta(
        &self,
        sample_start: u64,
        sample_count: Option<u64>,
        key: &str,
        value: impl Into<MetaValue>,
    ) -> Result<()> {
        self.lock()
            .set_annotation(sample_start, sample_count, key, value.into())
    }

    /// Annotate the current position with a GPS fix
    pub fn record_position(&self, latitude: f64, longitude: f64) {
        self.lock().record_position(latitude, longitude)
    }

    /// Apply a command immediately
    pub fn apply(&self, command: SinkCommand) -> Result<()> {
        self.lock().apply(command)
    }

    fn drain_commands(&self, state: &mut SinkState) {
        while let Ok(command) = self.commands_rx.try_recv() {
            debug!("Applying queued command {:?}", command);
            if let Err(e) = state.apply(command) {
                error!("Queued command failed: {}", e);
            }
        }
    }

    /// Apply queued commands without consuming samples
    pub fn process_commands(&self) {
        let mut state = self.lock();
        self.drain_commands(&mut state);
    }

    /// Consume one chunk of interleaved samples and the tags inside it.
    /// Returns the number of items consumed.
    pub fn work(&self, samples: &[u8], tags: &[StreamTag]) -> Result<usize> {
        let item_size = self.item_size();
        if samples.len() % item_size != 0 {
            return Err(EngineError::PartialSample {
                len: samples.len(),
                sample_size: item_size,
            });
        }
        let items = samples.len() / item_size;

        let mut state = self.lock();
        self.drain_commands(&mut state);
        state.process(samples, items as u64, tags)?;
        Ok(items)
    }

    /// Like [`SigmfSink::work`] with one buffer per channel, interleaved on write
    pub fn work_channels(&self, channels: &[&[u8]], tags: &[StreamTag]) -> Result<usize> {
        if channels.len() != self.num_channels {
            return Err(EngineError::InvalidCommand(format!(
                "expected {} channel buffers, got {}",
                self.num_channels,
                channels.len()
            )));
        }
        let sample_size = self.format.sample_size_bytes();
        let len = channels.first().map(|c| c.len()).unwrap_or(0);
        if channels.iter().any(|c| c.len() != len) || len % sample_size != 0 {
            return Err(EngineError::PartialSample { len, sample_size });
        }

        let items = len / sample_size;
        let mut interleaved = Vec::with_capacity(len * channels.len());
        for i in 0..items {
            let range = i * sample_size..(i + 1) * sample_size;
            for channel in channels {
                interleaved.extend_from_slice(&channel[range.clone()]);
            }
        }
        self.work(&interleaved, tags)
    }

    /// Give up on the current recording: no sidecar is written and the
    /// data keeps its temporary name. Returns that name, or `None` if no
    /// file was open.
    pub fn abort(&self) -> Option<PathBuf> {
        self.lock().abort()
    }

    /// Apply pending commands and close the current recording
    pub fn stop(&self) -> Result<()> {
        let mut state = self.lock();
        self.drain_commands(&mut state);
        if let Some(paths) = state.close()? {
            info!("Recording stopped: {}", paths.data.display());
        }
        Ok(())
    }
}

impl Drop for SigmfSink {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to close recording on drop: {}", e);
        }
    }
}
