//! Cuts a section out of a recording into a new one.
//!
//! Extents are sample counts (`1200`) or times with a unit (`1.5s`, `2m`,
//! `1h`); times are converted with the global sample rate and rounded up.
//! Positions count from the first capture segment, like playback does.

use log::{debug, info, warn};
use sigmf_core::keys::{self, strip_unknown};
use sigmf_core::tag::{FREQ_KEY, RATE_KEY};
use sigmf_core::value::get_f64;
use sigmf_core::{SegmentStore, StreamTag, TimeMode, TimeSpec};
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::playback::{SigmfSource, SourceConfig};
use crate::recording::{SigmfSink, SinkConfig};
use crate::storage::RecordingPaths;

/// Samples moved per block
const BLOCK_ITEMS: u64 = 64 * 1024;

/// Global keys that do not carry over to a cropped recording
const DROPPED_GLOBAL_KEYS: [&str; 3] = [keys::SHA512, keys::DATATYPE, keys::OFFSET];

/// Parse a sample count or a time with unit `s`, `m` or `h`
pub fn parse_extent(text: &str, sample_rate: Option<f64>) -> Result<u64> {
    let invalid = || EngineError::InvalidExtent(format!("'{}'", text));

    let (number, multiplier) = match text.char_indices().last() {
        Some((i, 's')) => (&text[..i], 1.0),
        Some((i, 'm')) => (&text[..i], 60.0),
        Some((i, 'h')) => (&text[..i], 3600.0),
        _ => {
            if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            return text.parse().map_err(|_| invalid());
        }
    };

    let (whole, frac) = match number.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (number, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(whole) || frac.is_some_and(|f| !digits(f)) {
        return Err(invalid());
    }
    let seconds: f64 = number.parse::<f64>().map_err(|_| invalid())? * multiplier;

    let rate = sample_rate.filter(|r| *r > 0.0).ok_or_else(|| {
        EngineError::InvalidExtent(format!(
            "'{}' is a time but the recording has no {}",
            text,
            keys::SAMPLE_RATE
        ))
    })?;
    Ok((seconds * rate).ceil() as u64)
}

/// Which part of a recording to keep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CropRequest {
    pub start: Option<String>,
    pub end: Option<String>,
    pub length: Option<String>,
}

/// Resolved crop, in samples from the first visible sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropExtent {
    pub start: u64,
    pub length: u64,
}

impl CropRequest {
    pub fn resolve(&self, sample_rate: Option<f64>, available: u64) -> Result<CropExtent> {
        let parse = |s: &Option<String>| {
            s.as_deref()
                .map(|text| parse_extent(text, sample_rate))
                .transpose()
        };
        let (start, end, length) = (parse(&self.start)?, parse(&self.end)?, parse(&self.length)?);

        let (start, length) = match (start, end, length) {
            (Some(start), Some(end), None) => {
                if end <= start {
                    return Err(EngineError::InvalidExtent(format!(
                        "end {} is not after start {}",
                        end, start
                    )));
                }
                (start, end - start)
            }
            (Some(start), None, Some(length)) => (start, length),
            (None, Some(end), Some(length)) => {
                let start = end.checked_sub(length).ok_or_else(|| {
                    EngineError::InvalidExtent(format!(
                        "length {} reaches before the start of the data",
                        length
                    ))
                })?;
                (start, length)
            }
            (Some(start), None, None) => (start, available.saturating_sub(start)),
            (None, None, Some(length)) => (0, length),
            (None, Some(_), None) => {
                return Err(EngineError::InvalidExtent(
                    "an end needs a start or a length".to_string(),
                ))
            }
            (None, None, None) => {
                return Err(EngineError::InvalidExtent("nothing to crop".to_string()))
            }
            (Some(_), Some(_), Some(_)) => {
                return Err(EngineError::InvalidExtent(
                    "give at most two of start, end and length".to_string(),
                ))
            }
        };

        if start >= available {
            return Err(EngineError::InvalidExtent(format!(
                "start {} is outside the {} samples of the recording",
                start, available
            )));
        }
        if length == 0 {
            return Err(EngineError::InvalidExtent(
                "length must be greater than 0".to_string(),
            ));
        }
        let max_length = available - start;
        if length > max_length {
            warn!(
                "Crop of {} samples from {} goes beyond the data, keeping {}",
                length, start, max_length
            );
        }
        Ok(CropExtent {
            start,
            length: length.min(max_length),
        })
    }
}

/// Capture state in effect at `file_offset` that started before it, as tags
/// for offset 0 of the cropped stream
fn carried_capture_tags(
    store: &SegmentStore,
    file_offset: u64,
    global_rate: Option<f64>,
) -> Vec<StreamTag> {
    let mut tags = Vec::new();

    let Some(capture) = store
        .capture_at_or_before(file_offset)
        .filter(|c| c.sample_start < file_offset)
    else {
        return tags;
    };
    let elapsed = file_offset - capture.sample_start;
    if let Some(freq) = capture.frequency {
        tags.push(StreamTag::new(0, FREQ_KEY, freq));
    }
    if let Some(rate) = capture.sample_rate {
        tags.push(StreamTag::new(0, RATE_KEY, rate));
    }
    let rate = capture.sample_rate.or(global_rate);
    match (capture.datetime, rate) {
        (Some(dt), Some(rate)) => {
            match TimeSpec::from_datetime(&dt).and_then(|t| t.advanced_by_samples(elapsed, rate)) {
                Ok(t) => tags.push(StreamTag::time(0, t)),
                Err(e) => warn!("Dropping capture datetime: {}", e),
            }
        }
        (Some(_), None) => warn!("No sample rate, crop start time is unknown"),
        _ => {}
    }
    for (key, value) in &capture.extra {
        tags.push(StreamTag::new(0, strip_unknown(key), value.clone()));
    }
    tags
}

/// Annotations that started before `file_offset` and run past it, cut to
/// start at sample 0 of the output. Each keeps its own range.
fn carry_annotations(store: &SegmentStore, file_offset: u64, sink: &SigmfSink) -> Result<usize> {
    let mut carried = 0;
    for annotation in store
        .annotations_overlapping(file_offset)
        .filter(|a| a.sample_start < file_offset)
    {
        let elapsed = file_offset - annotation.sample_start;
        let count = annotation.sample_count.map(|c| c - elapsed);
        if annotation.keys.is_empty() {
            debug!("Skipping carried annotation at {} without keys", annotation.sample_start);
            continue;
        }
        for (key, value) in &annotation.keys {
            sink.set_annotation_meta(0, count, key, value.clone())?;
        }
        carried += 1;
    }
    Ok(carried)
}

/// Feed `extent` of the source's visible stream into the open sink
fn copy_section(
    source: &SigmfSource,
    sink: &SigmfSink,
    store: &SegmentStore,
    extent: CropExtent,
    sample_rate: Option<f64>,
) -> Result<()> {
    let first_sample = store.first_capture().map(|c| c.sample_start).unwrap_or(0);
    let file_offset = first_sample + extent.start;
    let mut pending = carried_capture_tags(store, file_offset, sample_rate);
    let annotations = carry_annotations(store, file_offset, sink)?;
    debug!(
        "Carrying {} capture tags and {} annotations to the crop start",
        pending.len(),
        annotations
    );

    let item_size = source.item_size();
    let end = extent.start + extent.length;
    let mut position = 0u64;
    while position < end {
        let want = BLOCK_ITEMS.min(end - position) as usize;
        let Some(chunk) = source.work(want)? else {
            break;
        };
        let chunk_end = position + chunk.items as u64;
        if chunk_end > extent.start {
            let skip = extent.start.saturating_sub(position) as usize;
            let mut tags = std::mem::take(&mut pending);
            tags.extend(
                chunk
                    .tags
                    .into_iter()
                    .filter(|t| t.offset >= extent.start)
                    .map(|t| {
                        let offset = t.offset - extent.start;
                        t.with_offset(offset)
                    }),
            );
            sink.work(&chunk.samples[skip * item_size..], &tags)?;
        }
        position = chunk_end;
    }
    Ok(())
}

/// Copy `request`'s section of the recording at `input` into `output`.
///
/// On failure the output is abandoned under its temporary name, so a
/// partial crop never looks finished.
pub fn crop(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    request: &CropRequest,
) -> Result<RecordingPaths> {
    let source = SigmfSource::open(input, SourceConfig::default())?;
    let global = source.global();
    let store = source.segments();
    let sample_rate = get_f64(&global, keys::SAMPLE_RATE);
    let extent = request.resolve(sample_rate, source.visible_len())?;

    let mut config = SinkConfig::with_format(&source.output_format().to_string());
    config.time_mode = TimeMode::Absolute;
    config.num_channels = source.num_channels();
    let sink = SigmfSink::create(output, config)?;

    let copied = global
        .iter()
        .filter(|(key, _)| !DROPPED_GLOBAL_KEYS.contains(&key.as_str()))
        .try_for_each(|(key, value)| sink.set_global_meta(key, value.clone()))
        .and_then(|()| copy_section(&source, &sink, &store, extent, sample_rate));
    if let Err(e) = copied {
        if let Some(temp) = sink.abort() {
            warn!("Crop failed, partial output left at {}", temp.display());
        }
        return Err(e);
    }

    let paths = sink.close()?.ok_or_else(|| {
        EngineError::InvalidExtent("output recording was not open".to_string())
    })?;
    info!(
        "Cropped {} samples from {} into {}",
        extent.length,
        extent.start,
        paths.data.display()
    );
    Ok(paths)
}
