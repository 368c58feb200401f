//! # SigMF Engine
//!
//! Recording and playback of SigMF datasets.
//!
//! This crate provides:
//! - A recording sink that writes samples and turns stream tags into
//!   capture and annotation segments
//! - A playback source that reads a dataset back as samples plus tags
//! - Offline tools to annotate, checksum and crop finished recordings
//!
//! ## Architecture
//!
//! Metadata handling lives in [`sigmf_core`]; this crate adds file I/O,
//! the command queues and a [`tokio`] task to drive a sink.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      sigmf-engine                        │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐  │
//! │  │ SigmfSink    │   │ SigmfSource  │   │ tools        │  │
//! │  │ (recording)  │   │ (playback)   │   │ crop, digest │  │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘  │
//! │         │                  │                  │          │
//! │         ▼                  ▼                  ▼          │
//! │  ┌─────────────────────────────────────────────────────┐ │
//! │  │ storage: .temp-* data files, atomic sidecar writes  │ │
//! │  └─────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example: Recording a Buffer
//!
//! ```rust,no_run
//! use sigmf_core::StreamTag;
//! use sigmf_engine::recording::{SigmfSink, SinkConfig};
//!
//! let sink = SigmfSink::create("capture", SinkConfig::with_format("ci16")).unwrap();
//! let samples = vec![0u8; 4 * 1024];
//! sink.work(&samples, &[StreamTag::new(0, "rx_freq", 915e6)]).unwrap();
//! sink.close().unwrap();
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all subcommands:
//!
//! - `record` - raw samples from a file or stdin into a dataset
//! - `play` - a dataset's samples to a file or stdout
//! - `hash` - check or update `core:sha512`
//! - `crop` - cut a section into a new dataset
//! - `annotate` - add an annotation to an existing dataset

use clap::{Args, Parser, Subcommand};
use sigmf_core::{KeyFilter, MetaValue, TimeMode, TimeSpec};
use std::path::PathBuf;

pub mod annotate;
pub mod error;
pub mod playback;
pub mod recording;
pub mod storage;
pub mod tools;

pub use error::{EngineError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
#[command(name = "sigmf", version, about = "Record, play and edit SigMF datasets")]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Record raw samples into a dataset
    Record(RecordArgs),
    /// Play a dataset's samples out
    Play(PlayArgs),
    /// Check or update the SHA-512 of datasets
    Hash(HashArgs),
    /// Cut out a section of a dataset
    Crop(CropArgs),
    /// Add an annotation to a dataset
    Annotate(AnnotateArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RecordArgs {
    /// Dataset to write
    pub output: PathBuf,

    /// Raw sample file, stdin when absent
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// SigMF datatype of the samples
    #[arg(short, long, default_value = "cf32")]
    pub format: String,

    #[arg(short = 'r', long)]
    pub sample_rate: Option<f64>,

    /// Center frequency, stored on the first capture
    #[arg(long)]
    pub frequency: Option<f64>,

    #[arg(long, default_value_t = 1)]
    pub channels: usize,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub author: Option<String>,

    #[arg(long)]
    pub license: Option<String>,

    #[arg(long)]
    pub hardware: Option<String>,

    /// Store stream times as given instead of pinning them to the host clock
    #[arg(long, default_value_t = false)]
    pub absolute_time: bool,
}

impl RecordArgs {
    pub fn sink_config(&self) -> recording::SinkConfig {
        recording::SinkConfig {
            format: self.format.clone(),
            time_mode: time_mode(self.absolute_time),
            num_channels: self.channels,
            sample_rate: self.sample_rate,
            description: self.description.clone(),
            author: self.author.clone(),
            license: self.license.clone(),
            hardware: self.hardware.clone(),
            ..Default::default()
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct PlayArgs {
    /// Dataset to read
    pub input: PathBuf,

    /// Raw sample file to write, stdout when absent
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Start over after the last sample; stop with Ctrl-C
    #[arg(long, default_value_t = false)]
    pub repeat: bool,

    /// Read the data as this datatype instead of the one in the sidecar
    #[arg(long)]
    pub input_format: Option<String>,

    /// Convert samples to this datatype
    #[arg(long)]
    pub output_format: Option<String>,

    /// Key of a tag emitted at the start of every pass
    #[arg(long)]
    pub begin_tag: Option<String>,
}

impl PlayArgs {
    pub fn source_config(&self) -> playback::SourceConfig {
        playback::SourceConfig {
            input_format: self.input_format.clone(),
            output_format: self.output_format.clone(),
            repeat: self.repeat,
            begin_tag: self.begin_tag.clone(),
            ..Default::default()
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct HashArgs {
    /// Datasets to process
    #[arg(required = true)]
    pub datasets: Vec<PathBuf>,

    /// Verify the stored hash (the default)
    #[arg(long, conflicts_with = "update")]
    pub check: bool,

    /// Recompute and store the hash
    #[arg(long)]
    pub update: bool,
}

#[derive(Args, Clone, Debug)]
pub struct CropArgs {
    /// Dataset to crop
    pub input: PathBuf,

    /// Dataset to write
    #[arg(short, long)]
    pub output: PathBuf,

    /// Where to start: samples, or a time like 1.5s, 2m, 1h
    #[arg(short, long)]
    pub start: Option<String>,

    /// Where to end
    #[arg(short, long)]
    pub end: Option<String>,

    /// Length of the cropped section
    #[arg(short, long)]
    pub length: Option<String>,
}

impl CropArgs {
    pub fn request(&self) -> tools::CropRequest {
        tools::CropRequest {
            start: self.start.clone(),
            end: self.end.clone(),
            length: self.length.clone(),
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct AnnotateArgs {
    /// Dataset to annotate
    pub dataset: PathBuf,

    #[arg(long, conflicts_with = "time")]
    pub sample_start: Option<u64>,

    #[arg(long, conflicts_with = "duration")]
    pub sample_count: Option<u64>,

    /// Start in seconds, converted with the sample rate
    #[arg(long)]
    pub time: Option<f64>,

    /// Length in seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Times are UTC seconds since the epoch rather than seconds into the recording
    #[arg(long, default_value_t = false)]
    pub absolute_time: bool,

    /// Remove existing annotation keys matching this glob first
    #[arg(long)]
    pub clear_pattern: Option<String>,

    /// Annotation field as namespace:name=value; may be repeated
    #[arg(short, long = "key", value_name = "KEY=VALUE")]
    pub keys: Vec<String>,
}

impl AnnotateArgs {
    pub fn filter(&self) -> KeyFilter {
        match &self.clear_pattern {
            Some(pattern) => KeyFilter::clear(pattern),
            None => KeyFilter::keep(),
        }
    }

    pub fn time_mode(&self) -> TimeMode {
        time_mode(self.absolute_time)
    }

    /// Values that parse as JSON scalars keep their type, anything else is a string
    pub fn request(&self) -> Result<annotate::AnnotationRequest> {
        let mut request = annotate::AnnotationRequest {
            sample_start: self.sample_start,
            sample_count: self.sample_count,
            time: self.time.map(seconds_to_timespec),
            duration: self.duration.map(seconds_to_timespec),
            ..Default::default()
        };
        for pair in &self.keys {
            let (key, text) = pair.split_once('=').ok_or_else(|| {
                EngineError::InvalidCommand(format!("'{}' is not KEY=VALUE", pair))
            })?;
            let json = serde_json::from_str(text)
                .unwrap_or_else(|_| serde_json::Value::String(text.to_string()));
            request = request.with(key, MetaValue::from_json(key, json)?);
        }
        Ok(request)
    }
}

fn time_mode(absolute: bool) -> TimeMode {
    if absolute {
        TimeMode::Absolute
    } else {
        TimeMode::Relative
    }
}

fn seconds_to_timespec(seconds: f64) -> TimeSpec {
    let seconds = seconds.max(0.0);
    TimeSpec::new(seconds.trunc() as u64, seconds.fract())
}
