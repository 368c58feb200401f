//! SigMF recording.
//!
//! A recording is a pair of files sharing a base name:
//!
//! ```text
//! ┌──────────────────────────┐   ┌──────────────────────────────────┐
//! │ capture.sigmf-data       │   │ capture.sigmf-meta (JSON)        │
//! │                          │   │  global:      datatype, rate ... │
//! │ raw samples, no header,  │   │  captures:    [{sample_start,    │
//! │ layout from datatype     │   │                 frequency, ...}] │
//! │                          │   │  annotations: [{sample_start,    │
//! │                          │   │                 sample_count..}] │
//! └──────────────────────────┘   └──────────────────────────────────┘
//! ```
//!
//! The data file is written as `.temp-*` and only renamed once the sidecar
//! is on disk, see [`crate::storage`].

pub mod commands;
pub mod driver;
pub mod session;
pub mod sink;
pub mod timekeeper;

pub use commands::{CaptureTarget, SinkCommand, SinkHandle};
pub use driver::{start_recording, ActiveRecording, RecordingStatus, SampleChunk};
pub use session::RecordingSession;
pub use sink::{SigmfSink, SinkConfig};
pub use timekeeper::Timekeeper;
