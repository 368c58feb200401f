//! SigMF playback.
//!
//! Reads a recording back as a sample stream. Sidecar segments become
//! stream tags again:
//!
//! ```text
//! capture  { sample_start, frequency, datetime }  ->  rx_freq, rx_time
//! global   { sample_rate }                        ->  rx_rate
//! annotation { sample_start, sample_count, k }    ->  packet_len, k
//! ```

pub mod commands;
pub mod source;

pub use commands::{SourceCommand, SourceHandle};
pub use source::{PlaybackState, PlaybackStatus, SigmfSource, SourceChunk, SourceConfig};
