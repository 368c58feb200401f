//! # SigMF Core
//!
//! Platform-independent metadata model for SigMF recordings.
//!
//! This crate contains the pure bookkeeping behind recording and playback
//! with **zero I/O dependencies**: it never opens a file and never logs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  sigmf-core (pure, no filesystem, no async)                 │
//! │  ├── format/    (datatype strings, sample sizes)            │
//! │  ├── value/     (scalar metadata values)                    │
//! │  ├── segments/  (capture & annotation store)                │
//! │  ├── sidecar/   (the .sigmf-meta document)                  │
//! │  ├── tag/       (inline stream tags)                        │
//! │  └── time/      (stream time <-> ISO-8601)                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                 ┌────────────┴────────────┐
//!                 │  sigmf-engine           │
//!                 │  (files, sink, source)  │
//!                 └─────────────────────────┘
//! ```
//!
//! ## Example: Building a Segment Store
//!
//! ```rust
//! use sigmf_core::{AnnotationSegment, CaptureSegment, SegmentStore};
//!
//! let mut store = SegmentStore::new();
//! store.upsert_capture(CaptureSegment::at(0));
//! store.upsert_annotation(AnnotationSegment::new(10, Some(5)).with("test:label", "burst"));
//! store.upsert_annotation(AnnotationSegment::new(10, Some(5)).with("test:snr", 12.5));
//! assert_eq!(store.annotations().len(), 1);
//! ```

pub mod convert;
pub mod error;
pub mod filter;
pub mod format;
pub mod keys;
pub mod segments;
pub mod sidecar;
pub mod tag;
pub mod time;
pub mod value;

pub use convert::SampleConverter;
pub use error::{ErrorCategory, MetaError};
pub use filter::{FilterMode, KeyFilter};
pub use format::{Domain, ElementType, Endianness, FormatDescriptor};
pub use segments::{AnnotationSegment, CaptureSegment, SegmentStore};
pub use sidecar::SidecarDocument;
pub use tag::{StreamTag, TagRole, TagValue};
pub use time::{TimeMode, TimeSpec};
pub use value::{MetaMap, MetaValue};
