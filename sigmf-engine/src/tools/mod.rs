//! Offline tools that work on finished recordings.

pub mod crop;
pub mod digest;

pub use crop::{crop, parse_extent, CropExtent, CropRequest};
pub use digest::DigestStatus;
