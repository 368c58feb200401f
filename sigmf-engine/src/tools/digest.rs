//! SHA-512 checksum of a recording's data file, kept in `core:sha512`.

use log::{debug, info};
use sha2::{Digest, Sha512};
use sigmf_core::{keys, MetaValue};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::storage::{self, RecordingPaths};

const BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestStatus {
    /// The sidecar carries no checksum
    Missing,
    Match,
    Mismatch { stored: String, computed: String },
}

impl std::fmt::Display for DigestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestStatus::Missing => write!(f, "no checksum stored"),
            DigestStatus::Match => write!(f, "checksum matches"),
            DigestStatus::Mismatch { stored, computed } => {
                write!(f, "checksum mismatch: stored {} computed {}", stored, computed)
            }
        }
    }
}

/// Lowercase hex SHA-512 of the file at `path`
pub fn compute(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => EngineError::MissingFile(path.to_path_buf()),
        _ => e.into(),
    })?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let mut hex = String::with_capacity(128);
    for byte in hasher.finalize() {
        let _ = write!(hex, "{:02x}", byte);
    }
    debug!("{}: sha512 {}", path.display(), hex);
    Ok(hex)
}

/// Compare the stored checksum against the data file
pub fn check(recording: impl AsRef<Path>) -> Result<DigestStatus> {
    let paths = RecordingPaths::new(recording);
    let doc = storage::read_sidecar(&paths.meta)?;
    let Some(stored) = doc.global.get(keys::SHA512).and_then(MetaValue::as_str) else {
        return Ok(DigestStatus::Missing);
    };
    let computed = compute(&paths.data)?;
    if stored.eq_ignore_ascii_case(&computed) {
        Ok(DigestStatus::Match)
    } else {
        Ok(DigestStatus::Mismatch {
            stored: stored.to_string(),
            computed,
        })
    }
}

/// Recompute the checksum and store it in the sidecar
pub fn update(recording: impl AsRef<Path>) -> Result<String> {
    let paths = RecordingPaths::new(recording);
    let mut doc = storage::read_sidecar(&paths.meta)?;
    let computed = compute(&paths.data)?;
    doc.global
        .insert(keys::SHA512.to_string(), MetaValue::String(computed.clone()));
    storage::write_sidecar(&paths.meta, &doc)?;
    info!("Updated {} in {}", keys::SHA512, paths.meta.display());
    Ok(computed)
}
