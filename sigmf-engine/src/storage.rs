//! On-disk layout of a recording.
//!
//! A recording named `capture` is the pair `capture.sigmf-data` and
//! `capture.sigmf-meta` in the same directory. While a recording is being
//! written the data lives under a temporary name:
//!
//! ```text
//! .temp-<16 random alphanumerics>-capture.sigmf-data
//! ```
//!
//! and is only renamed to its final name after the sidecar has been written.
//! Sidecars themselves are written to an anonymous temporary file and
//! persisted over the target, so a reader never sees a half-written one.

use log::debug;
use sigmf_core::SidecarDocument;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

pub const DATA_EXT: &str = "sigmf-data";
pub const META_EXT: &str = "sigmf-meta";
pub const TEMP_PREFIX: &str = ".temp-";

/// Data and sidecar paths of one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingPaths {
    pub data: PathBuf,
    pub meta: PathBuf,
}

impl RecordingPaths {
    /// Derive both paths from a base name or from either file of the pair
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = path.to_string_lossy();
        let base = [".sigmf-data", ".sigmf-meta", ".sigmf"]
            .iter()
            .find_map(|ext| text.strip_suffix(*ext))
            .unwrap_or(&*text)
            .to_string();
        Self {
            data: PathBuf::from(format!("{}.{}", base, DATA_EXT)),
            meta: PathBuf::from(format!("{}.{}", base, META_EXT)),
        }
    }

    pub fn exists(&self) -> bool {
        self.data.exists() && self.meta.exists()
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Whether `path` names an unfinished recording
pub fn is_temp_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(TEMP_PREFIX))
        .unwrap_or(false)
}

/// Create the temporary data file that will become `final_path`.
///
/// The file is created next to its final location so the closing rename
/// never crosses a filesystem.
pub fn create_temp_data_file(final_path: &Path) -> Result<(File, PathBuf)> {
    let name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("No file name in {}", final_path.display()),
            )
        })?;
    let suffix = format!("-{}", name);
    let temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(&suffix)
        .rand_bytes(16)
        .tempfile_in(parent_dir(final_path))?;
    let (file, temp_path) = temp.keep().map_err(|e| e.error)?;
    debug!("Created temporary data file {}", temp_path.display());
    Ok((file, temp_path))
}

/// Move a finished data file to its final name
pub fn finalize_data_file(temp_path: &Path, final_path: &Path) -> Result<()> {
    fs::rename(temp_path, final_path)?;
    debug!("Renamed {} to {}", temp_path.display(), final_path.display());
    Ok(())
}

/// Remove a file that may never have been written
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Atomically replace `meta_path` with `doc`
pub fn write_sidecar(meta_path: &Path, doc: &SidecarDocument) -> Result<()> {
    let mut temp = tempfile::NamedTempFile::new_in(parent_dir(meta_path))?;
    {
        let mut writer = BufWriter::new(&mut temp);
        doc.write_pretty(&mut writer)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(meta_path).map_err(|e| e.error)?;
    debug!("Wrote sidecar {}", meta_path.display());
    Ok(())
}

pub fn read_sidecar(meta_path: &Path) -> Result<SidecarDocument> {
    let bytes = match fs::read(meta_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::MissingFile(meta_path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(SidecarDocument::from_slice(&bytes)?)
}
