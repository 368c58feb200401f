//! State of the data file behind a recording sink.
//!
//! ```text
//!            open(path)                 close()
//!   Closed ─────────────▶ Open(file) ─────────────▶ Closed
//!                            │  write error              ▲
//!                            └───────────────────────────┘
//!                              (abandoned, stays .temp-*)
//! ```

use log::{info, warn};
use sigmf_core::SidecarDocument;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::storage::{self, RecordingPaths};

/// A data file that is being written under its temporary name
#[derive(Debug)]
pub struct OpenRecording {
    writer: BufWriter<File>,
    temp_path: PathBuf,
    paths: RecordingPaths,
    /// Stream offset of the first sample in this file
    offset_base: u64,
    samples_written: u64,
}

impl OpenRecording {
    fn create(paths: RecordingPaths, offset_base: u64) -> Result<Self> {
        let (file, temp_path) = storage::create_temp_data_file(&paths.data)?;
        Ok(Self {
            writer: BufWriter::new(file),
            temp_path,
            paths,
            offset_base,
            samples_written: 0,
        })
    }

    pub fn paths(&self) -> &RecordingPaths {
        &self.paths
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn offset_base(&self) -> u64 {
        self.offset_base
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn write(&mut self, bytes: &[u8], samples: u64) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.samples_written += samples;
        Ok(())
    }

    /// Where [`RecordingSession::flush`] puts the sidecar while the data
    /// still has its temporary name
    pub fn temp_meta_path(&self) -> PathBuf {
        RecordingPaths::new(&self.temp_path).meta
    }

    /// Flush samples, write the sidecar, then give the data its final name
    fn finish(mut self, doc: &SidecarDocument) -> Result<RecordingPaths> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        storage::write_sidecar(&self.paths.meta, doc)?;
        storage::finalize_data_file(&self.temp_path, &self.paths.data)?;
        storage::remove_if_exists(&self.temp_meta_path())?;
        info!(
            "Closed recording: {} ({} samples)",
            self.paths.data.display(),
            self.samples_written
        );
        Ok(self.paths)
    }
}

#[derive(Debug, Default)]
pub enum RecordingSession {
    #[default]
    Closed,
    Open(OpenRecording),
}

impl RecordingSession {
    /// Create the temporary data file; the session is only changed on success
    pub fn open(&mut self, paths: RecordingPaths, offset_base: u64) -> Result<()> {
        let recording = OpenRecording::create(paths, offset_base)?;
        info!(
            "Opened recording: {} (writing to {})",
            recording.paths.data.display(),
            recording.temp_path.display()
        );
        *self = RecordingSession::Open(recording);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(self, RecordingSession::Open(_))
    }

    pub fn current(&self) -> Option<&OpenRecording> {
        match self {
            RecordingSession::Open(rec) => Some(rec),
            RecordingSession::Closed => None,
        }
    }

    pub fn offset_base(&self) -> Option<u64> {
        self.current().map(OpenRecording::offset_base)
    }

    /// Append samples. A failed write abandons the file under its temporary
    /// name and leaves the session closed.
    pub fn write(&mut self, bytes: &[u8], samples: u64) -> Result<()> {
        let RecordingSession::Open(rec) = self else {
            return Ok(());
        };
        if let Err(e) = rec.write(bytes, samples) {
            warn!(
                "Write to {} failed, abandoning recording: {}",
                rec.temp_path.display(),
                e
            );
            *self = RecordingSession::Closed;
            return Err(e);
        }
        Ok(())
    }

    /// Finish the open file with `doc` as its sidecar. Returns `None` when
    /// nothing was open.
    pub fn close(&mut self, doc: &SidecarDocument) -> Result<Option<RecordingPaths>> {
        match std::mem::take(self) {
            RecordingSession::Closed => Ok(None),
            RecordingSession::Open(rec) => rec.finish(doc).map(Some),
        }
    }

    /// Drop the open file without a sidecar, leaving it under its temporary
    /// name. Returns the temporary path.
    pub fn abandon(&mut self) -> Option<PathBuf> {
        match std::mem::take(self) {
            RecordingSession::Closed => None,
            RecordingSession::Open(rec) => {
                warn!("Abandoned recording left at {}", rec.temp_path.display());
                Some(rec.temp_path)
            }
        }
    }

    /// Write out buffered samples and a snapshot of the sidecar without
    /// closing. The snapshot sits next to the temporary data file and only
    /// takes the final name on close.
    pub fn flush(&mut self, doc: &SidecarDocument) -> Result<()> {
        if let RecordingSession::Open(rec) = self {
            rec.writer.flush()?;
            storage::write_sidecar(&rec.temp_meta_path(), doc)?;
        }
        Ok(())
    }

    /// Swap the writer for a read-only handle so the next write fails
    #[cfg(test)]
    pub(crate) fn make_read_only(&mut self) -> Result<()> {
        if let RecordingSession::Open(rec) = self {
            rec.writer.flush()?;
            rec.writer = BufWriter::new(File::open(&rec.temp_path)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_write_close() {
        let dir = TempDir::new().unwrap();
        let paths = RecordingPaths::new(dir.path().join("rec"));
        let mut session = RecordingSession::default();
        assert!(!session.is_open());

        session.open(paths.clone(), 42).unwrap();
        assert_eq!(session.offset_base(), Some(42));
        let temp = session.current().unwrap().temp_path().to_path_buf();
        session.write(&[1, 2, 3, 4], 1).unwrap();
        assert!(temp.exists());
        assert!(!paths.data.exists());

        let closed = session.close(&SidecarDocument::default()).unwrap();
        assert_eq!(closed, Some(paths.clone()));
        assert!(!session.is_open());
        assert!(!temp.exists());
        assert_eq!(std::fs::read(&paths.data).unwrap(), vec![1, 2, 3, 4]);
        assert!(paths.meta.exists());

        assert_eq!(session.close(&SidecarDocument::default()).unwrap(), None);
    }

    #[test]
    fn test_flush_keeps_temporary_names() {
        let dir = TempDir::new().unwrap();
        let paths = RecordingPaths::new(dir.path().join("rec"));
        let mut session = RecordingSession::default();
        session.open(paths.clone(), 0).unwrap();
        session.write(&[1, 2, 3, 4], 1).unwrap();
        session.flush(&SidecarDocument::default()).unwrap();

        let rec = session.current().unwrap();
        let temp_meta = rec.temp_meta_path();
        assert!(storage::is_temp_name(&temp_meta));
        assert!(temp_meta.exists());
        assert_eq!(std::fs::read(rec.temp_path()).unwrap(), vec![1, 2, 3, 4]);
        assert!(!paths.meta.exists());

        session.close(&SidecarDocument::default()).unwrap();
        assert!(!temp_meta.exists());
        assert!(paths.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_failed_write_closes_session() {
        let dir = TempDir::new().unwrap();
        let mut session = RecordingSession::default();
        session.open(RecordingPaths::new(dir.path().join("rec")), 0).unwrap();
        let temp = session.current().unwrap().temp_path().to_path_buf();
        session.make_read_only().unwrap();
        assert!(session.write(&[0u8; 16 * 1024], 4096).is_err());
        assert!(!session.is_open());
        assert!(temp.exists());
    }

    #[test]
    fn test_failed_open_keeps_state() {
        let dir = TempDir::new().unwrap();
        let mut session = RecordingSession::default();
        let bad = RecordingPaths::new(dir.path().join("nope").join("rec"));
        assert!(session.open(bad, 0).is_err());
        assert!(!session.is_open());
    }
}
