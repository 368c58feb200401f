//! Background recorder task - feeds sample chunks from a channel into a sink.

use log::{debug, error, info};
use sigmf_core::StreamTag;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::sink::SigmfSink;

/// Samples plus the tags that fall inside them
#[derive(Debug, Clone, Default)]
pub struct SampleChunk {
    pub samples: Vec<u8>,
    pub tags: Vec<StreamTag>,
}

/// Recording status information
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    /// Current state
    pub state: String,
    /// Data file being written (if any)
    pub filename: Option<String>,
    /// Samples consumed so far
    pub samples: u64,
    /// Chunks consumed so far
    pub chunks: u64,
}

/// Active recording handle
pub struct ActiveRecording {
    stop_flag: Arc<AtomicBool>,
    sink: Arc<SigmfSink>,
    chunks: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl ActiveRecording {
    /// Signal the recording to stop
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Check if recording is still running
    pub fn is_running(&self) -> bool {
        !self.stop_flag.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> RecordingStatus {
        let filename = self
            .sink
            .current_paths()
            .map(|p| p.data.display().to_string());
        RecordingStatus {
            state: if self.is_running() { "recording" } else { "idle" }.to_string(),
            filename,
            samples: self.sink.items_consumed(),
            chunks: self.chunks.load(Ordering::Relaxed),
        }
    }

    /// Wait until the task has closed the sink
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            error!("Recording task panicked: {}", e);
        }
    }
}

/// Start feeding `chunks` into `sink` in the background. The task ends and
/// the sink is closed when the channel closes or [`ActiveRecording::stop`]
/// is called.
pub fn start_recording(
    sink: Arc<SigmfSink>,
    chunks_rx: mpsc::Receiver<SampleChunk>,
) -> ActiveRecording {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let chunks = Arc::new(AtomicU64::new(0));

    let task = tokio::spawn(recording_task(
        sink.clone(),
        chunks_rx,
        stop_flag.clone(),
        chunks.clone(),
    ));

    ActiveRecording {
        stop_flag,
        sink,
        chunks,
        task,
    }
}

/// Recording task that runs in the background
async fn recording_task(
    sink: Arc<SigmfSink>,
    mut chunks_rx: mpsc::Receiver<SampleChunk>,
    stop_flag: Arc<AtomicBool>,
    chunks: Arc<AtomicU64>,
) {
    debug!("Recording task started");

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            debug!("Recording stop flag detected");
            break;
        }

        // Use a timeout to periodically check the stop flag
        let result = tokio::time::timeout(Duration::from_millis(100), chunks_rx.recv()).await;

        match result {
            Ok(Some(chunk)) => {
                if let Err(e) = sink.work(&chunk.samples, &chunk.tags) {
                    error!("Failed to record chunk: {}", e);
                    break;
                }
                chunks.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                info!("Sample channel closed");
                break;
            }
            Err(_) => {
                // Timeout - apply queued commands and check the stop flag
                sink.process_commands();
            }
        }
    }

    match sink.stop() {
        Ok(()) => info!(
            "Recording finished: {} chunks, {} samples",
            chunks.load(Ordering::Relaxed),
            sink.items_consumed()
        ),
        Err(e) => error!("Failed to finish recording: {}", e),
    }

    // Mark as stopped
    stop_flag.store(true, Ordering::SeqCst);
}
