//! Control messages for a recording sink.
//!
//! Messages are JSON objects with a `command` field:
//!
//! ```json
//! {"command": "open", "filename": "/data/capture"}
//! {"command": "set_global_meta", "key": "core:author", "val": "ops"}
//! {"command": "set_capture_meta", "index": 0, "key": "core:frequency", "val": 915e6}
//! {"command": "set_annotation_meta", "sample_start": 10, "sample_count": 5, "key": "test:x", "val": 1}
//! {"command": "close"}
//! ```

use crossbeam::channel::{Sender, TrySendError};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{EngineError, Result};

/// Which capture segment a `set_capture_meta` applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    Index(usize),
    SampleStart(u64),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SinkCommand {
    Open {
        filename: PathBuf,
    },
    Close,
    Flush,
    SetGlobalMeta {
        key: String,
        val: serde_json::Value,
    },
    SetCaptureMeta {
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        sample_start: Option<u64>,
        key: String,
        val: serde_json::Value,
    },
    SetAnnotationMeta {
        sample_start: u64,
        #[serde(default)]
        sample_count: Option<u64>,
        key: String,
        val: serde_json::Value,
    },
    Gps {
        latitude: f64,
        longitude: f64,
    },
}

impl SinkCommand {
    pub fn from_message(message: &serde_json::Value) -> Result<Self> {
        let command: SinkCommand = serde_json::from_value(message.clone())
            .map_err(|e| EngineError::InvalidCommand(format!("{}: {}", message, e)))?;
        if let SinkCommand::SetCaptureMeta {
            index: None,
            sample_start: None,
            ..
        } = command
        {
            return Err(EngineError::InvalidCommand(
                "set_capture_meta needs index or sample_start".to_string(),
            ));
        }
        Ok(command)
    }
}

/// Cloneable sender used by other threads to control a sink.
///
/// Commands are applied at the start of the sink's next `work` call, or on
/// an explicit `process_commands`.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: Sender<SinkCommand>,
}

impl SinkHandle {
    pub(crate) fn new(tx: Sender<SinkCommand>) -> Self {
        Self { tx }
    }

    pub fn send(&self, command: SinkCommand) -> Result<()> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => EngineError::ChannelFull,
            TrySendError::Disconnected(_) => {
                EngineError::InvalidCommand("sink has been dropped".to_string())
            }
        })
    }

    pub fn send_message(&self, message: &serde_json::Value) -> Result<()> {
        self.send(SinkCommand::from_message(message)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;
    use serde_json::json;

    #[test]
    fn test_parse_messages() {
        assert_eq!(
            SinkCommand::from_message(&json!({"command": "open", "filename": "a/b"})).unwrap(),
            SinkCommand::Open {
                filename: PathBuf::from("a/b")
            }
        );
        assert_eq!(
            SinkCommand::from_message(&json!({"command": "close"})).unwrap(),
            SinkCommand::Close
        );
        let cmd = SinkCommand::from_message(&json!({
            "command": "set_annotation_meta",
            "sample_start": 4,
            "key": "test:a",
            "val": [1, 2]
        }))
        .unwrap();
        assert!(matches!(
            cmd,
            SinkCommand::SetAnnotationMeta {
                sample_start: 4,
                sample_count: None,
                ..
            }
        ));
    }

    #[test]
    fn test_reject_bad_messages() {
        assert!(SinkCommand::from_message(&json!({"command": "explode"})).is_err());
        assert!(SinkCommand::from_message(&json!({"filename": "x"})).is_err());
        assert!(SinkCommand::from_message(
            &json!({"command": "set_capture_meta", "key": "a:b", "val": 1})
        )
        .is_err());
    }

    #[test]
    fn test_handle_full() {
        let (tx, _rx) = bounded(1);
        let handle = SinkHandle::new(tx);
        handle.send(SinkCommand::Close).unwrap();
        assert!(matches!(
            handle.send(SinkCommand::Close),
            Err(EngineError::ChannelFull)
        ));
    }
}
