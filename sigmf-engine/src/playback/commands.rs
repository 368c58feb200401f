//! Control messages for a playback source.

use crossbeam::channel::{Sender, TrySendError};
use serde::Deserialize;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SourceCommand {
    /// Replace the key of the tag emitted at the start of every pass; `null`
    /// turns it off
    SetBeginTag {
        #[serde(default)]
        tag: Option<String>,
    },
}

impl SourceCommand {
    pub fn from_message(message: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(message.clone())
            .map_err(|e| EngineError::InvalidCommand(format!("{}: {}", message, e)))
    }
}

#[derive(Debug, Clone)]
pub struct SourceHandle {
    tx: Sender<SourceCommand>,
}

impl SourceHandle {
    pub(crate) fn new(tx: Sender<SourceCommand>) -> Self {
        Self { tx }
    }

    pub fn send(&self, command: SourceCommand) -> Result<()> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => EngineError::ChannelFull,
            TrySendError::Disconnected(_) => {
                EngineError::InvalidCommand("source has been dropped".to_string())
            }
        })
    }

    pub fn send_message(&self, message: &serde_json::Value) -> Result<()> {
        self.send(SourceCommand::from_message(message)?)
    }
}
