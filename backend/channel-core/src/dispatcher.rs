//! Command Dispatcher: validates, encodes and writes user prompts.
//!
//! A send is all-or-nothing from the caller's point of view: either the frame
//! was handed to the open transport or an error says why not. Nothing is
//! queued for later delivery.

use crate::codec::{OutboundCommand, encode_command};
use crate::connection::ConnectionManager;
use crate::error::dispatch::DispatchError;

use log::debug;

/// Sends commands on the channel owned by a [`ConnectionManager`].
///
/// This type is `Clone`; clones share the same channel.
#[derive(Clone)]
pub struct CommandDispatcher {
    manager: ConnectionManager,
}

impl CommandDispatcher {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Send `prompt` for `project_id` as one text frame.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidCommand`] - either field is blank
    /// - [`DispatchError::ChannelNotReady`] - the channel is not `Open`
    /// - [`DispatchError::Transport`] - the transport stopped accepting frames
    pub async fn send(&self, project_id: &str, prompt: &str) -> Result<(), DispatchError> {
        let payload = self.encode(project_id, prompt)?;
        self.transmit(payload).await
    }

    /// Validate and encode a prompt without touching the channel.
    pub fn encode(&self, project_id: &str, prompt: &str) -> Result<String, DispatchError> {
        let command = OutboundCommand::new(project_id, prompt)?;
        let payload = encode_command(&command)?;

        debug!(
            "Encoded command for project {} ({} bytes)",
            command.project_id,
            payload.len()
        );
        Ok(payload)
    }

    /// Hand an encoded frame to the open transport.
    pub async fn transmit(&self, payload: String) -> Result<(), DispatchError> {
        self.manager.transmit(payload).await
    }
}
