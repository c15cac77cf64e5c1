use crate::error::codec::CodecError;
use crate::error::dispatch::DispatchError;

use common::ErrorLocation;

use std::panic::Location;

use serde::Serialize;

/// A job request for one project. Built per send and dropped after transmission.
///
/// Field declaration order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundCommand {
    pub project_id: String,
    pub prompt: String,
}

impl OutboundCommand {
    /// Build a command, rejecting blank project ids and prompts.
    ///
    /// The peer answers a missing prompt with an `error` envelope; rejecting it
    /// locally keeps that round trip from happening at all.
    #[track_caller]
    pub fn new(
        project_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Result<Self, DispatchError> {
        let project_id = project_id.into();
        let prompt = prompt.into();

        if project_id.trim().is_empty() {
            return Err(DispatchError::InvalidCommand {
                message: "project_id cannot be empty".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if prompt.trim().is_empty() {
            return Err(DispatchError::InvalidCommand {
                message: format!("prompt for project {project_id} cannot be empty"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(Self { project_id, prompt })
    }
}

/// Serialize a command to its JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
#[track_caller]
pub fn encode_command(command: &OutboundCommand) -> Result<String, CodecError> {
    serde_json::to_string(command).map_err(|e| CodecError::Encode {
        message: format!("Failed to encode command for project {}: {e}", command.project_id),
        location: ErrorLocation::from(Location::caller()),
    })
}
