use crate::connection::ConnectionState;
use crate::error::codec::CodecError;

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum DispatchError {
    /// Sends are only permitted while the channel is `Open`.
    #[error("Channel Not Ready Error: channel is {state} {location}")]
    ChannelNotReady {
        state: ConnectionState,
        location: ErrorLocation,
    },

    #[error("Invalid Command Error: {message} {location}")]
    InvalidCommand {
        message: String,
        location: ErrorLocation,
    },

    #[error("Command Encode Error: {message} {location}")]
    Encode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Command Transport Error: {message} {location}")]
    Transport {
        message: String,
        location: ErrorLocation,
    },
}

impl From<CodecError> for DispatchError {
    #[track_caller]
    fn from(error: CodecError) -> Self {
        DispatchError::Encode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
