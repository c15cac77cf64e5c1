use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;
use tokio_tungstenite::tungstenite::Error as WsError;

#[derive(Debug, ThisError)]
pub enum ConnectionError {
    /// Connect, read or write failure on the underlying connection.
    #[error("Transport Error: {message} {location}")]
    Transport {
        message: String,
        location: ErrorLocation,
    },

    #[error("Connect Timeout Error: {message} {location}")]
    Timeout {
        message: String,
        location: ErrorLocation,
    },

    /// Terminal: the reconnect budget is exhausted.
    #[error("Channel Failed Error: gave up after {attempts} reconnect attempts {location}")]
    ChannelFailed {
        attempts: u32,
        location: ErrorLocation,
    },

    #[error("Connection Actor Error: {message} {location}")]
    ActorGone {
        message: String,
        location: ErrorLocation,
    },
}

impl From<WsError> for ConnectionError {
    #[track_caller]
    fn from(error: WsError) -> Self {
        ConnectionError::Transport {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
