use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Failures while turning frames into events or commands into frames.
///
/// Inbound failures are contained by the channel: the frame is logged and
/// discarded and the connection stays usable.
#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("Malformed Envelope Error: {message} {location}")]
    Malformed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Missing Discriminant Error: {message} {location}")]
    MissingDiscriminant {
        message: String,
        location: ErrorLocation,
    },

    #[error("Invalid Field Error: {kind}: {message} {location}")]
    InvalidField {
        kind: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Artifact Encoding Error: job {job_id}: {message} {location}")]
    Artifact {
        job_id: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Encode Error: {message} {location}")]
    Encode {
        message: String,
        location: ErrorLocation,
    },
}

impl From<serde_json::Error> for CodecError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        CodecError::Malformed {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
