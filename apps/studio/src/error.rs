use common::ErrorLocation;

use thiserror::Error;

/// Errors surfaced by the studio console host.
///
/// Channel-level failures are carried as text; the structured error stays in
/// the log where it was raised.
#[derive(Debug, Error)]
pub enum StudioError {
    /// Error from this App
    #[error("Studio Error: {message} {location}")]
    Studio {
        message: String,
        location: ErrorLocation,
    },

    /// Settings or channel config could not be resolved
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },

    /// Error from channel-core (open, close, send)
    #[error("Channel Error: {message} {location}")]
    Channel {
        message: String,
        location: ErrorLocation,
    },
}
