use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SyncError {
    /// Raised by a chat or project store implementation.
    #[error("Store Error: {message} {location}")]
    Store {
        message: String,
        location: ErrorLocation,
    },

    #[error("Store Lock Poisoned Error: {message} {location}")]
    Poisoned {
        message: String,
        location: ErrorLocation,
    },

    #[error("Sync Worker Error: project {project_id}: {message} {location}")]
    WorkerGone {
        project_id: String,
        message: String,
        location: ErrorLocation,
    },
}
