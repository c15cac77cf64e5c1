pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod sync;

pub use codec::CodecError;
pub use config::ConfigError;
pub use connection::ConnectionError;
pub use dispatch::DispatchError;
pub use sync::SyncError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
