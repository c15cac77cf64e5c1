pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod router;
pub mod session;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod tests;

pub use codec::{JobEvent, OutboundCommand, decode_event, encode_command};
pub use config::{ChannelConfig, Identity};
pub use connection::{ChannelSnapshot, ConnectionManager, ConnectionState, StateChange};
pub use dispatcher::CommandDispatcher;
pub use error::{CodecError, ConfigError, ConnectionError, CoreError, DispatchError, SyncError};
pub use router::{EventRouter, RouteOutcome, RouterStats};
pub use session::JobChannel;
pub use sync::{
    ChatMessage, ChatStore, MemoryChatStore, MemoryProjectStore, MessageDraft, ProjectStore, Sender,
    StateSync,
};
pub use transport::{Connector, WebSocketConnector};

pub const CHANNEL_DEFAULT_HOST: &str = "127.0.0.1";
pub const CHANNEL_DEFAULT_PORT: u16 = 8080;
pub const CHANNEL_DEFAULT_PATH: &str = "/ws";
pub const CHANNEL_DEFAULT_ENDPOINT: &str = const_format::concatcp!(
    "ws://",
    CHANNEL_DEFAULT_HOST,
    ":",
    CHANNEL_DEFAULT_PORT,
    CHANNEL_DEFAULT_PATH
);
/// Query parameter the job peer reads the identity from.
pub const CHANNEL_IDENTITY_PARAM: &str = "user_id";
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
