use std::fmt::{Display, Formatter, Result as FormatResult};
use std::time::Duration;

use tokio::time::Instant;

/// Lifecycle state of the logical channel. Exactly one per channel.
///
/// Sends are permitted if and only if the state is [`ConnectionState::Open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Reconnecting,
    /// Terminal: the reconnect budget is exhausted.
    Failed,
}

impl ConnectionState {
    pub fn accepts_sends(self) -> bool {
        self == ConnectionState::Open
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter.write_str(self.as_str())
    }
}

/// Reconnect bookkeeping. Reset to zero on every successful open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconnectState {
    /// Number of retries scheduled since the last successful open.
    pub attempt_count: u32,
    /// Delay of the pending retry, if one is scheduled.
    pub scheduled_delay: Option<Duration>,
}

/// Point-in-time view of the channel, published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSnapshot {
    pub state: ConnectionState,
    pub reconnect: ReconnectState,
    /// When the pending retry fires.
    pub reconnect_deadline: Option<Instant>,
}

/// Advisory notification of a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub previous: ConnectionState,
    pub current: ConnectionState,
    /// Why the transition happened (transport error text, teardown, ...).
    pub reason: Option<String>,
}
