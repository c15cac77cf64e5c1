use crate::connection::policy::ReconnectPolicy;
use crate::connection::state::{ConnectionState, ReconnectState};

use std::time::Duration;

/// Inputs to the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    IdentityAvailable,
    TransportOpened,
    TransportFailed,
    TransportClosed { clean: bool },
    BackoffElapsed,
    /// Explicit teardown requested by the host.
    Teardown,
    /// The transport released during teardown is gone.
    Released,
}

/// Work the driver must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    OpenTransport,
    CloseTransport,
    /// Replaces any pending reconnect timer.
    ScheduleReconnect { attempt: u32, delay: Duration },
    CancelReconnect,
    SurfaceFailure { attempts: u32 },
}

/// The channel lifecycle as a pure transition table.
///
/// | State | Trigger | Next |
/// |---|---|---|
/// | Idle | identity available | Connecting |
/// | Connecting | transport opened | Open (attempts reset) |
/// | Connecting | transport failed/closed | Reconnecting, or Failed when the budget is spent |
/// | Open | clean close | Idle |
/// | Open | unclean close or error | Reconnecting, or Failed when the budget is spent |
/// | Reconnecting | backoff elapsed | Connecting |
/// | Open, Connecting | teardown | Closing, then Idle on release |
/// | any other | teardown | Idle |
///
/// Every other pair is a no-op, which is how duplicate close/error signals
/// from one transport and late signals from a released transport are absorbed.
#[derive(Debug)]
pub struct ChannelMachine {
    state: ConnectionState,
    reconnect: ReconnectState,
    policy: ReconnectPolicy,
}

impl ChannelMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            reconnect: ReconnectState::default(),
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect(&self) -> ReconnectState {
        self.reconnect
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts()
    }

    /// Apply one trigger and return the effects the driver must carry out, in order.
    pub fn handle(&mut self, trigger: Trigger) -> Vec<Effect> {
        use ConnectionState::{Closing, Connecting, Idle, Open, Reconnecting};

        match (self.state, trigger) {
            (_, Trigger::Teardown) => self.teardown(),
            (Idle, Trigger::IdentityAvailable) => {
                self.state = Connecting;
                vec![Effect::OpenTransport]
            }
            (Connecting, Trigger::TransportOpened) => {
                self.state = Open;
                self.reset_reconnect();
                Vec::new()
            }
            (Connecting, Trigger::TransportFailed | Trigger::TransportClosed { .. }) => {
                self.schedule_retry()
            }
            (Open, Trigger::TransportClosed { clean: true }) => {
                self.state = Idle;
                Vec::new()
            }
            (Open, Trigger::TransportClosed { clean: false } | Trigger::TransportFailed) => {
                self.schedule_retry()
            }
            (Reconnecting, Trigger::BackoffElapsed) => {
                self.state = Connecting;
                self.reconnect.scheduled_delay = None;
                vec![Effect::OpenTransport]
            }
            (Closing, Trigger::Released) => {
                self.state = Idle;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn schedule_retry(&mut self) -> Vec<Effect> {
        if self.reconnect.attempt_count >= self.policy.max_attempts() {
            return self.fail();
        }

        let Some(delay) = self.policy.next_delay() else {
            return self.fail();
        };

        self.reconnect.attempt_count += 1;
        self.reconnect.scheduled_delay = Some(delay);
        self.state = ConnectionState::Reconnecting;

        vec![Effect::ScheduleReconnect {
            attempt: self.reconnect.attempt_count,
            delay,
        }]
    }

    fn fail(&mut self) -> Vec<Effect> {
        self.state = ConnectionState::Failed;
        self.reconnect.scheduled_delay = None;

        vec![
            Effect::CancelReconnect,
            Effect::SurfaceFailure {
                attempts: self.reconnect.attempt_count,
            },
        ]
    }

    fn teardown(&mut self) -> Vec<Effect> {
        self.state = match self.state {
            ConnectionState::Open | ConnectionState::Connecting => ConnectionState::Closing,
            _ => ConnectionState::Idle,
        };
        self.reset_reconnect();

        vec![Effect::CancelReconnect, Effect::CloseTransport]
    }

    fn reset_reconnect(&mut self) {
        self.reconnect = ReconnectState::default();
        self.policy.reset();
    }
}
