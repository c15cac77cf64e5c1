//! Connection Manager: owns the transport, the lifecycle state machine and
//! the reconnect policy.
//!
//! # Architecture
//!
//! - [`ChannelMachine`] is the transition table as a pure value: triggers in,
//!   effects out. No clocks, no I/O.
//! - [`ConnectionManager`] is a cloneable handle to a single actor task that
//!   owns the machine, the live transport, and the one pending reconnect
//!   timer. Every input (host calls, transport signals, timer expiry) is
//!   serialized through the actor's command channel, so only one transition
//!   is ever in flight.
//! - Transport signals and timer expiries carry a generation/timer id; the
//!   actor drops any that belong to a connection or timer it has already
//!   released. This is what makes a torn-down connect attempt's eventual
//!   open or error a no-op.

mod machine;
mod manager;
mod policy;
mod state;

pub use machine::{ChannelMachine, Effect, Trigger};
pub use manager::ConnectionManager;
pub use policy::ReconnectPolicy;
pub use state::{ChannelSnapshot, ConnectionState, ReconnectState, StateChange};
