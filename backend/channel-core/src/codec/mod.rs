//! Event codec: outbound command envelopes and inbound job-event envelopes.
//!
//! Pure functions over bytes, no I/O. The wire format is UTF-8 JSON:
//!
//! - Outbound: `{"project_id": string, "prompt": string}`
//! - Inbound: an object whose `"type"` field selects the variant
//!   (`job_started`, `agent_tool_call`, `job_completed`, `job_failed`,
//!   `job_queued`, `agent_debug`, `error`).
//!
//! Unknown discriminants decode to [`JobEvent::Unknown`] so newer peers
//! degrade gracefully; malformed envelopes yield [`CodecError`].
//!
//! [`CodecError`]: crate::error::CodecError

mod command;
mod event;

pub use command::{OutboundCommand, encode_command};
pub use event::{JobEvent, decode_event, render_value};
