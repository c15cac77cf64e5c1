use crate::error::codec::CodecError;

use common::ErrorLocation;

use std::panic::Location;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::trace;
use serde::Deserialize;
use serde_json::Value;

const DISCRIMINANT_FIELD: &str = "type";

/// Discriminants this codec understands. Anything else is `Unknown`.
const KNOWN_KINDS: [&str; 7] = [
    "job_started",
    "agent_tool_call",
    "job_completed",
    "job_failed",
    "job_queued",
    "agent_debug",
    "error",
];

/// A decoded inbound event. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started {
        job_id: String,
        project_id: String,
    },
    ToolCall {
        job_id: String,
        project_id: String,
        tool: String,
        input: Value,
        output: Value,
    },
    Completed {
        job_id: String,
        project_id: String,
        result: String,
        /// Decoded artifact bytes; `None` when the peer exported nothing.
        artifact: Option<Vec<u8>>,
    },
    Failed {
        job_id: String,
        project_id: String,
        error: String,
    },
    /// The peer accepted the command and queued it. Carries no project.
    Queued {
        job_id: String,
        position: Option<u64>,
        estimated_wait: Option<u64>,
    },
    Debug {
        job_id: String,
        project_id: String,
        message: String,
    },
    /// The peer rejected a command (bad JSON, missing prompt, ...).
    PeerError {
        message: String,
    },
    Unknown {
        kind: String,
        raw: Value,
    },
}

impl JobEvent {
    /// Wire discriminant of this event.
    pub fn kind(&self) -> &str {
        match self {
            JobEvent::Started { .. } => "job_started",
            JobEvent::ToolCall { .. } => "agent_tool_call",
            JobEvent::Completed { .. } => "job_completed",
            JobEvent::Failed { .. } => "job_failed",
            JobEvent::Queued { .. } => "job_queued",
            JobEvent::Debug { .. } => "agent_debug",
            JobEvent::PeerError { .. } => "error",
            JobEvent::Unknown { kind, .. } => kind,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::ToolCall { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Queued { job_id, .. }
            | JobEvent::Debug { job_id, .. } => Some(job_id),
            JobEvent::PeerError { .. } | JobEvent::Unknown { .. } => None,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        match self {
            JobEvent::Started { project_id, .. }
            | JobEvent::ToolCall { project_id, .. }
            | JobEvent::Completed { project_id, .. }
            | JobEvent::Failed { project_id, .. }
            | JobEvent::Debug { project_id, .. } => Some(project_id),
            JobEvent::Queued { .. } | JobEvent::PeerError { .. } | JobEvent::Unknown { .. } => {
                None
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    JobStarted {
        job_id: String,
        project_id: String,
    },
    AgentToolCall {
        job_id: String,
        project_id: String,
        tool: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        output: Value,
    },
    JobCompleted {
        job_id: String,
        project_id: String,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        base64data: Option<String>,
    },
    JobFailed {
        job_id: String,
        project_id: String,
        error: String,
    },
    JobQueued {
        job_id: String,
        #[serde(default)]
        position: Option<u64>,
        #[serde(default)]
        estimated_wait: Option<u64>,
    },
    AgentDebug {
        job_id: String,
        project_id: String,
        #[serde(default)]
        message: Value,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

/// Decode one inbound frame.
///
/// # Errors
///
/// - [`CodecError::Malformed`] - not JSON, or not a JSON object
/// - [`CodecError::MissingDiscriminant`] - no string `"type"` field
/// - [`CodecError::InvalidField`] - known type with missing or mistyped fields
/// - [`CodecError::Artifact`] - `base64data` is not standard base64
#[track_caller]
pub fn decode_event(bytes: &[u8]) -> Result<JobEvent, CodecError> {
    let value: Value = serde_json::from_slice(bytes)?;

    let Some(object) = value.as_object() else {
        return Err(CodecError::Malformed {
            message: "envelope is not a JSON object".to_string(),
            location: ErrorLocation::from(Location::caller()),
        });
    };

    let Some(kind) = object.get(DISCRIMINANT_FIELD).and_then(Value::as_str) else {
        return Err(CodecError::MissingDiscriminant {
            message: format!("envelope has no string \"{DISCRIMINANT_FIELD}\" field"),
            location: ErrorLocation::from(Location::caller()),
        });
    };

    if !KNOWN_KINDS.contains(&kind) {
        trace!("Decoded unknown event type {kind}");
        return Ok(JobEvent::Unknown {
            kind: kind.to_string(),
            raw: value,
        });
    }

    let kind = kind.to_string();
    let wire: WireEvent =
        serde_json::from_value(value).map_err(|e| CodecError::InvalidField {
            kind: kind.clone(),
            message: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let event = match wire {
        WireEvent::JobStarted { job_id, project_id } => JobEvent::Started { job_id, project_id },
        WireEvent::AgentToolCall {
            job_id,
            project_id,
            tool,
            input,
            output,
        } => JobEvent::ToolCall {
            job_id,
            project_id,
            tool,
            input,
            output,
        },
        WireEvent::JobCompleted {
            job_id,
            project_id,
            result,
            base64data,
        } => {
            let artifact = decode_artifact(&job_id, base64data.as_deref())?;
            JobEvent::Completed {
                job_id,
                project_id,
                result: render_value(&result),
                artifact,
            }
        }
        WireEvent::JobFailed {
            job_id,
            project_id,
            error,
        } => JobEvent::Failed {
            job_id,
            project_id,
            error,
        },
        WireEvent::JobQueued {
            job_id,
            position,
            estimated_wait,
        } => JobEvent::Queued {
            job_id,
            position,
            estimated_wait,
        },
        WireEvent::AgentDebug {
            job_id,
            project_id,
            message,
        } => JobEvent::Debug {
            job_id,
            project_id,
            message: render_value(&message),
        },
        WireEvent::Error { message } => JobEvent::PeerError { message },
    };

    Ok(event)
}

/// Render a free-form payload value as chat text.
///
/// Strings are used as-is; every other value is rendered as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[track_caller]
fn decode_artifact(job_id: &str, encoded: Option<&str>) -> Result<Option<Vec<u8>>, CodecError> {
    let Some(encoded) = encoded.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    BASE64
        .decode(encoded)
        .map(Some)
        .map_err(|e| CodecError::Artifact {
            job_id: job_id.to_string(),
            message: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
}
