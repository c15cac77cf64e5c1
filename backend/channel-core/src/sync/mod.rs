//! State Sync Facade: the only path by which channel events mutate the
//! external chat and project stores.
//!
//! # Architecture
//!
//! Each project gets its own writer task, spawned lazily on first use:
//! - Operations for one project run strictly in issue order (single writer per key)
//! - Operations for different projects never wait on each other
//! - Store calls run on the blocking pool, so a slow store never stalls the
//!   transport's delivery path
//!
//! The writer also owns the per-project bookkeeping: the last message
//! timestamp (kept non-decreasing) and the arrival sequence of the job whose
//! artifact was last applied (kept monotonic).

mod facade;
mod memory;
mod message;

pub use facade::{PreviewArtifact, StateSync};
pub use memory::{ChatSession, MemoryChatStore, MemoryProjectStore};
pub use message::{ChatMessage, MessageDraft, Sender};

use crate::error::sync::SyncError;

/// Chat history collaborator. Append-only from the channel's point of view.
pub trait ChatStore: Send + Sync + 'static {
    fn append_message(&self, project_id: &str, message: ChatMessage) -> Result<(), SyncError>;
}

/// Project collaborator owning the rendered preview of each project.
pub trait ProjectStore: Send + Sync + 'static {
    fn set_preview_artifact(&self, project_id: &str, artifact: Vec<u8>) -> Result<(), SyncError>;
}
