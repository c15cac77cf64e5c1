//! In-memory chat and project stores.
//!
//! Used by the studio host and by tests. Both are safe to share behind an
//! `Arc` and read while the channel writes.

use crate::error::sync::SyncError;
use crate::sync::message::{ChatMessage, Sender};
use crate::sync::{ChatStore, ProjectStore};

use common::ErrorLocation;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::{PoisonError, RwLock};

/// One project's conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSession {
    pub messages: Vec<ChatMessage>,
    /// True between a user prompt and the next agent or system message.
    pub loading: bool,
}

#[derive(Debug, Default)]
pub struct MemoryChatStore {
    chats: RwLock<HashMap<String, ChatSession>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, project_id: &str) -> Option<ChatSession> {
        self.chats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .cloned()
    }

    pub fn messages(&self, project_id: &str) -> Vec<ChatMessage> {
        self.session(project_id)
            .map(|session| session.messages)
            .unwrap_or_default()
    }

    pub fn is_loading(&self, project_id: &str) -> bool {
        self.session(project_id)
            .is_some_and(|session| session.loading)
    }

    /// Forget a project's conversation. Returns whether there was one.
    pub fn reset_chat(&self, project_id: &str) -> bool {
        self.chats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(project_id)
            .is_some()
    }
}

impl ChatStore for MemoryChatStore {
    fn append_message(&self, project_id: &str, message: ChatMessage) -> Result<(), SyncError> {
        let mut chats = self.chats.write().map_err(|e| SyncError::Poisoned {
            message: format!("Chat store lock poisoned: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let session = chats.entry(project_id.to_string()).or_default();
        session.loading = message.sender == Sender::User;
        session.messages.push(message);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Preview {
    bytes: Vec<u8>,
    revision: u64,
}

#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    previews: RwLock<HashMap<String, Preview>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preview(&self, project_id: &str) -> Option<Vec<u8>> {
        self.previews
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .map(|preview| preview.bytes.clone())
    }

    /// How many times the project's preview has been written.
    pub fn revision(&self, project_id: &str) -> u64 {
        self.previews
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .map_or(0, |preview| preview.revision)
    }

    /// Drop a project's preview. Returns whether there was one.
    pub fn clear_preview(&self, project_id: &str) -> bool {
        self.previews
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(project_id)
            .is_some()
    }
}

impl ProjectStore for MemoryProjectStore {
    fn set_preview_artifact(&self, project_id: &str, artifact: Vec<u8>) -> Result<(), SyncError> {
        let mut previews = self.previews.write().map_err(|e| SyncError::Poisoned {
            message: format!("Project store lock poisoned: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let revision = previews.get(project_id).map_or(0, |p| p.revision) + 1;
        previews.insert(
            project_id.to_string(),
            Preview {
                bytes: artifact,
                revision,
            },
        );
        Ok(())
    }
}
