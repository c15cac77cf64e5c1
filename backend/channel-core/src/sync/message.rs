use std::fmt::{Display, Formatter, Result as FormatResult};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Agent,
    System,
}

impl Display for Sender {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter.write_str(match self {
            Sender::User => "user",
            Sender::Agent => "agent",
            Sender::System => "system",
        })
    }
}

/// A message as produced by the router, before the facade stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub sender: Sender,
    pub content: String,
    pub job_id: Option<String>,
}

impl MessageDraft {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            job_id: None,
        }
    }

    pub fn for_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// A chat entry as handed to the chat store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub content: String,
    /// Local clock at append time, never earlier than the project's previous message.
    pub timestamp: SystemTime,
    pub job_id: Option<String>,
}

impl ChatMessage {
    pub fn stamped(draft: MessageDraft, timestamp: SystemTime) -> Self {
        Self {
            sender: draft.sender,
            content: draft.content,
            timestamp,
            job_id: draft.job_id,
        }
    }
}
