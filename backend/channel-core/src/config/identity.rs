use std::fmt::{Display, Formatter, Result as FormatResult};

/// Opaque subject id used to address the channel endpoint.
///
/// Supplied by the auth collaborator and immutable for the life of a channel.
/// Blank ids are treated as absent, which keeps the channel `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(subject: impl Into<String>) -> Option<Self> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            None
        } else {
            Some(Self(subject))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter.write_str(&self.0)
    }
}
