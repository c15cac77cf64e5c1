//! Line-oriented console: parses what the user types and renders what the
//! channel reports.

use channel_core::{ChatMessage, ConnectionState, JobEvent, StateChange};

use std::fmt::{Display, Formatter, Result as FormatResult};

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Send a prompt to the current project.
    Prompt(String),
    /// Switch the current project.
    Project(String),
    /// Print the current project's conversation.
    History,
    /// Print the channel state.
    Status,
    /// Forget the current project's conversation.
    Reset,
    /// Drop the current project's preview.
    ClearPreview,
    /// Reconnect after the channel gave up or was closed.
    Reconnect,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnknownCommand(String),
    MissingArgument(&'static str),
}

impl Display for ParseError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        match self {
            ParseError::UnknownCommand(name) => {
                write!(formatter, "unknown command /{name} (try /help)")
            }
            ParseError::MissingArgument(what) => write!(formatter, "missing {what}"),
        }
    }
}

pub const HELP: &str = "\
Type a prompt and press enter to send it to the current project.
  /project <id>   switch project
  /history        show the conversation
  /status         show the connection state
  /reset          forget this project's conversation
  /clear-preview  drop this project's preview
  /reconnect      reopen the channel
  /help           show this help
  /quit           close the channel and exit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(ConsoleCommand::Prompt(line.to_string())));
    };

    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "project" | "p" => {
            if argument.is_empty() {
                return Err(ParseError::MissingArgument("project id"));
            }
            ConsoleCommand::Project(argument.to_string())
        }
        "history" => ConsoleCommand::History,
        "status" => ConsoleCommand::Status,
        "reset" => ConsoleCommand::Reset,
        "clear-preview" => ConsoleCommand::ClearPreview,
        "reconnect" => ConsoleCommand::Reconnect,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };

    Ok(Some(command))
}

/// Render an event as a console line, or `None` for events not worth showing.
pub fn render_event(event: &JobEvent) -> Option<String> {
    let line = match event {
        JobEvent::Started { job_id, project_id } => {
            format!("[{project_id}] job {job_id} started")
        }
        JobEvent::ToolCall {
            project_id, tool, ..
        } => format!("[{project_id}] agent used {tool}"),
        JobEvent::Completed {
            project_id,
            result,
            artifact,
            ..
        } => match artifact {
            Some(bytes) => format!("[{project_id}] {result} (preview updated, {} bytes)", bytes.len()),
            None => format!("[{project_id}] {result}"),
        },
        JobEvent::Failed {
            project_id, error, ..
        } => format!("[{project_id}] job failed: {error}"),
        JobEvent::Queued {
            job_id,
            position: Some(position),
            ..
        } => format!("job {job_id} queued at position {position}"),
        JobEvent::PeerError { message } => format!("server rejected the prompt: {message}"),
        JobEvent::Queued { .. } | JobEvent::Debug { .. } | JobEvent::Unknown { .. } => {
            return None;
        }
    };

    Some(line)
}

/// Render a state transition for the user.
pub fn render_state_change(change: &StateChange) -> String {
    match change.current {
        ConnectionState::Open => "connected".to_string(),
        ConnectionState::Reconnecting => match &change.reason {
            Some(reason) => format!("connection lost ({reason}), reconnecting"),
            None => "connection lost, reconnecting".to_string(),
        },
        ConnectionState::Failed => {
            "could not reach the server; type /reconnect to try again".to_string()
        }
        other => other.to_string(),
    }
}

pub fn render_message(message: &ChatMessage) -> String {
    format!("{:>6}: {}", message.sender.to_string(), message.content)
}
