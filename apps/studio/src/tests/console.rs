// Unit tests for console input parsing and event rendering

use crate::console::{
    ConsoleCommand, ParseError, parse_line, render_event, render_message, render_state_change,
};

use channel_core::{ChatMessage, ConnectionState, JobEvent, MessageDraft, Sender, StateChange};

use std::time::SystemTime;

use serde_json::json;

// ============================================
// INPUT PARSING
// ============================================

#[test]
fn given_plain_text_when_parsed_then_is_prompt() {
    assert_eq!(
        parse_line("  draw a red cube  "),
        Ok(Some(ConsoleCommand::Prompt("draw a red cube".to_string())))
    );
}

#[test]
fn given_blank_line_when_parsed_then_is_ignored() {
    assert_eq!(parse_line(""), Ok(None));
    assert_eq!(parse_line("   \t"), Ok(None));
}

#[test]
fn given_slash_commands_when_parsed_then_map_to_commands() {
    assert_eq!(
        parse_line("/project p-42"),
        Ok(Some(ConsoleCommand::Project("p-42".to_string())))
    );
    assert_eq!(
        parse_line("/p   scene two "),
        Ok(Some(ConsoleCommand::Project("scene two".to_string())))
    );
    assert_eq!(parse_line("/history"), Ok(Some(ConsoleCommand::History)));
    assert_eq!(parse_line("/status"), Ok(Some(ConsoleCommand::Status)));
    assert_eq!(parse_line("/reset"), Ok(Some(ConsoleCommand::Reset)));
    assert_eq!(
        parse_line("/clear-preview"),
        Ok(Some(ConsoleCommand::ClearPreview))
    );
    assert_eq!(parse_line("/reconnect"), Ok(Some(ConsoleCommand::Reconnect)));
    assert_eq!(parse_line("/?"), Ok(Some(ConsoleCommand::Help)));
    assert_eq!(parse_line("/quit"), Ok(Some(ConsoleCommand::Quit)));
}

/// **VALUE**: Typos in commands are reported instead of sent as prompts.
///
/// **BUG THIS CATCHES**: `/qiut` going to the agent as a prompt and starting a
/// job the user never meant to run.
#[test]
fn given_bad_commands_when_parsed_then_returns_parse_errors() {
    assert_eq!(
        parse_line("/qiut"),
        Err(ParseError::UnknownCommand("qiut".to_string()))
    );
    assert_eq!(
        parse_line("/project"),
        Err(ParseError::MissingArgument("project id"))
    );
    assert_eq!(
        ParseError::UnknownCommand("qiut".to_string()).to_string(),
        "unknown command /qiut (try /help)"
    );
}

// ============================================
// RENDERING
// ============================================

#[test]
fn given_job_events_when_rendered_then_show_project_and_outcome() {
    let completed = JobEvent::Completed {
        job_id: "j1".to_string(),
        project_id: "p1".to_string(),
        result: "Added a cube".to_string(),
        artifact: Some(vec![0; 128]),
    };
    let failed = JobEvent::Failed {
        job_id: "j2".to_string(),
        project_id: "p1".to_string(),
        error: "timeout".to_string(),
    };
    let tool = JobEvent::ToolCall {
        job_id: "j1".to_string(),
        project_id: "p1".to_string(),
        tool: "add_cube".to_string(),
        input: json!({}),
        output: json!(null),
    };

    assert_eq!(
        render_event(&completed).as_deref(),
        Some("[p1] Added a cube (preview updated, 128 bytes)")
    );
    assert_eq!(
        render_event(&failed).as_deref(),
        Some("[p1] job failed: timeout")
    );
    assert_eq!(
        render_event(&tool).as_deref(),
        Some("[p1] agent used add_cube")
    );
}

#[test]
fn given_background_events_when_rendered_then_are_hidden() {
    let debug = JobEvent::Debug {
        job_id: "j1".to_string(),
        project_id: "p1".to_string(),
        message: "thinking".to_string(),
    };
    let unknown = JobEvent::Unknown {
        kind: "job_progress".to_string(),
        raw: json!({"type": "job_progress"}),
    };

    assert_eq!(render_event(&debug), None);
    assert_eq!(render_event(&unknown), None);
}

#[test]
fn given_state_changes_when_rendered_then_describe_connection() {
    let lost = StateChange {
        previous: ConnectionState::Open,
        current: ConnectionState::Reconnecting,
        reason: Some("connection reset".to_string()),
    };
    let failed = StateChange {
        previous: ConnectionState::Connecting,
        current: ConnectionState::Failed,
        reason: None,
    };
    let idle = StateChange {
        previous: ConnectionState::Closing,
        current: ConnectionState::Idle,
        reason: None,
    };

    assert_eq!(
        render_state_change(&lost),
        "connection lost (connection reset), reconnecting"
    );
    assert!(render_state_change(&failed).contains("/reconnect"));
    assert_eq!(render_state_change(&idle), "idle");
}

#[test]
fn given_chat_message_when_rendered_then_right_aligns_sender() {
    let message = ChatMessage::stamped(
        MessageDraft::new(Sender::Agent, "Result: ok"),
        SystemTime::now(),
    );

    assert_eq!(render_message(&message), " agent: Result: ok");
}
