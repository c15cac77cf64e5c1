use studio::console::{
    ConsoleCommand, HELP, parse_line, render_event, render_message, render_state_change,
};
use studio::error::StudioError;
use studio::logger::initialize as LoggerInitialize;
use studio::settings::{ENV_IDENTITY, Settings};

use channel_core::{JobChannel, MemoryChatStore, MemoryProjectStore};

use common::ErrorLocation;

use std::fs::create_dir_all;
use std::panic::Location;
use std::process::ExitCode;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader, stdin};
use tokio::spawn as TokioSpawn;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StudioError> {
    // Must run before settings are read so .env values are visible.
    let dotenv = dotenvy::dotenv();
    let settings = Settings::from_env()?;

    create_dir_all(&settings.log_dir).map_err(|e| StudioError::Studio {
        message: format!("Failed to create log directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Initialize logger FIRST
    LoggerInitialize(&settings.log_dir, settings.log_level)?;

    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) => debug!("No .env file loaded: {e}"),
    }
    info!("Studio console starting");

    let config = settings.channel_config()?;
    info!("Job channel endpoint: {}", config.endpoint);

    let chat = Arc::new(MemoryChatStore::new());
    let projects = Arc::new(MemoryProjectStore::new());
    let channel = JobChannel::websocket(config, chat.clone(), projects.clone());
    spawn_printers(&channel);

    if settings.identity.is_none() {
        warn!("{ENV_IDENTITY} is not set; the job channel stays offline");
    }
    channel
        .open(settings.identity.clone())
        .map_err(|e| StudioError::Channel {
            message: format!("Failed to open job channel: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    println!("{HELP}");
    let mut project_id = settings.project_id.clone();
    println!("current project: {project_id}");

    let mut lines = BufReader::new(stdin()).lines();
    while let Some(line) = lines.next_line().await.map_err(|e| StudioError::Studio {
        message: format!("Failed to read stdin: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })? {
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            ConsoleCommand::Prompt(prompt) => {
                if let Err(e) = channel.send(&project_id, &prompt).await {
                    warn!("Prompt for project {project_id} not sent: {e}");
                    println!("not sent, channel is {}", channel.state());
                }
            }
            ConsoleCommand::Project(next) => {
                project_id = next;
                println!("current project: {project_id}");
            }
            ConsoleCommand::History => {
                for message in chat.messages(&project_id) {
                    println!("{}", render_message(&message));
                }
            }
            ConsoleCommand::Status => {
                let snapshot = channel.snapshot();
                println!(
                    "channel {} (retries {}), project {project_id}, preview revision {}",
                    snapshot.state,
                    snapshot.reconnect.attempt_count,
                    projects.revision(&project_id)
                );
                if let Some(e) = channel.terminal_error() {
                    println!("{e}");
                }
            }
            ConsoleCommand::Reset => {
                chat.reset_chat(&project_id);
                println!("conversation for {project_id} cleared");
            }
            ConsoleCommand::ClearPreview => {
                projects.clear_preview(&project_id);
                println!("preview for {project_id} cleared");
            }
            ConsoleCommand::Reconnect => {
                channel.close().await.map_err(|e| StudioError::Channel {
                    message: format!("Failed to close job channel: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                })?;
                channel
                    .open(settings.identity.clone())
                    .map_err(|e| StudioError::Channel {
                        message: format!("Failed to reopen job channel: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    })?;
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => break,
        }
    }

    channel.close().await.map_err(|e| StudioError::Channel {
        message: format!("Failed to close job channel: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;
    info!("Studio console exiting");

    Ok(())
}

/// Print connection changes and job events as they happen.
fn spawn_printers(channel: &JobChannel) {
    let mut changes = channel.on_state_change();
    TokioSpawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => println!("* {}", render_state_change(&change)),
                Err(RecvError::Lagged(missed)) => debug!("Missed {missed} state changes"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut events = channel.on_event();
    TokioSpawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = render_event(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(missed)) => debug!("Missed {missed} job events"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
