//! Test helpers for channel integration tests.
//!
//! This module provides a scripted WebSocket job peer:
//! - Binding to an ephemeral localhost port
//! - Accepting a connection and recording the request URI
//! - Sending job-event envelopes and reading command frames

use channel_core::{ChannelConfig, JobChannel, MemoryChatStore, MemoryProjectStore};

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, sleep as TokioSleep, timeout as TokioTimeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

/// Test constants
pub const TEST_IDENTITY: &str = "alice";
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Mock job peer listening on localhost.
pub struct MockPeer {
    listener: TcpListener,
    pub endpoint: String,
}

/// One accepted client connection.
pub struct PeerConnection {
    pub socket: WebSocketStream<TcpStream>,
    pub request_uri: String,
}

impl MockPeer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock peer");
        let port = listener.local_addr().unwrap().port();
        Self {
            listener,
            endpoint: format!("ws://127.0.0.1:{port}/ws"),
        }
    }

    /// Test helper: accept the next client and complete the WebSocket handshake.
    pub async fn accept(&self) -> PeerConnection {
        TokioTimeout(ACCEPT_TIMEOUT, self.accept_inner())
            .await
            .expect("No client connected to mock peer")
    }

    /// Test helper: true if a client connects within `window`.
    pub async fn connects_within(&self, window: Duration) -> bool {
        TokioTimeout(window, self.listener.accept()).await.is_ok()
    }

    async fn accept_inner(&self) -> PeerConnection {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .expect("Failed to accept client");

        let mut request_uri = String::new();
        let socket = accept_hdr_async(stream, |request: &Request, response: Response| {
            request_uri = request.uri().to_string();
            Ok::<Response, ErrorResponse>(response)
        })
        .await
        .expect("WebSocket handshake failed");

        PeerConnection {
            socket,
            request_uri,
        }
    }
}

impl PeerConnection {
    /// Test helper: send a JSON envelope as a text frame.
    pub async fn send_json(&mut self, json: &str) {
        self.socket
            .send(Message::Text(json.to_string().into()))
            .await
            .expect("Failed to send frame");
    }

    /// Test helper: read the next text frame as raw text.
    pub async fn receive_text(&mut self) -> String {
        loop {
            let message = TokioTimeout(ACCEPT_TIMEOUT, self.socket.next())
                .await
                .expect("No frame received")
                .expect("Stream ended")
                .expect("Error receiving frame");

            if let Message::Text(text) = message {
                return text.as_str().to_string();
            }
        }
    }

    /// Test helper: read the next text frame as JSON.
    pub async fn receive_json(&mut self) -> Value {
        serde_json::from_str(&self.receive_text().await).expect("Frame is not JSON")
    }

    /// Test helper: true once the client has closed or dropped the connection.
    pub async fn is_closed_by_client(&mut self) -> bool {
        loop {
            match TokioTimeout(ACCEPT_TIMEOUT, self.socket.next()).await {
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
                Ok(Some(Ok(_))) => continue,
                Err(_) => return false,
            }
        }
    }
}

/// Channel config pointing at `endpoint` with fast retries.
pub fn fast_config(endpoint: &str) -> ChannelConfig {
    ChannelConfig {
        base_delay_ms: 50,
        max_reconnect_attempts: 2,
        connect_timeout_ms: 2_000,
        ..ChannelConfig::default()
    }
    .with_endpoint(endpoint)
}

pub struct TestChannel {
    pub channel: JobChannel,
    pub chat: Arc<MemoryChatStore>,
    pub projects: Arc<MemoryProjectStore>,
}

pub fn websocket_channel(config: ChannelConfig) -> TestChannel {
    let chat = Arc::new(MemoryChatStore::new());
    let projects = Arc::new(MemoryProjectStore::new());
    let channel = JobChannel::websocket(config, chat.clone(), projects.clone());
    TestChannel {
        channel,
        chat,
        projects,
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        TokioSleep(Duration::from_millis(10)).await;
    }
    condition()
}
