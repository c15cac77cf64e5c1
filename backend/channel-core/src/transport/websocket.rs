use crate::error::connection::ConnectionError;
use crate::transport::{Connector, OutboundFrame, TransportEvent, TransportLink};

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use tokio::net::TcpStream;
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] over `tokio-tungstenite` with UTF-8 JSON text frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: Url) -> Result<TransportLink, ConnectionError> {
        debug!("Opening WebSocket to {}", endpoint.as_str());

        let (socket, response) = connect_async(endpoint.as_str()).await?;
        info!(
            "WebSocket connected to {}{} (HTTP {})",
            endpoint.host_str().unwrap_or("unknown"),
            endpoint.path(),
            response.status()
        );

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        TokioSpawn(drive_socket(socket, outbound_rx, events_tx));

        Ok(TransportLink {
            outbound: outbound_tx,
            events: events_rx,
        })
    }
}

/// Owns one socket: forwards inbound frames, writes outbound frames, and
/// reports a single terminal event when the peer side ends.
///
/// A local close (explicit `Close` frame or dropped sender) reports nothing:
/// whoever released the link already knows.
async fn drive_socket(
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut sink, mut stream) = socket.split();

    let terminal = loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    trace!("Received text frame ({} bytes)", text.len());
                    if events.send(TransportEvent::Frame(text.as_bytes().to_vec())).is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    trace!("Received binary frame ({} bytes)", data.len());
                    if events.send(TransportEvent::Frame(data.to_vec())).is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                        .unwrap_or_default();
                    info!("Peer closed WebSocket: {reason}");
                    if let Err(e) = sink.close().await {
                        trace!("Close handshake reply failed: {e}");
                    }
                    break Some(TransportEvent::Closed { clean: true, reason });
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite itself.
                }
                Some(Err(e)) => {
                    warn!("WebSocket read failed: {e}");
                    break Some(TransportEvent::Error(e.to_string()));
                }
                None => {
                    break Some(TransportEvent::Closed {
                        clean: false,
                        reason: "stream ended without close frame".to_string(),
                    });
                }
            },
            command = outbound.recv() => match command {
                Some(OutboundFrame::Text(text)) => {
                    trace!("Sending text frame ({} bytes)", text.len());
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!("WebSocket write failed: {e}");
                        break Some(TransportEvent::Error(e.to_string()));
                    }
                }
                Some(OutboundFrame::Close) | None => {
                    debug!("Closing WebSocket on request");
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        trace!("Close frame not sent: {e}");
                    }
                    break None;
                }
            },
        }
    };

    if let Some(event) = terminal
        && events.send(event).is_err()
    {
        trace!("Transport listener gone before terminal event");
    }
}
