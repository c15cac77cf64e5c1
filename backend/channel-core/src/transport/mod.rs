//! Transport seam between the Connection Manager and the wire.
//!
//! A [`Connector`] turns an endpoint into a live [`TransportLink`]: an outbound
//! frame sender plus an inbound event receiver. Each link reports exactly one
//! terminal event (`Closed` or `Error`) and then goes quiet.

mod websocket;

pub use websocket::WebSocketConnector;

use crate::error::connection::ConnectionError;

use std::future::Future;

use log::debug;
use tokio::sync::mpsc;
use url::Url;

/// Something the transport delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Vec<u8>),
    /// `clean` is true when the peer completed a closing handshake.
    Closed {
        clean: bool,
        reason: String,
    },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Start a closing handshake and release the connection.
    Close,
}

/// One live transport connection.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// The far side of an in-process [`TransportLink`].
#[derive(Debug)]
pub struct TransportPeer {
    pub outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportLink {
    /// A link wired to an in-process peer instead of a socket.
    pub fn pair() -> (TransportLink, TransportPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        (
            TransportLink {
                outbound: outbound_tx,
                events: events_rx,
            },
            TransportPeer {
                outbound: outbound_rx,
                events: events_tx,
            },
        )
    }

    /// Ask the transport to close, dropping the link.
    pub fn close(self) {
        if self.outbound.send(OutboundFrame::Close).is_err() {
            debug!("Transport already gone before close");
        }
    }
}

/// Opens transport connections to an endpoint.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        endpoint: Url,
    ) -> impl Future<Output = Result<TransportLink, ConnectionError>> + Send;
}
