// Shared fixtures for unit tests: a scripted in-process connector and
// polling helpers for asynchronous store writes.

use crate::config::{ChannelConfig, Identity};
use crate::error::connection::ConnectionError;
use crate::transport::{Connector, TransportLink, TransportPeer};

use common::ErrorLocation;

use std::collections::VecDeque;
use std::future::Future;
use std::panic::Location;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep as TokioSleep};
use url::Url;

/// What the next connect attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Succeed and hand the far side of the link to the test.
    Accept,
    /// Fail immediately with a transport error.
    Refuse,
    /// Never complete.
    Stall,
}

/// Connector whose attempts follow a script. An exhausted script refuses.
#[derive(Clone)]
pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<Step>>>,
    attempts: Arc<AtomicUsize>,
    endpoints: Arc<Mutex<Vec<Url>>>,
    peers: mpsc::UnboundedSender<TransportPeer>,
}

impl ScriptedConnector {
    pub fn new(steps: &[Step]) -> (Self, mpsc::UnboundedReceiver<TransportPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Self {
            script: Arc::new(Mutex::new(steps.iter().copied().collect())),
            attempts: Arc::new(AtomicUsize::new(0)),
            endpoints: Arc::new(Mutex::new(Vec::new())),
            peers,
        };
        (connector, peer_rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> Vec<Url> {
        self.endpoints.lock().unwrap().clone()
    }

    fn next_step(&self, endpoint: Url) -> Step {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(endpoint);
        self.script.lock().unwrap().pop_front().unwrap_or(Step::Refuse)
    }
}

impl Connector for ScriptedConnector {
    fn connect(
        &self,
        endpoint: Url,
    ) -> impl Future<Output = Result<TransportLink, ConnectionError>> + Send {
        let step = self.next_step(endpoint);
        let peers = self.peers.clone();

        async move {
            match step {
                Step::Accept => {
                    let (link, peer) = TransportLink::pair();
                    peers.send(peer).unwrap();
                    Ok(link)
                }
                Step::Refuse => Err(ConnectionError::Transport {
                    message: "connection refused".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                }),
                Step::Stall => std::future::pending().await,
            }
        }
    }
}

/// Config with a 1s backoff unit and a connect timeout long enough to never fire.
pub fn test_config() -> ChannelConfig {
    ChannelConfig {
        connect_timeout_ms: 3_600_000,
        ..ChannelConfig::default()
    }
}

pub fn alice() -> Identity {
    Identity::new("alice").unwrap()
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
