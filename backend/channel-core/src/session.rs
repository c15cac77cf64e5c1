//! The assembled job-event channel.
//!
//! [`JobChannel`] wires the pieces together:
//!
//! ```text
//! transport ──frames──▶ delivery task ──decode──▶ EventRouter ──▶ StateSync ──▶ stores
//!     ▲                                   │
//!     │                                   └──▶ on_event subscribers
//! ConnectionManager ◀── CommandDispatcher ◀── send()
//! ```

use crate::codec::{JobEvent, decode_event};
use crate::config::{ChannelConfig, Identity};
use crate::connection::{ChannelSnapshot, ConnectionManager, ConnectionState, StateChange};
use crate::dispatcher::CommandDispatcher;
use crate::error::connection::ConnectionError;
use crate::error::dispatch::DispatchError;
use crate::router::{EventRouter, RouterStats};
use crate::sync::{ChatStore, MessageDraft, ProjectStore, Sender, StateSync};
use crate::transport::{Connector, WebSocketConnector};

use common::ErrorLocation;

use std::panic::Location;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use tokio::spawn as TokioSpawn;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 256;

/// One user's real-time channel to the job service.
///
/// Dropping the channel releases the transport and stops every background
/// task it owns.
pub struct JobChannel {
    manager: ConnectionManager,
    dispatcher: CommandDispatcher,
    router: Arc<EventRouter>,
    sync: StateSync,
    events: broadcast::Sender<JobEvent>,
    delivery: JoinHandle<()>,
}

impl JobChannel {
    /// Build a channel over `connector`. Must be called inside a tokio runtime.
    ///
    /// The channel starts `Idle`; call [`open`](Self::open) once an identity is known.
    pub fn new<C: Connector>(
        connector: C,
        config: ChannelConfig,
        chat: Arc<dyn ChatStore>,
        projects: Arc<dyn ProjectStore>,
    ) -> Self {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let manager = ConnectionManager::spawn(connector, config, frames_tx);
        let sync = StateSync::new(chat, projects);
        let router = Arc::new(EventRouter::new(sync.clone()));

        let delivery = TokioSpawn(deliver(frames_rx, Arc::clone(&router), events.clone()));

        Self {
            dispatcher: CommandDispatcher::new(manager.clone()),
            manager,
            router,
            sync,
            events,
            delivery,
        }
    }

    /// A channel over a real WebSocket connection.
    pub fn websocket(
        config: ChannelConfig,
        chat: Arc<dyn ChatStore>,
        projects: Arc<dyn ProjectStore>,
    ) -> Self {
        Self::new(WebSocketConnector, config, chat, projects)
    }

    /// Connect for `identity`. Without an identity the channel stays `Idle`.
    pub fn open(&self, identity: Option<Identity>) -> Result<(), ConnectionError> {
        match identity {
            Some(identity) => {
                info!("Opening job channel for {identity}");
                self.manager.open(identity)
            }
            None => {
                debug!("No identity available, job channel stays idle");
                Ok(())
            }
        }
    }

    /// Tear the channel down; returns once it is `Idle` and no retry is pending.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        self.manager.close().await
    }

    /// Send a prompt for a project and echo it into the project's chat.
    ///
    /// The echo is queued before the frame is written, so it always precedes
    /// the reply in the project's chat. Nothing is echoed when the prompt is
    /// invalid or the channel is not `Open`. If the write itself fails, a
    /// system message records that the prompt was not delivered.
    pub async fn send(&self, project_id: &str, prompt: &str) -> Result<(), DispatchError> {
        let payload = self.dispatcher.encode(project_id, prompt)?;

        let state = self.manager.state();
        if state != ConnectionState::Open {
            return Err(DispatchError::ChannelNotReady {
                state,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.note(project_id, MessageDraft::new(Sender::User, prompt));

        if let Err(e) = self.dispatcher.transmit(payload).await {
            let state = self.manager.state();
            self.note(
                project_id,
                MessageDraft::new(Sender::System, format!("Prompt not sent: channel is {state}")),
            );
            return Err(e);
        }

        Ok(())
    }

    fn note(&self, project_id: &str, draft: MessageDraft) {
        if let Err(e) = self.sync.append_message(project_id, draft) {
            warn!("Could not record message for project {project_id}: {e}");
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        self.manager.snapshot()
    }

    pub fn on_state_change(&self) -> broadcast::Receiver<StateChange> {
        self.manager.on_state_change()
    }

    /// Every decoded event, before it is routed. Lagging subscribers miss events.
    pub fn on_event(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub async fn wait_for_state(
        &self,
        target: ConnectionState,
    ) -> Result<ChannelSnapshot, ConnectionError> {
        self.manager.wait_for_state(target).await
    }

    /// Present once the reconnect budget is exhausted.
    pub fn terminal_error(&self) -> Option<ConnectionError> {
        self.manager.terminal_error()
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    pub fn sync(&self) -> &StateSync {
        &self.sync
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }
}

impl Drop for JobChannel {
    fn drop(&mut self) {
        self.manager.shutdown();
        self.delivery.abort();
    }
}

/// Decode inbound frames in arrival order and hand them to the router.
async fn deliver(
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    router: Arc<EventRouter>,
    events: broadcast::Sender<JobEvent>,
) {
    while let Some(frame) = frames.recv().await {
        let event = match decode_event(&frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping undecodable frame ({} bytes): {e}", frame.len());
                continue;
            }
        };

        if events.send(event.clone()).is_err() {
            trace!("No event subscribers for {}", event.kind());
        }

        let outcome = router.dispatch(event);
        trace!("Routed event: {outcome:?}");
    }

    debug!("Frame delivery stopped");
}
