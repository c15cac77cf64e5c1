use crate::config::{ChannelConfig, Identity};
use crate::connection::machine::{ChannelMachine, Effect, Trigger};
use crate::connection::policy::ReconnectPolicy;
use crate::connection::state::{ChannelSnapshot, ConnectionState, StateChange};
use crate::error::connection::ConnectionError;
use crate::error::dispatch::DispatchError;
use crate::transport::{Connector, OutboundFrame, TransportEvent, TransportLink};

use common::ErrorLocation;

use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::spawn as TokioSpawn;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep as TokioSleep, timeout as TokioTimeout};

const STATE_CHANGE_CAPACITY: usize = 64;

/// Inputs to the manager actor. Transport and timer signals carry the
/// generation or timer id they belong to so stale ones can be dropped.
enum ManagerCommand {
    Open(Identity),
    Close {
        ack: oneshot::Sender<()>,
    },
    Transmit {
        payload: String,
        reply: oneshot::Sender<Result<(), DispatchError>>,
    },
    Linked {
        generation: u64,
        link: TransportLink,
    },
    ConnectFailed {
        generation: u64,
        error: ConnectionError,
    },
    LinkEnded {
        generation: u64,
        event: TransportEvent,
    },
    BackoffElapsed {
        timer: u64,
    },
    Shutdown,
}

/// Handle to the connection actor.
///
/// This type is `Clone`; all clones drive the same channel. The actor stops
/// when every handle is dropped or [`shutdown`](Self::shutdown) is called, and
/// releases the transport on the way out.
#[derive(Clone)]
pub struct ConnectionManager {
    command_tx: mpsc::UnboundedSender<ManagerCommand>,
    snapshot: watch::Receiver<ChannelSnapshot>,
    changes: broadcast::Sender<StateChange>,
}

impl ConnectionManager {
    /// Spawn the actor. Must be called inside a tokio runtime.
    ///
    /// Inbound frames of the live transport are forwarded to `frames`.
    pub fn spawn<C: Connector>(
        connector: C,
        config: ChannelConfig,
        frames: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(ChannelSnapshot::default());
        let (changes, _) = broadcast::channel(STATE_CHANGE_CAPACITY);

        let policy = ReconnectPolicy::new(config.base_delay(), config.max_reconnect_attempts);
        let actor = ManagerActor {
            connector: Arc::new(connector),
            config,
            machine: ChannelMachine::new(policy),
            identity: None,
            generation: 0,
            outbound: None,
            pump: None,
            connect_task: None,
            timer: None,
            timer_id: 0,
            deadline: None,
            actor_tx: command_tx.downgrade(),
            frames,
            snapshot_tx,
            changes: changes.clone(),
        };

        TokioSpawn(actor.run(command_rx));
        info!("Connection manager actor spawned");

        Self {
            command_tx,
            snapshot,
            changes,
        }
    }

    /// Start connecting for `identity`.
    ///
    /// Idempotent: a no-op while the channel is already connecting, open or
    /// waiting to reconnect.
    pub fn open(&self, identity: Identity) -> Result<(), ConnectionError> {
        self.submit(ManagerCommand::Open(identity))
    }

    /// Tear the channel down; returns once the actor has reached `Idle`.
    ///
    /// Cancels any pending reconnect and aborts an in-flight connect attempt.
    /// An open transport has been told to close and no longer delivers frames,
    /// but its closing handshake finishes in the background after this returns.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        let (ack, done) = oneshot::channel();
        self.submit(ManagerCommand::Close { ack })?;

        done.await.map_err(|e| ConnectionError::ActorGone {
            message: format!("Connection actor dropped close acknowledgement: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Tear down and stop the actor.
    pub fn shutdown(&self) {
        if self.submit(ManagerCommand::Shutdown).is_err() {
            debug!("Shutdown requested after connection actor stopped");
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        *self.snapshot.borrow()
    }

    /// Every transition, in order. Advisory: a lagging subscriber misses
    /// notifications rather than slowing the channel down.
    pub fn on_state_change(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Wait until the channel reaches `target`.
    pub async fn wait_for_state(
        &self,
        target: ConnectionState,
    ) -> Result<ChannelSnapshot, ConnectionError> {
        let mut snapshot = self.snapshot.clone();
        let reached = snapshot
            .wait_for(|s| s.state == target)
            .await
            .map_err(|e| ConnectionError::ActorGone {
                message: format!("Connection actor stopped while waiting for {target}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        Ok(*reached)
    }

    /// `ChannelFailed` while the channel is in its terminal state.
    #[track_caller]
    pub fn terminal_error(&self) -> Option<ConnectionError> {
        let snapshot = self.snapshot();
        if snapshot.state != ConnectionState::Failed {
            return None;
        }

        Some(ConnectionError::ChannelFailed {
            attempts: snapshot.reconnect.attempt_count,
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Write one text frame on the live transport.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::ChannelNotReady`] - the channel is not `Open`
    /// - [`DispatchError::Transport`] - the transport writer has stopped
    pub(crate) async fn transmit(&self, payload: String) -> Result<(), DispatchError> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(ManagerCommand::Transmit { payload, reply })
            .map_err(|_| DispatchError::Transport {
                message: "Connection actor stopped".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        response.await.map_err(|e| DispatchError::Transport {
            message: format!("Connection actor dropped send reply: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?
    }

    #[track_caller]
    fn submit(&self, command: ManagerCommand) -> Result<(), ConnectionError> {
        self.command_tx
            .send(command)
            .map_err(|_| ConnectionError::ActorGone {
                message: "Connection actor stopped".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}

/// Single owner of the machine, the live transport and the reconnect timer.
struct ManagerActor<C> {
    connector: Arc<C>,
    config: ChannelConfig,
    machine: ChannelMachine,
    identity: Option<Identity>,
    /// Bumped on every connect attempt and every release.
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
    pump: Option<JoinHandle<()>>,
    connect_task: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
    timer_id: u64,
    deadline: Option<Instant>,
    actor_tx: mpsc::WeakUnboundedSender<ManagerCommand>,
    frames: mpsc::UnboundedSender<Vec<u8>>,
    snapshot_tx: watch::Sender<ChannelSnapshot>,
    changes: broadcast::Sender<StateChange>,
}

impl<C: Connector> ManagerActor<C> {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<ManagerCommand>) {
        info!("Connection manager actor started");

        while let Some(command) = command_rx.recv().await {
            if let ManagerCommand::Shutdown = command {
                break;
            }
            self.handle(command);
        }

        self.teardown("connection manager stopped");
        info!("Connection manager actor stopped");
    }

    fn handle(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Open(identity) => self.open(identity),
            ManagerCommand::Close { ack } => {
                self.teardown("closed by host");
                if ack.send(()).is_err() {
                    debug!("Close caller went away before acknowledgement");
                }
            }
            ManagerCommand::Transmit { payload, reply } => {
                let result = self.transmit(payload);
                if reply.send(result).is_err() {
                    debug!("Send caller went away before reply");
                }
            }
            ManagerCommand::Linked { generation, link } => self.on_linked(generation, link),
            ManagerCommand::ConnectFailed { generation, error } => {
                if generation != self.generation {
                    debug!("Ignoring failure of stale connect attempt {generation}: {error}");
                    return;
                }
                self.connect_task = None;
                warn!("Connect attempt failed: {error}");
                self.apply(Trigger::TransportFailed, Some(error.to_string()));
            }
            ManagerCommand::LinkEnded { generation, event } => {
                if generation != self.generation {
                    debug!("Ignoring signal from released transport {generation}: {event:?}");
                    return;
                }
                self.outbound = None;
                self.pump = None;

                match event {
                    TransportEvent::Closed { clean, reason } => {
                        if clean {
                            info!("Transport closed cleanly: {reason}");
                        } else {
                            warn!("Transport closed uncleanly: {reason}");
                        }
                        self.apply(Trigger::TransportClosed { clean }, Some(reason));
                    }
                    TransportEvent::Error(message) => {
                        warn!("Transport error: {message}");
                        self.apply(Trigger::TransportFailed, Some(message));
                    }
                    TransportEvent::Frame(_) => {
                        trace!("Late frame reported as link end; ignoring");
                    }
                }
            }
            ManagerCommand::BackoffElapsed { timer } => {
                if timer != self.timer_id || self.timer.is_none() {
                    debug!("Ignoring expired reconnect timer {timer}");
                    return;
                }
                self.timer = None;
                self.deadline = None;
                self.apply(Trigger::BackoffElapsed, None);
            }
            ManagerCommand::Shutdown => self.teardown("shutdown requested"),
        }
    }

    fn open(&mut self, identity: Identity) {
        let state = self.machine.state();

        match state {
            ConnectionState::Idle => {
                self.identity = Some(identity);
                self.apply(Trigger::IdentityAvailable, None);
            }
            ConnectionState::Failed => {
                warn!("Open ignored: channel has failed; close it before reopening");
            }
            _ if self.identity.as_ref() != Some(&identity) => {
                warn!("Open for identity {identity} ignored: channel is {state} for another identity");
            }
            _ => debug!("Open ignored: channel already {state}"),
        }
    }

    /// `Closing` covers handing the close to the transport writer; nothing
    /// waits on the socket, so `Released` follows immediately.
    fn teardown(&mut self, reason: &str) {
        self.apply(Trigger::Teardown, Some(reason.to_string()));
        self.apply(Trigger::Released, Some(reason.to_string()));
    }

    #[track_caller]
    fn transmit(&mut self, payload: String) -> Result<(), DispatchError> {
        let state = self.machine.state();

        let outbound = match (&self.outbound, state.accepts_sends()) {
            (Some(outbound), true) => outbound,
            _ => {
                return Err(DispatchError::ChannelNotReady {
                    state,
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        outbound
            .send(OutboundFrame::Text(payload))
            .map_err(|_| DispatchError::Transport {
                message: "Transport writer stopped".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    fn on_linked(&mut self, generation: u64, link: TransportLink) {
        if generation != self.generation || self.machine.state() != ConnectionState::Connecting {
            debug!("Releasing transport from stale connect attempt {generation}");
            link.close();
            return;
        }

        self.connect_task = None;
        let TransportLink { outbound, events } = link;
        self.outbound = Some(outbound);
        self.pump = Some(TokioSpawn(pump_link(
            generation,
            events,
            self.frames.clone(),
            self.actor_tx.clone(),
        )));

        self.apply(Trigger::TransportOpened, None);
    }

    fn apply(&mut self, trigger: Trigger, reason: Option<String>) {
        let previous = self.machine.state();

        for effect in self.machine.handle(trigger) {
            match effect {
                Effect::OpenTransport => self.start_connect(),
                Effect::CloseTransport => self.release_transport(),
                Effect::ScheduleReconnect { attempt, delay } => {
                    self.schedule_reconnect(attempt, delay)
                }
                Effect::CancelReconnect => self.cancel_reconnect(),
                Effect::SurfaceFailure { attempts } => {
                    error!("Channel failed after {attempts} reconnect attempts; giving up");
                }
            }
        }

        self.publish(previous, reason);
    }

    fn publish(&self, previous: ConnectionState, reason: Option<String>) {
        let current = self.machine.state();

        self.snapshot_tx.send_replace(ChannelSnapshot {
            state: current,
            reconnect: self.machine.reconnect(),
            reconnect_deadline: self.deadline,
        });

        if previous == current {
            return;
        }

        info!("Channel state {previous} -> {current}");
        let change = StateChange {
            previous,
            current,
            reason,
        };
        if self.changes.send(change).is_err() {
            trace!("No state change subscribers");
        }
    }

    fn start_connect(&mut self) {
        self.generation += 1;
        let generation = self.generation;

        let endpoint = match &self.identity {
            Some(identity) => {
                self.config
                    .endpoint_for(identity)
                    .map_err(|e| ConnectionError::Transport {
                        message: e.to_string(),
                        location: ErrorLocation::from(Location::caller()),
                    })
            }
            None => Err(ConnectionError::Transport {
                message: "No identity to address the channel endpoint".to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        };

        let connector = Arc::clone(&self.connector);
        let connect_timeout = self.config.connect_timeout();
        let actor = self.actor_tx.clone();

        debug!("Starting connect attempt {generation}");
        self.connect_task = Some(TokioSpawn(async move {
            let outcome = match endpoint {
                Ok(url) => match TokioTimeout(connect_timeout, connector.connect(url)).await {
                    Ok(result) => result,
                    Err(_) => Err(ConnectionError::Timeout {
                        message: format!("Connect did not finish within {connect_timeout:?}"),
                        location: ErrorLocation::from(Location::caller()),
                    }),
                },
                Err(e) => Err(e),
            };

            let command = match outcome {
                Ok(link) => ManagerCommand::Linked { generation, link },
                Err(error) => ManagerCommand::ConnectFailed { generation, error },
            };
            notify(&actor, command);
        }));
    }

    fn release_transport(&mut self) {
        // Anything still in flight for the old generation becomes stale.
        self.generation += 1;

        if let Some(task) = self.connect_task.take() {
            task.abort();
            debug!("Cancelled in-flight connect attempt");
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(outbound) = self.outbound.take()
            && outbound.send(OutboundFrame::Close).is_err()
        {
            debug!("Transport writer already stopped");
        }
    }

    fn schedule_reconnect(&mut self, attempt: u32, delay: Duration) {
        self.cancel_reconnect();

        self.timer_id += 1;
        let timer = self.timer_id;
        let actor = self.actor_tx.clone();
        self.deadline = Some(Instant::now() + delay);

        warn!(
            "Reconnecting in {delay:?} (attempt {attempt} of {})",
            self.machine.max_attempts()
        );
        self.timer = Some(TokioSpawn(async move {
            TokioSleep(delay).await;
            notify(&actor, ManagerCommand::BackoffElapsed { timer });
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            debug!("Cancelled pending reconnect timer {}", self.timer_id);
        }
        self.deadline = None;
    }
}

/// Forward frames of one link to the frame consumer and its terminal event to the actor.
async fn pump_link(
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    frames: mpsc::UnboundedSender<Vec<u8>>,
    actor: mpsc::WeakUnboundedSender<ManagerCommand>,
) {
    while let Some(event) = events.recv().await {
        if let TransportEvent::Frame(bytes) = event {
            if frames.send(bytes).is_err() {
                warn!("Frame consumer stopped; dropping frame");
            }
            continue;
        }

        notify(&actor, ManagerCommand::LinkEnded { generation, event });
        return;
    }

    notify(
        &actor,
        ManagerCommand::LinkEnded {
            generation,
            event: TransportEvent::Closed {
                clean: false,
                reason: "transport dropped without a close signal".to_string(),
            },
        },
    );
}

fn notify(actor: &mpsc::WeakUnboundedSender<ManagerCommand>, command: ManagerCommand) {
    match actor.upgrade() {
        Some(tx) => {
            if tx.send(command).is_err() {
                debug!("Connection actor stopped; dropping signal");
            }
        }
        None => debug!("Connection actor stopped; dropping signal"),
    }
}
