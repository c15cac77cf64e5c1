use crate::error::sync::SyncError;
use crate::sync::message::{ChatMessage, MessageDraft};
use crate::sync::{ChatStore, ProjectStore};

use common::ErrorLocation;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::SystemTime;

use log::{debug, error, trace, warn};
use tokio::spawn as TokioSpawn;
use tokio::sync::{mpsc, oneshot};
use tokio::task::spawn_blocking;

/// An artifact tagged with the job that produced it.
///
/// `sequence` is the job's arrival sequence number assigned by the router;
/// it orders jobs within a project independently of wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewArtifact {
    pub job_id: String,
    pub sequence: u64,
    pub bytes: Vec<u8>,
}

enum SyncCommand {
    Append(MessageDraft),
    SetArtifact(PreviewArtifact),
    Flush(oneshot::Sender<()>),
}

/// Facade over the chat and project stores.
///
/// Every call only enqueues work and returns immediately, so it is safe to
/// call from the transport's delivery path.
///
/// # Thread Safety
///
/// This type is `Clone`; all clones share the same per-project writers.
#[derive(Clone)]
pub struct StateSync {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    chat: Arc<dyn ChatStore>,
    projects: Arc<dyn ProjectStore>,
    writers: Arc<WriterRegistry>,
}

type WriterRegistry = Mutex<HashMap<String, WriterSlot>>;

/// A project's writer, if one is running, and the ordering state it left behind.
#[derive(Default)]
struct WriterSlot {
    sender: Option<mpsc::UnboundedSender<SyncCommand>>,
    marks: ProjectMarks,
}

/// Per-project ordering state handed from one writer to the next.
#[derive(Debug, Clone, Default)]
struct ProjectMarks {
    last_timestamp: Option<SystemTime>,
    last_applied: Option<(u64, String)>,
}

impl StateSync {
    pub fn new(chat: Arc<dyn ChatStore>, projects: Arc<dyn ProjectStore>) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                chat,
                projects,
                writers: Arc::new(Mutex::new(HashMap::new())),
            }),
        }
    }

    /// Append a message to a project's chat, after every earlier call for that project.
    ///
    /// Must be called inside a tokio runtime (the project's writer is spawned lazily).
    pub fn append_message(&self, project_id: &str, draft: MessageDraft) -> Result<(), SyncError> {
        self.enqueue(project_id, SyncCommand::Append(draft))
    }

    /// Set a project's preview unless a job that arrived later already set it.
    ///
    /// Last write wins by arrival sequence: an artifact whose `sequence` is not
    /// greater than the last applied one for the project is skipped. Re-applying
    /// the same job is therefore a no-op.
    pub fn set_preview_artifact(
        &self,
        project_id: &str,
        artifact: PreviewArtifact,
    ) -> Result<(), SyncError> {
        self.enqueue(project_id, SyncCommand::SetArtifact(artifact))
    }

    /// Wait until everything enqueued for `project_id` before this call has been applied.
    pub async fn flush_project(&self, project_id: &str) -> Result<(), SyncError> {
        let (done, applied) = oneshot::channel();
        self.enqueue(project_id, SyncCommand::Flush(done))?;

        applied.await.map_err(|e| SyncError::WorkerGone {
            project_id: project_id.to_string(),
            message: format!("Writer dropped flush: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Wait until everything enqueued for every project before this call has been applied.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let projects: Vec<String> = self
            .lock_writers()?
            .iter()
            .filter(|(_, slot)| slot.sender.is_some())
            .map(|(project_id, _)| project_id.clone())
            .collect();

        for project_id in projects {
            self.flush_project(&project_id).await?;
        }

        Ok(())
    }

    /// Number of projects with a running writer.
    pub fn active_writers(&self) -> usize {
        self.inner
            .writers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.sender.is_some())
            .count()
    }

    #[track_caller]
    fn enqueue(&self, project_id: &str, command: SyncCommand) -> Result<(), SyncError> {
        let mut writers = self.lock_writers()?;
        let slot = writers.entry(project_id.to_string()).or_default();

        let sender = slot.sender.get_or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let writer = ProjectWriter {
                project_id: project_id.to_string(),
                chat: Arc::clone(&self.inner.chat),
                projects: Arc::clone(&self.inner.projects),
                registry: Arc::downgrade(&self.inner.writers),
                marks: slot.marks.clone(),
            };
            TokioSpawn(writer.run(rx));
            debug!("Spawned state writer for project {project_id}");
            tx
        });

        sender.send(command).map_err(|_| SyncError::WorkerGone {
            project_id: project_id.to_string(),
            message: "State writer stopped".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    #[track_caller]
    fn lock_writers(&self) -> Result<MutexGuard<'_, HashMap<String, WriterSlot>>, SyncError> {
        self.inner.writers.lock().map_err(|e| SyncError::Poisoned {
            message: format!("State writer registry poisoned: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

/// The single writer for one project. Exits once its queue drains.
struct ProjectWriter {
    project_id: String,
    chat: Arc<dyn ChatStore>,
    projects: Arc<dyn ProjectStore>,
    registry: Weak<WriterRegistry>,
    marks: ProjectMarks,
}

impl ProjectWriter {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SyncCommand>) {
        loop {
            if commands.is_empty() && self.retire(&commands) {
                trace!("State writer for project {} retired", self.project_id);
                return;
            }

            let Some(command) = commands.recv().await else {
                break;
            };
            self.apply(command).await;
        }

        debug!("State writer for project {} stopped", self.project_id);
    }

    /// Unregister if nothing is queued. Enqueueing holds the same lock, so no
    /// command can slip in between the check and the removal.
    fn retire(&self, commands: &mpsc::UnboundedReceiver<SyncCommand>) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut writers = registry.lock().unwrap_or_else(PoisonError::into_inner);

        if !commands.is_empty() {
            return false;
        }

        if let Some(slot) = writers.get_mut(&self.project_id) {
            slot.sender = None;
            slot.marks = self.marks.clone();
        }
        true
    }

    async fn apply(&mut self, command: SyncCommand) {
        let project_id = self.project_id.clone();

        match command {
            SyncCommand::Append(draft) => {
                let now = SystemTime::now();
                let timestamp = match self.marks.last_timestamp {
                    Some(previous) if previous > now => previous,
                    _ => now,
                };
                self.marks.last_timestamp = Some(timestamp);

                let message = ChatMessage::stamped(draft, timestamp);
                trace!("Appending {} message to project {project_id}", message.sender);

                let chat = Arc::clone(&self.chat);
                let target = project_id.clone();
                run_store(&project_id, "append message", move || {
                    chat.append_message(&target, message)
                })
                .await;
            }
            SyncCommand::SetArtifact(artifact) => {
                if let Some((sequence, job_id)) = &self.marks.last_applied
                    && artifact.sequence <= *sequence
                {
                    warn!(
                        "Skipping artifact of job {} for project {project_id}: job {job_id} (sequence {sequence}) is not older",
                        artifact.job_id
                    );
                    return;
                }

                let PreviewArtifact {
                    job_id,
                    sequence,
                    bytes,
                } = artifact;
                debug!(
                    "Setting preview for project {project_id} from job {job_id} ({} bytes)",
                    bytes.len()
                );

                let store = Arc::clone(&self.projects);
                let target = project_id.clone();
                let applied = run_store(&project_id, "set preview artifact", move || {
                    store.set_preview_artifact(&target, bytes)
                })
                .await;

                if applied {
                    self.marks.last_applied = Some((sequence, job_id));
                }
            }
            SyncCommand::Flush(done) => {
                if done.send(()).is_err() {
                    trace!("Flush waiter for project {project_id} went away");
                }
            }
        }
    }
}

/// Run one store call on the blocking pool. Returns whether it succeeded.
async fn run_store<F>(project_id: &str, operation: &str, call: F) -> bool
where
    F: FnOnce() -> Result<(), SyncError> + Send + 'static,
{
    match spawn_blocking(call).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("Failed to {operation} for project {project_id}: {e}");
            false
        }
        Err(e) => {
            error!("Store call to {operation} for project {project_id} did not complete: {e}");
            false
        }
    }
}
