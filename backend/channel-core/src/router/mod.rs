//! Event Router: maps each decoded [`JobEvent`] to facade calls.
//!
//! | Event | Effect |
//! |---|---|
//! | Started | system message `Job started: <job_id>` |
//! | ToolCall | agent message `Tool: <tool>, Input: <input>, Output: <output>` |
//! | Completed | agent message `Result: <result>`, then the preview artifact |
//! | Failed | system message with the peer's error text |
//! | Queued, Debug, PeerError | logged and counted, no store mutation |
//! | Unknown | counted, no-op |
//!
//! Dispatch never blocks: the facade only enqueues.

mod ledger;
mod stats;

pub use ledger::{
    Anomaly, JobLedger, JobPhase, LEDGER_CAPACITY, LEDGER_RETIRED_CAPACITY, Observation, Observed,
};
pub use stats::RouterStats;

use crate::codec::{JobEvent, render_value};
use crate::sync::{MessageDraft, PreviewArtifact, Sender, StateSync};

use stats::RouterCounters;

use std::sync::{Mutex, PoisonError};

use log::{debug, info, warn};

/// What the router did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the facade.
    Applied,
    /// Handed to the facade despite an ordering anomaly.
    AppliedWithAnomaly(Anomaly),
    /// Observed but nothing to apply (queued, debug, peer error).
    Noticed,
    /// Unknown event type.
    Ignored,
    /// The facade refused the work; the event is dropped.
    Rejected(String),
}

pub struct EventRouter {
    sync: StateSync,
    ledger: Mutex<JobLedger>,
    counters: RouterCounters,
}

impl EventRouter {
    pub fn new(sync: StateSync) -> Self {
        Self {
            sync,
            ledger: Mutex::new(JobLedger::default()),
            counters: RouterCounters::default(),
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.counters.snapshot()
    }

    /// Route one event. Never blocks and never panics on peer misbehaviour.
    pub fn dispatch(&self, event: JobEvent) -> RouteOutcome {
        self.counters.record_dispatch();

        let outcome = match event {
            JobEvent::Started { job_id, project_id } => {
                let anomaly = self.observe(&job_id, &project_id, Observation::Start).anomaly;
                let draft = MessageDraft::new(Sender::System, format!("Job started: {job_id}"))
                    .for_job(job_id);
                self.append(&project_id, draft, anomaly)
            }
            JobEvent::ToolCall {
                job_id,
                project_id,
                tool,
                input,
                output,
            } => {
                let anomaly = self.observe(&job_id, &project_id, Observation::Progress).anomaly;
                let content = format!(
                    "Tool: {tool}, Input: {}, Output: {}",
                    render_value(&input),
                    render_value(&output)
                );
                let draft = MessageDraft::new(Sender::Agent, content).for_job(job_id);
                self.append(&project_id, draft, anomaly)
            }
            JobEvent::Completed {
                job_id,
                project_id,
                result,
                artifact,
            } => {
                let Observed {
                    sequence, anomaly, ..
                } = self.observe(&job_id, &project_id, Observation::Complete);
                let draft =
                    MessageDraft::new(Sender::Agent, format!("Result: {result}")).for_job(&job_id);
                let outcome = self.append(&project_id, draft, anomaly);

                match artifact {
                    Some(bytes) => {
                        let artifact = PreviewArtifact {
                            job_id,
                            sequence,
                            bytes,
                        };
                        match self.sync.set_preview_artifact(&project_id, artifact) {
                            Ok(()) => outcome,
                            Err(e) => {
                                warn!("Dropping preview for project {project_id}: {e}");
                                RouteOutcome::Rejected(e.to_string())
                            }
                        }
                    }
                    None => {
                        debug!("Job {job_id} completed without an artifact");
                        outcome
                    }
                }
            }
            JobEvent::Failed {
                job_id,
                project_id,
                error,
            } => {
                let anomaly = self.observe(&job_id, &project_id, Observation::Fail).anomaly;
                let draft = MessageDraft::new(Sender::System, error).for_job(job_id);
                self.append(&project_id, draft, anomaly)
            }
            JobEvent::Queued {
                job_id,
                position,
                estimated_wait,
            } => {
                info!(
                    "Job {job_id} queued at position {} (estimated wait {}s)",
                    position.map_or_else(|| "?".to_string(), |p| p.to_string()),
                    estimated_wait.map_or_else(|| "?".to_string(), |w| w.to_string())
                );
                self.counters.record_notice();
                RouteOutcome::Noticed
            }
            JobEvent::Debug {
                job_id,
                project_id,
                message,
            } => {
                debug!("Agent debug for job {job_id} (project {project_id}): {message}");
                self.counters.record_notice();
                RouteOutcome::Noticed
            }
            JobEvent::PeerError { message } => {
                warn!("Peer rejected a command: {message}");
                self.counters.record_notice();
                RouteOutcome::Noticed
            }
            JobEvent::Unknown { kind, .. } => {
                debug!("Ignoring event of unknown type {kind}");
                self.counters.record_unknown();
                RouteOutcome::Ignored
            }
        };

        if let RouteOutcome::AppliedWithAnomaly(anomaly) = &outcome {
            self.counters.record_anomaly();
            warn!("Out-of-order event applied defensively: {anomaly}");
        }

        outcome
    }

    fn observe(&self, job_id: &str, project_id: &str, observation: Observation) -> Observed {
        let observed = self
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(job_id, project_id, observation);

        if let Some(evicted) = &observed.evicted {
            self.counters.record_anomaly();
            warn!("Job ledger full: {evicted}");
        }

        observed
    }

    fn append(&self, project_id: &str, draft: MessageDraft, anomaly: Option<Anomaly>) -> RouteOutcome {
        match self.sync.append_message(project_id, draft) {
            Ok(()) => match anomaly {
                Some(anomaly) => RouteOutcome::AppliedWithAnomaly(anomaly),
                None => RouteOutcome::Applied,
            },
            Err(e) => {
                warn!("Dropping message for project {project_id}: {e}");
                RouteOutcome::Rejected(e.to_string())
            }
        }
    }
}
