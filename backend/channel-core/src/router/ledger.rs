use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

/// Jobs tracked in full (running and finished) before the oldest is retired.
pub const LEDGER_CAPACITY: usize = 1024;

/// Retired job ids remembered with their sequence so they are never renumbered.
pub const LEDGER_RETIRED_CAPACITY: usize = 16 * LEDGER_CAPACITY;

/// Lifecycle phase of a job as far as this client has observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Running,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }
}

/// Which kind of job event is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Start,
    Progress,
    Complete,
    Fail,
}

impl Observation {
    fn phase(self) -> JobPhase {
        match self {
            Observation::Start | Observation::Progress => JobPhase::Running,
            Observation::Complete => JobPhase::Completed,
            Observation::Fail => JobPhase::Failed,
        }
    }
}

/// Ordering violations the peer is not supposed to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    MissingStart { job_id: String },
    DuplicateStart { job_id: String },
    AfterTerminal { job_id: String },
    DuplicateTerminal { job_id: String },
    ProjectMismatch { job_id: String, expected: String, actual: String },
    /// A running job was pushed out of the ledger by newer jobs.
    Evicted { job_id: String },
    /// An event arrived for a job evicted while still running.
    AfterEviction { job_id: String },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::MissingStart { job_id } => write!(f, "job {job_id} seen before job_started"),
            Anomaly::DuplicateStart { job_id } => write!(f, "job {job_id} started twice"),
            Anomaly::AfterTerminal { job_id } => {
                write!(f, "job {job_id} produced events after finishing")
            }
            Anomaly::DuplicateTerminal { job_id } => write!(f, "job {job_id} finished twice"),
            Anomaly::ProjectMismatch {
                job_id,
                expected,
                actual,
            } => write!(
                f,
                "job {job_id} moved from project {expected} to project {actual}"
            ),
            Anomaly::Evicted { job_id } => {
                write!(f, "job {job_id} never finished and was dropped from the ledger")
            }
            Anomaly::AfterEviction { job_id } => {
                write!(f, "job {job_id} reappeared after being dropped from the ledger")
            }
        }
    }
}

/// Result of recording one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    /// Arrival sequence of the observed job.
    pub sequence: u64,
    /// Ordering problem with the observed job itself.
    pub anomaly: Option<Anomaly>,
    /// A different, still running job evicted to make room.
    pub evicted: Option<Anomaly>,
}

#[derive(Debug, Clone)]
struct JobEntry {
    sequence: u64,
    project_id: String,
    phase: JobPhase,
}

#[derive(Debug, Clone, Copy)]
struct Retired {
    sequence: u64,
    phase: JobPhase,
}

/// Per-job bookkeeping: arrival sequence and observed phase.
///
/// Sequences start at 1 and are assigned the first time a job id is seen,
/// so a newer job always outranks an older one for preview purposes. At most
/// [`LEDGER_CAPACITY`] jobs are tracked; finished jobs are retired first,
/// oldest first, and a running job is only retired when nothing has finished.
/// Retired ids keep their sequence for the next [`LEDGER_RETIRED_CAPACITY`]
/// retirements.
#[derive(Debug, Default)]
pub struct JobLedger {
    next_sequence: u64,
    jobs: HashMap<String, JobEntry>,
    running: BTreeMap<u64, String>,
    finished: VecDeque<String>,
    retired: HashMap<String, Retired>,
    retired_order: VecDeque<String>,
}

impl JobLedger {
    /// Record an event for `job_id`.
    pub fn observe(&mut self, job_id: &str, project_id: &str, observation: Observation) -> Observed {
        let next = observation.phase();

        if let Some(retired) = self.retired.get_mut(job_id) {
            let anomaly = if retired.phase.is_terminal() {
                if next.is_terminal() {
                    Anomaly::DuplicateTerminal {
                        job_id: job_id.to_string(),
                    }
                } else {
                    Anomaly::AfterTerminal {
                        job_id: job_id.to_string(),
                    }
                }
            } else {
                retired.phase = next;
                Anomaly::AfterEviction {
                    job_id: job_id.to_string(),
                }
            };
            return Observed {
                sequence: retired.sequence,
                anomaly: Some(anomaly),
                evicted: None,
            };
        }

        let Some(entry) = self.jobs.get_mut(job_id) else {
            self.next_sequence += 1;
            let sequence = self.next_sequence;
            self.jobs.insert(
                job_id.to_string(),
                JobEntry {
                    sequence,
                    project_id: project_id.to_string(),
                    phase: next,
                },
            );
            if next.is_terminal() {
                self.finished.push_back(job_id.to_string());
            } else {
                self.running.insert(sequence, job_id.to_string());
            }
            let anomaly = (observation != Observation::Start).then(|| Anomaly::MissingStart {
                job_id: job_id.to_string(),
            });
            return Observed {
                sequence,
                anomaly,
                evicted: self.make_room(),
            };
        };

        let sequence = entry.sequence;
        let was_terminal = entry.phase.is_terminal();

        let anomaly = if entry.project_id != project_id {
            Some(Anomaly::ProjectMismatch {
                job_id: job_id.to_string(),
                expected: entry.project_id.clone(),
                actual: project_id.to_string(),
            })
        } else if was_terminal && next.is_terminal() {
            Some(Anomaly::DuplicateTerminal {
                job_id: job_id.to_string(),
            })
        } else if was_terminal {
            Some(Anomaly::AfterTerminal {
                job_id: job_id.to_string(),
            })
        } else if observation == Observation::Start {
            Some(Anomaly::DuplicateStart {
                job_id: job_id.to_string(),
            })
        } else {
            None
        };

        if !was_terminal && next.is_terminal() {
            entry.phase = next;
            self.running.remove(&sequence);
            self.finished.push_back(job_id.to_string());
        }

        Observed {
            sequence,
            anomaly,
            evicted: None,
        }
    }

    /// Phase of a tracked or retired job.
    pub fn phase(&self, job_id: &str) -> Option<JobPhase> {
        self.jobs
            .get(job_id)
            .map(|entry| entry.phase)
            .or_else(|| self.retired.get(job_id).map(|retired| retired.phase))
    }

    /// Sequence of a tracked or retired job.
    pub fn sequence(&self, job_id: &str) -> Option<u64> {
        self.jobs
            .get(job_id)
            .map(|entry| entry.sequence)
            .or_else(|| self.retired.get(job_id).map(|retired| retired.sequence))
    }

    /// Jobs tracked in full.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job ids remembered only by sequence.
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Retire one job if over capacity. Returns an anomaly if it was still running.
    fn make_room(&mut self) -> Option<Anomaly> {
        if self.jobs.len() <= LEDGER_CAPACITY {
            return None;
        }

        if let Some(job_id) = self.finished.pop_front() {
            self.retire(job_id);
            return None;
        }

        let (_, job_id) = self.running.pop_first()?;
        let anomaly = Anomaly::Evicted {
            job_id: job_id.clone(),
        };
        self.retire(job_id);
        Some(anomaly)
    }

    fn retire(&mut self, job_id: String) {
        let Some(entry) = self.jobs.remove(&job_id) else {
            return;
        };

        self.retired.insert(
            job_id.clone(),
            Retired {
                sequence: entry.sequence,
                phase: entry.phase,
            },
        );
        self.retired_order.push_back(job_id);

        while self.retired_order.len() > LEDGER_RETIRED_CAPACITY {
            if let Some(forgotten) = self.retired_order.pop_front() {
                self.retired.remove(&forgotten);
            }
        }
    }
}
