// Unit tests for event routing into the chat and project stores

use crate::codec::{JobEvent, decode_event};
use crate::router::{
    Anomaly, EventRouter, JobLedger, JobPhase, LEDGER_CAPACITY, LEDGER_RETIRED_CAPACITY,
    Observation, RouteOutcome, RouterStats,
};
use crate::sync::{MemoryChatStore, MemoryProjectStore, Sender, StateSync};

use std::sync::Arc;

use serde_json::json;

struct Fixture {
    router: EventRouter,
    sync: StateSync,
    chat: Arc<MemoryChatStore>,
    projects: Arc<MemoryProjectStore>,
}

fn fixture() -> Fixture {
    let chat = Arc::new(MemoryChatStore::new());
    let projects = Arc::new(MemoryProjectStore::new());
    let sync = StateSync::new(chat.clone(), projects.clone());
    Fixture {
        router: EventRouter::new(sync.clone()),
        sync,
        chat,
        projects,
    }
}

fn started(job_id: &str, project_id: &str) -> JobEvent {
    JobEvent::Started {
        job_id: job_id.to_string(),
        project_id: project_id.to_string(),
    }
}

fn completed(job_id: &str, project_id: &str, artifact: Option<&[u8]>) -> JobEvent {
    JobEvent::Completed {
        job_id: job_id.to_string(),
        project_id: project_id.to_string(),
        result: format!("{job_id} done"),
        artifact: artifact.map(<[u8]>::to_vec),
    }
}

// ============================================
// SCENARIOS
// ============================================

/// **VALUE**: Scenario A: a started job announces itself in the project's chat.
#[tokio::test]
async fn given_job_started_when_dispatched_then_appends_system_message() {
    let f = fixture();
    let event = decode_event(br#"{"type":"job_started","job_id":"j1","project_id":"p1"}"#).unwrap();

    let outcome = f.router.dispatch(event);
    f.sync.flush().await.unwrap();

    assert_eq!(outcome, RouteOutcome::Applied);
    let messages = f.chat.messages("p1");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, Sender::System);
    assert_eq!(messages[0].content, "Job started: j1");
    assert_eq!(messages[0].job_id.as_deref(), Some("j1"));
}

/// **VALUE**: Scenario B: a completed job posts its result and replaces the preview.
///
/// **WHY THIS MATTERS**: This is the payoff of every prompt: the rendered model
/// shows up in the viewer.
#[tokio::test]
async fn given_job_completed_when_dispatched_then_appends_result_and_sets_preview() {
    let f = fixture();
    f.router.dispatch(started("j1", "p1"));
    let event = decode_event(
        br#"{"type":"job_completed","job_id":"j1","project_id":"p1","result":"ok","base64data":"Z2xURg=="}"#,
    )
    .unwrap();

    let outcome = f.router.dispatch(event);
    f.sync.flush().await.unwrap();

    assert_eq!(outcome, RouteOutcome::Applied);
    let messages = f.chat.messages("p1");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].sender, Sender::Agent);
    assert!(messages[1].content.contains("ok"));
    assert_eq!(messages[1].content, "Result: ok");
    assert_eq!(f.projects.preview("p1"), Some(b"glTF".to_vec()));
}

#[tokio::test]
async fn given_tool_call_when_dispatched_then_summarizes_tool_input_and_output() {
    let f = fixture();
    f.router.dispatch(started("j1", "p1"));

    f.router.dispatch(JobEvent::ToolCall {
        job_id: "j1".to_string(),
        project_id: "p1".to_string(),
        tool: "add_cube".to_string(),
        input: json!({"size": 2}),
        output: json!("created Cube"),
    });
    f.sync.flush().await.unwrap();

    let messages = f.chat.messages("p1");
    assert_eq!(messages[1].sender, Sender::Agent);
    assert_eq!(
        messages[1].content,
        r#"Tool: add_cube, Input: {"size":2}, Output: created Cube"#
    );
}

#[tokio::test]
async fn given_job_failed_when_dispatched_then_appends_error_verbatim() {
    let f = fixture();
    f.router.dispatch(started("j1", "p1"));

    let outcome = f.router.dispatch(JobEvent::Failed {
        job_id: "j1".to_string(),
        project_id: "p1".to_string(),
        error: "Blender exited with code 1".to_string(),
    });
    f.sync.flush().await.unwrap();

    assert_eq!(outcome, RouteOutcome::Applied);
    let messages = f.chat.messages("p1");
    assert_eq!(messages[1].sender, Sender::System);
    assert_eq!(messages[1].content, "Blender exited with code 1");
    assert_eq!(f.projects.preview("p1"), None);
}

// ============================================
// OUT-OF-ORDER AND DUPLICATE DELIVERY
// ============================================

/// **VALUE**: A duplicated completion appends twice but sets the preview once.
///
/// **WHY THIS MATTERS**: Messages are an audit trail and are never deduplicated;
/// the preview is state and must not be rewritten by a replay.
///
/// **BUG THIS CATCHES**: Artifact writes that are not idempotent per job, or a
/// router that silently drops the second message.
#[tokio::test]
async fn given_duplicate_completion_when_dispatched_then_preview_set_once_and_both_messages_kept() {
    let f = fixture();
    f.router.dispatch(started("j1", "p1"));

    let first = f.router.dispatch(completed("j1", "p1", Some(&b"v1"[..])));
    let second = f.router.dispatch(completed("j1", "p1", Some(&b"v1"[..])));
    f.sync.flush().await.unwrap();

    assert_eq!(first, RouteOutcome::Applied);
    assert_eq!(
        second,
        RouteOutcome::AppliedWithAnomaly(Anomaly::DuplicateTerminal {
            job_id: "j1".to_string()
        })
    );
    assert_eq!(f.projects.revision("p1"), 1);
    let results: Vec<_> = f
        .chat
        .messages("p1")
        .into_iter()
        .filter(|m| m.sender == Sender::Agent)
        .collect();
    assert_eq!(results.len(), 2);
}

/// **VALUE**: An older job finishing late cannot clobber a newer job's preview.
///
/// **BUG THIS CATCHES**: Plain last-write-wins on completion order, which shows the
/// user a stale model after a quick follow-up prompt.
#[tokio::test]
async fn given_superseded_job_completing_late_when_dispatched_then_keeps_newer_preview() {
    let f = fixture();
    f.router.dispatch(started("old", "p1"));
    f.router.dispatch(started("new", "p1"));

    f.router.dispatch(completed("new", "p1", Some(&b"newer"[..])));
    f.router.dispatch(completed("old", "p1", Some(&b"older"[..])));
    f.sync.flush().await.unwrap();

    assert_eq!(f.projects.preview("p1"), Some(b"newer".to_vec()));
    assert_eq!(f.projects.revision("p1"), 1);
    assert_eq!(f.chat.messages("p1").len(), 4);
}

#[tokio::test]
async fn given_completion_without_start_when_dispatched_then_applies_defensively() {
    let f = fixture();

    let outcome = f.router.dispatch(completed("ghost", "p1", Some(&b"model"[..])));
    f.sync.flush().await.unwrap();

    assert_eq!(
        outcome,
        RouteOutcome::AppliedWithAnomaly(Anomaly::MissingStart {
            job_id: "ghost".to_string()
        })
    );
    assert_eq!(f.chat.messages("p1").len(), 1);
    assert_eq!(f.projects.preview("p1"), Some(b"model".to_vec()));
    assert_eq!(f.router.stats().anomalies, 1);
}

#[tokio::test]
async fn given_completion_without_artifact_when_dispatched_then_preview_untouched() {
    let f = fixture();
    f.router.dispatch(started("j1", "p1"));

    f.router.dispatch(completed("j1", "p1", None));
    f.sync.flush().await.unwrap();

    assert_eq!(f.chat.messages("p1").len(), 2);
    assert_eq!(f.projects.preview("p1"), None);
}

// ============================================
// NOTICES AND UNKNOWN EVENTS
// ============================================

/// **VALUE**: Unknown events change nothing but are counted.
#[tokio::test]
async fn given_unknown_event_when_dispatched_then_ignored_and_counted() {
    let f = fixture();

    let outcome = f.router.dispatch(JobEvent::Unknown {
        kind: "job_progress".to_string(),
        raw: json!({"type": "job_progress", "project_id": "p1"}),
    });
    f.sync.flush().await.unwrap();

    assert_eq!(outcome, RouteOutcome::Ignored);
    assert!(f.chat.messages("p1").is_empty());
    assert_eq!(
        f.router.stats(),
        RouterStats {
            dispatched: 1,
            unknown: 1,
            anomalies: 0,
            notices: 0,
        }
    );
}

#[tokio::test]
async fn given_notice_events_when_dispatched_then_counted_without_store_writes() {
    let f = fixture();

    let outcomes = [
        f.router.dispatch(JobEvent::Queued {
            job_id: "j1".to_string(),
            position: Some(2),
            estimated_wait: Some(30),
        }),
        f.router.dispatch(JobEvent::Debug {
            job_id: "j1".to_string(),
            project_id: "p1".to_string(),
            message: "planning".to_string(),
        }),
        f.router.dispatch(JobEvent::PeerError {
            message: "Missing prompt".to_string(),
        }),
    ];
    f.sync.flush().await.unwrap();

    assert!(outcomes.iter().all(|o| *o == RouteOutcome::Noticed));
    assert!(f.chat.messages("p1").is_empty());
    assert_eq!(f.router.stats().notices, 3);
    assert_eq!(f.router.stats().dispatched, 3);
}

/// **VALUE**: A replayed completion for a long-finished job cannot replace the
/// preview of a job that started after it.
///
/// **WHY THIS MATTERS**: After a reconnect the peer may resend a completion the
/// client saw hundreds of jobs ago. The replay must rank by the job's original
/// arrival, not as a brand-new job.
///
/// **BUG THIS CATCHES**: Renumbering a job id once it has left the ledger, which
/// makes the stale artifact look like the newest one.
#[tokio::test]
async fn given_replayed_completion_of_retired_job_when_dispatched_then_keeps_newer_preview() {
    // GIVEN: An old job finished on p1, then enough traffic on p2 to retire it
    let f = fixture();
    f.router.dispatch(started("old", "p1"));
    f.router.dispatch(completed("old", "p1", Some(&b"OLD"[..])));
    for n in 0..(LEDGER_CAPACITY + 76) {
        let job_id = format!("p2-job-{n}");
        f.router.dispatch(started(&job_id, "p2"));
        f.router.dispatch(completed(&job_id, "p2", None));
    }
    f.router.dispatch(started("new", "p1"));
    f.router.dispatch(completed("new", "p1", Some(&b"NEW"[..])));
    f.sync.flush().await.unwrap();
    assert_eq!(f.projects.preview("p1"), Some(b"NEW".to_vec()));

    // WHEN: The old completion is replayed
    let outcome = f.router.dispatch(completed("old", "p1", Some(&b"OLD"[..])));
    f.sync.flush().await.unwrap();

    // THEN: It is recorded as a duplicate and the newer preview stays
    assert_eq!(
        outcome,
        RouteOutcome::AppliedWithAnomaly(Anomaly::DuplicateTerminal {
            job_id: "old".to_string()
        })
    );
    assert_eq!(f.projects.preview("p1"), Some(b"NEW".to_vec()));
    assert_eq!(f.projects.revision("p1"), 2);
}

#[tokio::test]
async fn given_jobs_that_never_finish_when_ledger_overflows_then_evictions_counted() {
    let f = fixture();

    for n in 0..(LEDGER_CAPACITY + 6) {
        f.router.dispatch(started(&format!("stuck-{n}"), "p1"));
    }
    f.sync.flush().await.unwrap();

    assert_eq!(f.router.stats().anomalies, 6);
    assert_eq!(f.chat.messages("p1").len(), LEDGER_CAPACITY + 6);
}

// ============================================
// LEDGER
// ============================================

#[test]
fn given_events_for_new_jobs_when_observed_then_sequences_follow_arrival() {
    let mut ledger = JobLedger::default();

    let first = ledger.observe("a", "p1", Observation::Start).sequence;
    let second = ledger.observe("b", "p1", Observation::Progress).sequence;
    let again = ledger.observe("a", "p1", Observation::Complete).sequence;

    assert_eq!((first, second, again), (1, 2, 1));
    assert_eq!(ledger.phase("a"), Some(JobPhase::Completed));
    assert_eq!(ledger.phase("b"), Some(JobPhase::Running));
}

#[test]
fn given_misordered_events_when_observed_then_reports_each_anomaly() {
    let mut ledger = JobLedger::default();

    assert_eq!(ledger.observe("j", "p1", Observation::Start).anomaly, None);
    assert_eq!(
        ledger.observe("j", "p1", Observation::Start).anomaly,
        Some(Anomaly::DuplicateStart { job_id: "j".to_string() })
    );
    assert_eq!(ledger.observe("j", "p1", Observation::Fail).anomaly, None);
    assert_eq!(
        ledger.observe("j", "p1", Observation::Progress).anomaly,
        Some(Anomaly::AfterTerminal { job_id: "j".to_string() })
    );
    assert_eq!(
        ledger.observe("j", "p1", Observation::Complete).anomaly,
        Some(Anomaly::DuplicateTerminal { job_id: "j".to_string() })
    );
    assert_eq!(ledger.phase("j"), Some(JobPhase::Failed));
    assert!(matches!(
        ledger.observe("j", "p2", Observation::Progress).anomaly,
        Some(Anomaly::ProjectMismatch { .. })
    ));
}

/// **VALUE**: The ledger does not grow without bound over a long session.
#[test]
fn given_many_finished_jobs_when_observed_then_oldest_are_retired_with_their_sequence() {
    let mut ledger = JobLedger::default();

    for n in 0..(LEDGER_CAPACITY + 10) {
        let job_id = format!("job-{n}");
        ledger.observe(&job_id, "p1", Observation::Start);
        ledger.observe(&job_id, "p1", Observation::Complete);
    }

    assert_eq!(ledger.len(), LEDGER_CAPACITY);
    assert_eq!(ledger.retired_len(), 10);
    assert_eq!(ledger.sequence("job-0"), Some(1));
    assert_eq!(ledger.phase("job-0"), Some(JobPhase::Completed));
    assert_eq!(ledger.sequence("job-1033"), Some(1034));

    let replay = ledger.observe("job-0", "p1", Observation::Complete);
    assert_eq!(replay.sequence, 1);
    assert_eq!(
        replay.anomaly,
        Some(Anomaly::DuplicateTerminal { job_id: "job-0".to_string() })
    );
}

/// **VALUE**: Jobs the peer lost (e.g. across a peer restart) cannot fill memory.
///
/// **BUG THIS CATCHES**: A cap that only counts finished jobs, so started-but-never-
/// finished jobs accumulate for the whole session.
#[test]
fn given_jobs_that_never_finish_when_observed_then_ledger_stays_bounded() {
    // GIVEN: An empty ledger
    let mut ledger = JobLedger::default();

    // WHEN: Ten thousand jobs start and none finish
    let evicted = (0..10_000)
        .filter(|n| {
            ledger
                .observe(&format!("stuck-{n}"), "p1", Observation::Start)
                .evicted
                .is_some()
        })
        .count();

    // THEN: The ledger is capped, every overflow is reported, oldest go first
    assert_eq!(ledger.len(), LEDGER_CAPACITY);
    assert_eq!(evicted, 10_000 - LEDGER_CAPACITY);
    assert!(ledger.retired_len() <= LEDGER_RETIRED_CAPACITY);
    assert_eq!(ledger.sequence("stuck-9999"), Some(10_000));
    assert_eq!(ledger.phase("stuck-9999"), Some(JobPhase::Running));
}

#[test]
fn given_running_job_evicted_when_it_later_completes_then_keeps_original_sequence() {
    let mut ledger = JobLedger::default();
    ledger.observe("slow", "p1", Observation::Start);

    let first_overflow = (0..LEDGER_CAPACITY)
        .map(|n| ledger.observe(&format!("stuck-{n}"), "p1", Observation::Start))
        .find_map(|observed| observed.evicted);
    assert_eq!(
        first_overflow,
        Some(Anomaly::Evicted { job_id: "slow".to_string() })
    );

    let late = ledger.observe("slow", "p1", Observation::Complete);
    assert_eq!(late.sequence, 1);
    assert_eq!(
        late.anomaly,
        Some(Anomaly::AfterEviction { job_id: "slow".to_string() })
    );
    assert_eq!(ledger.phase("slow"), Some(JobPhase::Completed));
    assert_eq!(
        ledger.observe("slow", "p1", Observation::Complete).anomaly,
        Some(Anomaly::DuplicateTerminal { job_id: "slow".to_string() })
    );
}
