// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle scenarios driven through the runtime with a scripted fake
//! supervisor and a real temp-dir state store.

use super::*;
use car_core::{FlowStatus, FlowType, HandoffMode, SystemClock};
use car_storage::{HubStore, Manifest, RepoEntry, RepoKind, RepoStore};
use car_supervisor::{FakeBehavior, FakeSessions, FakeTurn};
use car_ticket::parse_ticket;
use serde_json::json;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    hub: HubStore,
    repo: RepoStore,
    repo_id: RepoId,
    fake: FakeSessions,
    runtime: FlowRuntime<FakeSessions, SystemClock>,
}

fn fixture(config: FlowConfig) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let hub_dir = tmp.path().join("hub");
    let repo_dir = tmp.path().join("repo");
    fs::create_dir_all(&repo_dir).unwrap();

    let hub = HubStore::new(&hub_dir);
    let repo_id = RepoId::new("demo");
    let mut manifest = Manifest::default();
    manifest.upsert(
        repo_id.clone(),
        RepoEntry {
            path: repo_dir.clone(),
            kind: RepoKind::Base,
            worktree_of: None,
            initialized: true,
            destination: None,
        },
    );
    hub.save_manifest(&manifest).unwrap();

    let repo = hub.repo_store(&repo_dir);
    let fake = FakeSessions::new();
    let runtime = FlowRuntime::new(
        hub.clone(),
        EventBus::new(),
        fake.clone(),
        SystemClock,
        config,
    );
    Fixture {
        _tmp: tmp,
        hub,
        repo,
        repo_id,
        fake,
        runtime,
    }
}

fn test_config() -> FlowConfig {
    FlowConfig {
        turn_cap: 3,
        stop_timeout: Duration::from_millis(300),
        ..FlowConfig::default()
    }
}

fn write_ticket(fixture: &Fixture, name: &str) {
    let dir = fixture.repo.tickets_dir();
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(name),
        format!("---\ntitle: {}\nagent: codex\ndone: false\n---\nDo it.\n", name),
    )
    .unwrap();
}

fn complete_turn() -> FakeTurn {
    FakeTurn::done(json!({"ticket_complete": true}))
}

async fn wait_for_status(repo: &RepoStore, run_id: &RunId, status: FlowStatus) -> car_core::FlowRun {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let run = repo.load_run(run_id).unwrap();
        if run.status == status {
            return run;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "run never reached {status}, stuck at {}",
            run.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn happy_path_completes_both_tickets() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-001.md");
    write_ticket(&fixture, "TICKET-002.md");
    fixture.fake.push_turn(complete_turn());
    fixture.fake.push_turn(complete_turn());

    let mut events = fixture.runtime.bus().subscribe(None, 256);
    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    assert!(outcome.hint.is_none());
    assert_eq!(outcome.run.status, FlowStatus::Pending);

    let run = wait_for_status(&fixture.repo, &outcome.run.run_id, FlowStatus::Completed).await;
    let engine = run.state.ticket_engine.unwrap();
    assert_eq!(engine.total_turns, 2);

    // Both ticket files flipped to done.
    for name in ["TICKET-001.md", "TICKET-002.md"] {
        let content = fs::read_to_string(fixture.repo.tickets_dir().join(name)).unwrap();
        let (front, _) = parse_ticket(&content, name).unwrap();
        assert!(front.done, "{name} not done");
    }

    // Tickets were worked in index order on one reused session.
    let submitted = fixture.fake.submitted();
    assert_eq!(submitted.len(), 2);
    assert!(submitted[0].req.client_turn_id.contains(":1:"));
    assert!(submitted[1].req.client_turn_id.contains(":2:"));
    assert_eq!(fixture.fake.opened().len(), 1);
    assert_eq!(
        fixture.fake.opened()[0].thread_key,
        format!("ticket_flow.{}", fixture.repo_id)
    );

    // Lifecycle events in order, ending with the terminal marker.
    let drained = events.drain();
    let types: Vec<&str> = drained
        .iter()
        .map(|e| match e {
            FlowEvent::FlowStarted { .. } => "started",
            FlowEvent::StepStarted { .. } => "step",
            FlowEvent::FlowCompleted { .. } => "completed",
            FlowEvent::StreamClosed { .. } => "closed",
            _ => "other",
        })
        .collect();
    assert_eq!(types, vec!["started", "step", "step", "completed", "closed"]);
}

#[tokio::test]
async fn bootstrap_without_tickets_is_precondition_failed() {
    let fixture = fixture(test_config());
    let err = fixture.runtime.bootstrap(&fixture.repo_id).unwrap_err();
    assert!(matches!(err, FlowError::PreconditionFailed(_)));
}

#[tokio::test]
async fn bootstrap_unknown_repo_is_not_found() {
    let fixture = fixture(test_config());
    let err = fixture.runtime.bootstrap(&RepoId::new("ghost")).unwrap_err();
    assert!(matches!(err, FlowError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bootstraps_yield_one_run() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-001.md");
    // The single turn hangs, keeping the run active.
    fixture.fake.push_turn(FakeTurn {
        events: Vec::new(),
        behavior: FakeBehavior::WaitForInterrupt,
    });

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let runtime = fixture.runtime.clone();
            let repo_id = fixture.repo_id.clone();
            tokio::task::spawn_blocking(move || runtime.bootstrap(&repo_id))
        })
        .collect();
    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap().unwrap());
    }

    let fresh: Vec<_> = outcomes.iter().filter(|o| o.hint.is_none()).collect();
    let reused: Vec<_> = outcomes
        .iter()
        .filter(|o| o.hint == Some(ACTIVE_RUN_REUSED))
        .collect();
    assert_eq!(fresh.len(), 1);
    assert_eq!(reused.len(), 7);
    for outcome in &reused {
        assert_eq!(outcome.run.run_id, fresh[0].run.run_id);
    }

    // Clean shutdown so the hanging turn doesn't outlive the test.
    fixture
        .runtime
        .stop(&fixture.repo_id, &fresh[0].run.run_id)
        .await
        .unwrap();
    wait_for_status(&fixture.repo, &fresh[0].run.run_id, FlowStatus::Stopped).await;
}

#[tokio::test]
async fn pause_handoff_pauses_then_resume_finishes() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-001.md");
    fixture.fake.push_turn(FakeTurn::done(json!({
        "ticket_complete": false,
        "handoff": {"mode": "pause", "title": "Pick a color", "body": "red or blue?"}
    })));
    fixture.fake.push_turn(complete_turn());

    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    let run_id = outcome.run.run_id.clone();

    wait_for_status(&fixture.repo, &run_id, FlowStatus::Paused).await;
    let handoffs = fixture.repo.list_handoffs(&run_id).unwrap();
    assert_eq!(handoffs.len(), 1);
    assert_eq!(handoffs[0].seq, 1);
    assert_eq!(handoffs[0].mode, HandoffMode::Pause);

    fixture.runtime.resume(&fixture.repo_id, &run_id).await.unwrap();
    let run = wait_for_status(&fixture.repo, &run_id, FlowStatus::Completed).await;
    // Same run id throughout; no new run was created.
    assert_eq!(run.run_id, run_id);
    assert_eq!(fixture.repo.list_runs(FlowType::TicketFlow).unwrap().len(), 1);
}

#[tokio::test]
async fn resume_of_running_run_is_invalid() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-001.md");
    fixture.fake.push_turn(FakeTurn {
        events: Vec::new(),
        behavior: FakeBehavior::WaitForInterrupt,
    });

    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    wait_for_status(&fixture.repo, &outcome.run.run_id, FlowStatus::Running).await;

    let err = fixture
        .runtime
        .resume(&fixture.repo_id, &outcome.run.run_id)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidTransition { .. }));

    fixture
        .runtime
        .stop(&fixture.repo_id, &outcome.run.run_id)
        .await
        .unwrap();
    wait_for_status(&fixture.repo, &outcome.run.run_id, FlowStatus::Stopped).await;
}

#[tokio::test]
async fn cooperative_stop_interrupts_the_turn() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-001.md");
    fixture.fake.push_turn(FakeTurn {
        events: Vec::new(),
        behavior: FakeBehavior::WaitForInterrupt,
    });

    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    let run_id = outcome.run.run_id.clone();
    wait_for_status(&fixture.repo, &run_id, FlowStatus::Running).await;
    // Let the engine reach the turn before stopping.
    tokio::time::sleep(Duration::from_millis(50)).await;

    fixture.runtime.stop(&fixture.repo_id, &run_id).await.unwrap();
    let run = wait_for_status(&fixture.repo, &run_id, FlowStatus::Stopped).await;
    assert!(run.is_terminal());
    assert!(!fixture.fake.interrupts().is_empty());
}

#[tokio::test]
async fn ignored_interrupt_escalates_to_stop_timeout() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-001.md");
    // An agent that ignores the interrupt entirely.
    fixture.fake.push_turn(FakeTurn {
        events: Vec::new(),
        behavior: FakeBehavior::Hang,
    });

    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    let run_id = outcome.run.run_id.clone();
    wait_for_status(&fixture.repo, &run_id, FlowStatus::Running).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    fixture.runtime.stop(&fixture.repo_id, &run_id).await.unwrap();
    let run = wait_for_status(&fixture.repo, &run_id, FlowStatus::Failed).await;
    let engine = run.state.ticket_engine.unwrap();
    assert_eq!(engine.reason.as_deref(), Some("stop_timeout"));
}

#[tokio::test]
async fn destination_unavailable_fails_without_spawning() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-001.md");
    fixture.fake.fail_open("cannot connect to docker daemon");

    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    let run = wait_for_status(&fixture.repo, &outcome.run.run_id, FlowStatus::Failed).await;
    let engine = run.state.ticket_engine.unwrap();
    assert_eq!(engine.reason.as_deref(), Some("destination_unavailable"));
    assert!(fixture.fake.submitted().is_empty());
}

#[tokio::test]
async fn turn_cap_marks_ticket_errored_and_moves_on() {
    let fixture = fixture(FlowConfig {
        turn_cap: 2,
        ..test_config()
    });
    write_ticket(&fixture, "TICKET-001.md");
    write_ticket(&fixture, "TICKET-002.md");
    // Ticket 1 never completes; after the cap it is skipped. Ticket 2
    // completes on its first turn.
    fixture.fake.push_turn(FakeTurn::done(json!({"ticket_complete": false})));
    fixture.fake.push_turn(FakeTurn::done(json!({"ticket_complete": false})));
    fixture.fake.push_turn(complete_turn());

    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    let run = wait_for_status(&fixture.repo, &outcome.run.run_id, FlowStatus::Completed).await;

    let engine = run.state.ticket_engine.unwrap();
    assert_eq!(
        engine.errored_tickets.get(&1).map(|s| s.as_str()),
        Some("turn_cap_exceeded")
    );
    // Ticket 1 was not marked done.
    let content =
        fs::read_to_string(fixture.repo.tickets_dir().join("TICKET-001.md")).unwrap();
    let (front, _) = parse_ticket(&content, "TICKET-001.md").unwrap();
    assert!(!front.done);
}

#[tokio::test]
async fn malformed_ticket_is_skipped_with_error_recorded() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-002.md");
    fs::write(
        fixture.repo.tickets_dir().join("TICKET-001.md"),
        "no frontmatter\n",
    )
    .unwrap();
    fixture.fake.push_turn(complete_turn());

    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    let run = wait_for_status(&fixture.repo, &outcome.run.run_id, FlowStatus::Completed).await;
    let engine = run.state.ticket_engine.unwrap();
    assert!(engine
        .reason_details
        .unwrap()
        .contains("TICKET-001.md"));
}

#[tokio::test]
async fn archive_requires_terminal_or_force() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-001.md");
    fixture.fake.push_turn(complete_turn());

    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    let run_id = outcome.run.run_id.clone();
    wait_for_status(&fixture.repo, &run_id, FlowStatus::Completed).await;

    let moved = fixture.runtime.archive(&fixture.repo_id, &run_id, false).unwrap();
    assert_eq!(moved, 1);
    assert!(fixture
        .repo
        .root()
        .tickets_archive_dir(&run_id)
        .unwrap()
        .join("TICKET-001.md")
        .exists());
    assert!(fixture.repo.load_run(&run_id).unwrap().archived);
}

#[tokio::test]
async fn archive_of_paused_run_needs_force() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-001.md");
    fixture.fake.push_turn(FakeTurn::done(json!({
        "handoff": {"mode": "pause", "title": "hold"}
    })));

    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    let run_id = outcome.run.run_id.clone();
    wait_for_status(&fixture.repo, &run_id, FlowStatus::Paused).await;

    let err = fixture
        .runtime
        .archive(&fixture.repo_id, &run_id, false)
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidTransition { .. }));
    fixture.runtime.archive(&fixture.repo_id, &run_id, true).unwrap();
}

#[tokio::test]
async fn stream_deltas_reach_subscribers_and_ring() {
    let fixture = fixture(test_config());
    write_ticket(&fixture, "TICKET-001.md");
    fixture.fake.push_turn(
        FakeTurn::done(json!({"ticket_complete": true})).with_events(vec![
            car_supervisor::SessionEvent::Token("building\n".to_string()),
            car_supervisor::SessionEvent::AppServer(json!({
                "method": "exec_command_begin",
                "params": {"command": "cargo check"}
            })),
        ]),
    );

    let mut events = fixture.runtime.bus().subscribe(None, 256);
    let outcome = fixture.runtime.bootstrap(&fixture.repo_id).unwrap();
    wait_for_status(&fixture.repo, &outcome.run.run_id, FlowStatus::Completed).await;

    let drained = events.drain();
    assert!(drained
        .iter()
        .any(|e| matches!(e, FlowEvent::AgentStreamDelta { text, .. } if text == "building\n")));
    assert!(drained.iter().any(|e| matches!(
        e,
        FlowEvent::AppServerEvent { event, .. }
            if event.kind == car_core::AppServerEventKind::Command
    )));
}
