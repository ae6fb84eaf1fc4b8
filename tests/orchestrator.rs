use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ioc_scoreboard::api::ScoreApi;
use ioc_scoreboard::error::ApiError;
use ioc_scoreboard::fake_api::FakeApi;
use ioc_scoreboard::models::{AdminAction, CompetitionPhase};
use ioc_scoreboard::op::Op;
use ioc_scoreboard::orchestrator::{ActionOrchestrator, Invocation, Resync};
use ioc_scoreboard::poller::Poller;

const WAIT: Duration = Duration::from_secs(5);

struct CountingResync(AtomicUsize);

impl Resync for CountingResync {
    fn resync(&self) -> bool {
        self.0.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[test]
fn overlapping_invocations_run_the_action_once() {
    let orchestrator = Arc::new(ActionOrchestrator::new());
    let executions = Arc::new(AtomicUsize::new(0));
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let first = {
        let orchestrator = orchestrator.clone();
        let executions = executions.clone();
        thread::spawn(move || {
            orchestrator.invoke(
                || {
                    executions.fetch_add(1, Ordering::SeqCst);
                    let _ = entered_tx.send(());
                    let _ = release_rx.recv();
                    Ok::<_, ApiError>("first")
                },
                "Competition started",
            )
        })
    };
    entered_rx.recv_timeout(WAIT).expect("first action should start");
    assert!(orchestrator.is_busy());
    assert_eq!(orchestrator.last(), Op::Pending);

    let second = orchestrator.invoke(
        || {
            executions.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ApiError>("second")
        },
        "Competition started",
    );
    assert_eq!(second, Invocation::Skipped);

    release_tx.send(()).expect("release first");
    let first = first.join().expect("first thread");
    assert_eq!(first, Invocation::Succeeded("first"));
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert!(!orchestrator.is_busy());
    assert_eq!(
        orchestrator.last(),
        Op::Success("Competition started".to_string())
    );
}

#[test]
fn busy_flag_clears_after_failure() {
    let orchestrator = ActionOrchestrator::new();

    let outcome = orchestrator.invoke(
        || {
            Err::<(), _>(ApiError::Action(
                "Reset data failed: Cannot reset data while competition is running".to_string(),
            ))
        },
        "Competition data reset",
    );

    assert_eq!(
        outcome,
        Invocation::Failed(
            "Reset data failed: Cannot reset data while competition is running".to_string()
        )
    );
    assert!(!orchestrator.is_busy());
    assert_eq!(
        orchestrator.last(),
        Op::Failure("Reset data failed: Cannot reset data while competition is running".to_string())
    );

    let again = orchestrator.invoke(|| Ok::<_, ApiError>(()), "Competition data reset");
    assert_eq!(again, Invocation::Succeeded(()));
}

#[test]
fn transport_failures_keep_their_prefix() {
    let orchestrator = ActionOrchestrator::new();
    let outcome = orchestrator.invoke(
        || Err::<(), _>(ApiError::Transport("connection refused".to_string())),
        "Checks run",
    );
    assert_eq!(
        outcome,
        Invocation::Failed("transport error: connection refused".to_string())
    );
}

#[test]
fn resync_follows_success_only() {
    let resync = Arc::new(CountingResync(AtomicUsize::new(0)));
    let orchestrator = ActionOrchestrator::with_resync(resync.clone());

    orchestrator.invoke(|| Ok::<_, ApiError>(()), "IOCs deployed");
    orchestrator.invoke(
        || Err::<(), _>(ApiError::Action("Deploy IOCs failed: nope".to_string())),
        "IOCs deployed",
    );

    assert_eq!(resync.0.load(Ordering::SeqCst), 1);
}

#[test]
fn status_feed_reflects_action_without_waiting_for_a_tick() {
    let api = Arc::new(FakeApi::seeded());
    let token = api
        .login(&ioc_scoreboard::models::Credential::new("admin", "admin"))
        .expect("admin login")
        .token;
    let token = Arc::new(Mutex::new(token));

    let status = {
        let api = api.clone();
        let token = token.clone();
        Poller::start("status", Duration::from_secs(60), move || {
            let token = token.lock().expect("token").clone();
            api.system_status(Some(&token))
        })
    };
    let handle = status.handle();
    assert!(handle.wait_for_cycles(1, WAIT));
    assert_eq!(
        handle.snapshot().and_then(|s| s.phase()),
        Some(CompetitionPhase::NotStarted)
    );

    let orchestrator = ActionOrchestrator::with_resync(Arc::new(handle.clone()));
    let outcome = orchestrator.invoke(
        || {
            let token = token.lock().expect("token").clone();
            api.run_action(AdminAction::StartCompetition, Some(&token))
        },
        AdminAction::StartCompetition.success_label(),
    );

    assert!(matches!(
        outcome,
        Invocation::Succeeded(ref reply) if reply.message == "Competition started"
    ));
    assert_eq!(handle.state().cycles, 2);
    assert_eq!(
        handle.snapshot().and_then(|s| s.phase()),
        Some(CompetitionPhase::Running)
    );
    assert_eq!(api.phase(), CompetitionPhase::Running);

    let second = orchestrator.invoke(
        || {
            let token = token.lock().expect("token").clone();
            api.run_action(AdminAction::StartCompetition, Some(&token))
        },
        AdminAction::StartCompetition.success_label(),
    );
    assert_eq!(
        second,
        Invocation::Failed("Start competition failed: Competition already running".to_string())
    );
    assert_eq!(handle.state().cycles, 2);
}
