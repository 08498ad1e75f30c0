//! Timing and readiness tests for the host controller

use parking_lot::Mutex;
use sandbox_host::{spawn_in_process, HostController, HostStatus, SandboxConfig};
use sandbox_types::{channel, Failure, HostMessage, RuntimeMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

fn code(message: Option<HostMessage>) -> String {
    match message {
        Some(HostMessage::ExecuteCode { code }) => code,
        None => panic!("channel closed"),
    }
}

/// Let the controller task process whatever is queued
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_edits_within_quiet_period_coalesce() {
    let (host, mut runtime) = channel();
    runtime.send(RuntimeMessage::FrameReady).unwrap();
    let start = Instant::now();
    let handle = HostController::new(host, "v0").spawn();

    sleep(Duration::from_millis(100)).await;
    handle.edit("v1");
    sleep(Duration::from_millis(100)).await;
    handle.edit("v2");
    sleep(Duration::from_millis(290)).await;
    handle.edit("v3");

    assert_eq!(code(runtime.recv().await), "v3");
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_millis(990) && elapsed < Duration::from_millis(1000),
        "{:?}",
        elapsed
    );

    sleep(Duration::from_secs(5)).await;
    assert!(runtime.try_recv().is_none());
    assert_eq!(handle.dispatch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_initial_source_is_dispatched() {
    let (host, mut runtime) = channel();
    runtime.send(RuntimeMessage::FrameReady).unwrap();
    let start = Instant::now();
    let _handle = HostController::new(host, "initial").spawn();

    assert_eq!(code(runtime.recv().await), "initial");
    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_edit_pending_at_deadline_wins() {
    let (host, mut runtime) = channel();
    runtime.send(RuntimeMessage::FrameReady).unwrap();
    let start = Instant::now();
    let handle = HostController::new(host, "v0").spawn();

    // Both the edit and the expired deadline are pending on the first poll
    handle.edit("v1");
    tokio::time::advance(Duration::from_millis(600)).await;

    assert_eq!(code(runtime.recv().await), "v1");
    assert!(start.elapsed() >= Duration::from_millis(500));
    sleep(Duration::from_secs(5)).await;
    assert!(runtime.try_recv().is_none());
    assert_eq!(handle.dispatch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_nothing_sent_before_ready() {
    let (host, mut runtime) = channel();
    let handle = HostController::new(host, "v0").spawn();

    handle.edit("v1");
    sleep(Duration::from_secs(2)).await;
    handle.edit("v2");
    sleep(Duration::from_secs(2)).await;
    assert!(runtime.try_recv().is_none());
    assert_eq!(handle.status(), HostStatus::Loading);
    assert_eq!(handle.dispatch_count(), 0);

    runtime.send(RuntimeMessage::FrameReady).unwrap();
    assert_eq!(code(runtime.recv().await), "v2");
    assert_eq!(handle.status(), HostStatus::Ready);
    assert!(runtime.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_ready_before_quiet_period_waits_for_timer() {
    let (host, mut runtime) = channel();
    let start = Instant::now();
    let handle = HostController::new(host, "v0").spawn();

    sleep(Duration::from_millis(200)).await;
    runtime.send(RuntimeMessage::FrameReady).unwrap();
    settle().await;
    assert!(handle.is_ready());
    assert!(runtime.try_recv().is_none());

    assert_eq!(code(runtime.recv().await), "v0");
    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_ready_is_idempotent() {
    let (host, mut runtime) = channel();
    let handle = HostController::new(host, "v0").spawn();
    sleep(Duration::from_secs(1)).await;

    runtime.send(RuntimeMessage::FrameReady).unwrap();
    runtime.send(RuntimeMessage::FrameReady).unwrap();
    assert_eq!(code(runtime.recv().await), "v0");

    sleep(Duration::from_secs(2)).await;
    assert!(runtime.try_recv().is_none());
    assert_eq!(handle.dispatch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failures_reach_hook_without_redispatch() {
    let (host, mut runtime) = channel();
    let seen = Arc::new(Mutex::new(Vec::<Failure>::new()));
    let sink = Arc::clone(&seen);
    let handle = HostController::new(host, "const x = 1;")
        .quiet_period(Duration::from_millis(50))
        .on_failure(move |failure| sink.lock().push(failure.clone()))
        .spawn();
    runtime.send(RuntimeMessage::FrameReady).unwrap();
    assert_eq!(code(runtime.recv().await), "const x = 1;");

    runtime
        .send(RuntimeMessage::ExecutionError {
            error: "App is not defined".to_string(),
            stack: None,
        })
        .unwrap();
    settle().await;

    assert_eq!(*seen.lock(), [Failure::new("App is not defined")]);
    assert_eq!(handle.last_failure(), Some(Failure::new("App is not defined")));
    assert_eq!(handle.source(), "const x = 1;");

    sleep(Duration::from_secs(1)).await;
    assert!(runtime.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drops_the_port() {
    let (host, mut runtime) = channel();
    let handle = HostController::new(host, "v0").spawn();
    handle.shutdown().await;
    assert_eq!(runtime.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_closed_resolves_when_runtime_goes_away() {
    let (host, runtime) = channel();
    let handle = HostController::new(host, "v0").spawn();

    assert!(timeout(Duration::from_secs(1), handle.closed()).await.is_err());
    drop(runtime);
    timeout(Duration::from_secs(1), handle.closed()).await.unwrap();
    handle.edit("ignored");
    handle.shutdown().await;
}

#[tokio::test]
async fn test_in_process_round_trip() {
    let mut config = SandboxConfig::default();
    config.debounce_ms = 20;
    let sandbox = spawn_in_process("function App() { return <p>first</p>; }", &config).unwrap();

    let waited = timeout(Duration::from_secs(5), async {
        while sandbox.frame().lock().rendered_html() != "<p>first</p>" {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "first render never arrived");
    assert!(sandbox.handle.is_ready());

    sandbox.handle.edit("const x = 1;");
    let waited = timeout(Duration::from_secs(5), async {
        while sandbox.handle.last_failure().is_none() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "failure never arrived");

    let failure = sandbox.handle.last_failure().unwrap();
    assert_eq!(failure.message, "App is not defined");
    assert_eq!(sandbox.frame().lock().rendered_html(), "");
    assert_eq!(sandbox.handle.dispatch_count(), 2);
}
