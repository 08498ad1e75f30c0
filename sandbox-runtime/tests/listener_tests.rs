//! Integration tests for the frame's message listener

use parking_lot::Mutex;
use sandbox_runtime::{
    install, Frame, FrameOptions, Function, RuntimeState, Scope, ScriptResult, Value,
};
use sandbox_types::{channel, HostMessage, HostPort, RuntimeMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn execute(code: &str) -> HostMessage {
    HostMessage::ExecuteCode { code: code.to_string() }
}

#[tokio::test]
async fn test_announces_ready_once() {
    let (mut host, runtime) = channel();
    let frame = Arc::new(Mutex::new(Frame::standard()));
    let _listener = install(Arc::clone(&frame), runtime).unwrap();

    let first = timeout(WAIT, host.recv()).await.unwrap();
    assert_eq!(first, Some(RuntimeMessage::FrameReady));
    assert_eq!(frame.lock().state(), RuntimeState::Ready);

    host.send(execute("function App() { return <p>hi</p>; }")).unwrap();
    host.send(execute("function App() { return missing; }")).unwrap();
    let reply = timeout(WAIT, host.recv()).await.unwrap().unwrap();
    let RuntimeMessage::ExecutionError { error, stack } = reply else {
        panic!("expected EXECUTION_ERROR");
    };
    assert_eq!(error, "missing is not defined");
    let stack = stack.unwrap();
    assert!(stack.starts_with("ReferenceError: missing is not defined\n    at App (App.jsx:1:"), "{}", stack);
}

#[tokio::test]
async fn test_success_is_silent() {
    let (mut host, runtime) = channel();
    let frame = Arc::new(Mutex::new(Frame::standard()));
    let _listener = install(Arc::clone(&frame), runtime).unwrap();
    assert_eq!(timeout(WAIT, host.recv()).await.unwrap(), Some(RuntimeMessage::FrameReady));

    host.send(execute("function App() { return <p>one</p>; }")).unwrap();
    host.send(execute("function App() { return <p>two</p>; }")).unwrap();
    host.send(execute("function App() { throw new Error('three'); }")).unwrap();

    let reply = timeout(WAIT, host.recv()).await.unwrap().unwrap();
    match reply {
        RuntimeMessage::ExecutionError { error, .. } => assert_eq!(error, "three"),
        other => panic!("unexpected message: {:?}", other),
    }
    assert!(host.try_recv().is_none());
}

#[tokio::test]
async fn test_teardown_stops_listening() {
    let (mut host, runtime) = channel();
    let frame = Arc::new(Mutex::new(Frame::standard()));
    let mut listener = install(Arc::clone(&frame), runtime).unwrap();
    assert_eq!(timeout(WAIT, host.recv()).await.unwrap(), Some(RuntimeMessage::FrameReady));
    assert!(listener.is_running());

    listener.teardown();
    assert!(!listener.is_running());
    assert!(host.send(execute("function App() { return null; }")).is_err());
    assert_eq!(timeout(WAIT, host.recv()).await.unwrap(), None);
}

#[tokio::test]
async fn test_stops_when_host_goes_away() {
    let (host, runtime) = channel();
    let frame = Arc::new(Mutex::new(Frame::standard()));
    let mut listener = install(Arc::clone(&frame), runtime).unwrap();
    drop(host);
    listener.teardown();
    assert!(!listener.is_running());
}

async fn next_error(host: &mut HostPort) -> String {
    match timeout(WAIT, host.recv()).await.unwrap() {
        Some(RuntimeMessage::ExecutionError { error, .. }) => error,
        other => panic!("expected EXECUTION_ERROR, got {:?}", other),
    }
}

#[tokio::test]
async fn test_keeps_serving_after_oversized_allocation() {
    let (mut host, runtime) = channel();
    let frame = Arc::new(Mutex::new(Frame::standard()));
    let listener = install(Arc::clone(&frame), runtime).unwrap();
    assert_eq!(timeout(WAIT, host.recv()).await.unwrap(), Some(RuntimeMessage::FrameReady));

    host.send(execute("function App() { return <p>{'ab'.repeat(1e19)}</p>; }")).unwrap();
    assert_eq!(next_error(&mut host).await, "Invalid string length");

    host.send(execute("const x = 1;")).unwrap();
    assert_eq!(next_error(&mut host).await, "App is not defined");
    assert!(listener.is_running());
}

#[tokio::test]
async fn test_panic_is_reported_and_listener_survives() {
    let explode = Function::native("explode", |_, _| -> ScriptResult<Value> {
        panic!("native blew up")
    });
    let scope = Scope::standard().with("explode", Value::Function(explode));
    let (mut host, runtime) = channel();
    let frame = Arc::new(Mutex::new(Frame::new(scope, FrameOptions::default())));
    let listener = install(Arc::clone(&frame), runtime).unwrap();
    assert_eq!(timeout(WAIT, host.recv()).await.unwrap(), Some(RuntimeMessage::FrameReady));

    host.send(execute("function App() { explode(); return null; }")).unwrap();
    assert_eq!(next_error(&mut host).await, "Internal error: native blew up");

    host.send(execute("const x = 1;")).unwrap();
    assert_eq!(next_error(&mut host).await, "App is not defined");
    assert!(listener.is_running());
    assert_eq!(frame.lock().state(), RuntimeState::Ready);
}
