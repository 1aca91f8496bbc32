//! Integration tests for the worker/dispatcher round trip over a real socket.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;

use socket_worker::{
    CommandHandler, Dispatcher, Result, SocketCommand, SocketResponse, SocketWorkerError,
    SocketWorkerStatus, StatusCell, Worker, WorkerConfig,
};

fn echo(command: SocketCommand) -> SocketResponse {
    SocketResponse::ok()
        .with_data("echo", Value::Object(command.arguments().clone()))
        .reply_to(&command)
}

async fn wait_for_status(path: &Path, expected: SocketWorkerStatus) {
    let cell = StatusCell::open(path);
    for _ in 0..500 {
        if cell.get().unwrap() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("status never reached {expected}");
}

/// Handler that parks until released, so tests can observe `Busy`.
struct GatedHandler {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl CommandHandler for GatedHandler {
    async fn handle(&self, command: SocketCommand) -> Result<SocketResponse> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(SocketResponse::ok().reply_to(&command))
    }
}

struct FailingHandler;

#[async_trait]
impl CommandHandler for FailingHandler {
    async fn handle(&self, command: SocketCommand) -> Result<SocketResponse> {
        Err(SocketWorkerError::Handler {
            reason: format!("cannot handle {}", command.name()),
        })
    }
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_is_echoed() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("echo.sock"));
    let mut worker = Worker::bind(config.clone(), echo).unwrap();

    let server = tokio::spawn(async move { worker.accept().await });

    let dispatcher = Dispatcher::new(&config).unwrap();
    let command = SocketCommand::new("ping").with_argument("x", 1);
    let response = dispatcher.execute(&command, true).await.unwrap().unwrap();

    assert_eq!(
        response,
        SocketResponse::ok().with_data("echo", json!({"x": 1}))
    );
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn payload_survives_the_wire() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("wire.sock"));
    let mut worker = Worker::bind(config.clone(), echo).unwrap();
    let server = tokio::spawn(async move { worker.accept().await });

    let command = SocketCommand::new("store")
        .with_argument("zeta", json!({"nested": [1, 2, 3]}))
        .with_argument("alpha", "multi\nline")
        .with_argument("none", Value::Null)
        .with_id("corr-42");
    let response = Dispatcher::new(&config)
        .unwrap()
        .execute(&command, true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.id(), Some("corr-42"));
    let echoed = response.data()["echo"].as_object().unwrap();
    assert_eq!(echoed, command.arguments());
    let keys: Vec<&str> = echoed.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["zeta", "alpha", "none"]);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn sequential_blocking_calls() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("multi.sock"));
    let mut worker = Worker::bind(config.clone(), echo).unwrap();
    let server = tokio::spawn(async move { worker.serve().await });

    let dispatcher = Dispatcher::new(&config).unwrap();
    for i in 0..5 {
        let command = SocketCommand::new("count").with_argument("i", i);
        let response = dispatcher.execute(&command, true).await.unwrap().unwrap();
        assert!(response.status());
        assert_eq!(response.data()["echo"], json!({"i": i}));
    }

    server.abort();
}

// ---------------------------------------------------------------------------
// Status lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accept_cycle_moves_through_waiting_busy_ready() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("gate.sock"));
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let handler = GatedHandler {
        entered: entered.clone(),
        release: release.clone(),
    };

    let mut worker = Worker::bind(config.clone(), handler).unwrap();
    assert_eq!(worker.status().unwrap(), Some(SocketWorkerStatus::Ready));

    let status_path = config.status_path();
    let server = tokio::spawn(async move {
        let result = worker.accept().await;
        (worker, result)
    });

    wait_for_status(&status_path, SocketWorkerStatus::Waiting).await;

    let dispatcher = Dispatcher::new(&config).unwrap();
    let call_config = config.clone();
    let client = tokio::spawn(async move {
        Dispatcher::new(&call_config)
            .unwrap()
            .execute(&SocketCommand::new("slow").with_id("s1"), true)
            .await
    });

    entered.notified().await;
    assert_eq!(dispatcher.status().unwrap(), Some(SocketWorkerStatus::Busy));

    release.notify_one();
    let response = client.await.unwrap().unwrap().unwrap();
    assert_eq!(response.id(), Some("s1"));

    let (worker, result) = server.await.unwrap();
    result.unwrap();
    assert_eq!(worker.status().unwrap(), Some(SocketWorkerStatus::Ready));
}

#[tokio::test]
async fn stale_socket_file_is_replaced() {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("stale.sock");
    drop(std::os::unix::net::UnixListener::bind(&socket).unwrap());
    assert!(socket.exists());

    let config = WorkerConfig::for_socket(&socket);
    let mut worker = Worker::bind(config.clone(), echo).unwrap();
    assert_eq!(worker.status().unwrap(), Some(SocketWorkerStatus::Ready));

    let server = tokio::spawn(async move { worker.accept().await });
    let response = Dispatcher::new(&config)
        .unwrap()
        .execute(&SocketCommand::new("ping"), true)
        .await
        .unwrap();
    assert!(response.is_some());
    server.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Non-blocking dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_blocking_while_busy_does_not_connect() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("busy.sock"));
    let listener = UnixListener::bind(config.socket_path()).unwrap();
    StatusCell::create(config.status_path(), SocketWorkerStatus::Busy).unwrap();

    let result = Dispatcher::new(&config)
        .unwrap()
        .execute(&SocketCommand::new("ping"), false)
        .await
        .unwrap();
    assert!(result.is_none());

    let pending = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
    assert!(pending.is_err(), "dispatcher should not have connected");
}

#[tokio::test]
async fn non_blocking_while_ready_is_absent() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("ready.sock"));
    let worker = Worker::bind(config.clone(), echo).unwrap();

    let result = Dispatcher::new(&config)
        .unwrap()
        .execute(&SocketCommand::new("ping"), false)
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(worker.status().unwrap(), Some(SocketWorkerStatus::Ready));
}

#[tokio::test]
async fn non_blocking_while_waiting_gets_response() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("wait.sock"));
    let mut worker = Worker::bind(config.clone(), echo).unwrap();
    let server = tokio::spawn(async move { worker.accept().await });

    wait_for_status(&config.status_path(), SocketWorkerStatus::Waiting).await;

    let response = Dispatcher::new(&config)
        .unwrap()
        .execute(&SocketCommand::new("ping").with_argument("y", "z"), false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.data()["echo"], json!({"y": "z"}));
    server.await.unwrap().unwrap();
}

// ---------------------------------------------------------------------------
// Shutdown hook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_hook_removes_status_and_socket() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("stop.sock"));
    let mut worker = Worker::bind(config.clone(), echo)
        .unwrap()
        .with_shutdown_hook(|command, _response, shutdown| {
            if command.name() == "stop" {
                shutdown.shutdown()?;
            }
            Ok(())
        });
    let server = tokio::spawn(async move {
        let result = worker.serve().await;
        (worker, result)
    });

    let dispatcher = Dispatcher::new(&config).unwrap();
    let first = dispatcher.execute(&SocketCommand::new("ping"), true).await.unwrap();
    assert!(first.is_some());
    assert!(StatusCell::open(config.status_path()).exists());

    let last = dispatcher
        .execute(&SocketCommand::new("stop"), true)
        .await
        .unwrap()
        .unwrap();
    assert!(last.status());

    let (worker, result) = server.await.unwrap();
    result.unwrap();
    assert!(worker.is_shut_down());
    assert_eq!(worker.status().unwrap(), None);
    assert!(!StatusCell::open(config.status_path()).exists());
    assert!(!config.socket_path().exists());

    let after = dispatcher.execute(&SocketCommand::new("ping"), true).await.unwrap();
    assert!(after.is_none());
}

#[tokio::test]
async fn shutdown_with_reuse_keeps_socket_file() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("keep.sock")).reuse_socket_file(true);
    let mut worker = Worker::bind(config.clone(), echo)
        .unwrap()
        .with_shutdown_hook(|_command, _response, shutdown| shutdown.shutdown());
    let server = tokio::spawn(async move {
        let result = worker.accept().await;
        (worker, result)
    });

    Dispatcher::new(&config)
        .unwrap()
        .execute(&SocketCommand::new("bye"), true)
        .await
        .unwrap()
        .unwrap();

    let (mut worker, result) = server.await.unwrap();
    result.unwrap();
    assert!(!StatusCell::open(config.status_path()).exists());
    assert!(config.socket_path().exists());

    let err = worker.accept().await.unwrap_err();
    assert!(matches!(err, SocketWorkerError::ShutDown { .. }));
}

#[tokio::test]
async fn hook_that_declines_keeps_worker_running() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("stay.sock"));
    let mut worker = Worker::bind(config.clone(), echo)
        .unwrap()
        .with_shutdown_hook(|_command, response, shutdown| {
            assert!(response.status());
            assert!(!shutdown.is_shut_down());
            Ok(())
        });
    let server = tokio::spawn(async move {
        let result = worker.accept().await;
        (worker, result)
    });

    Dispatcher::new(&config)
        .unwrap()
        .execute(&SocketCommand::new("ping"), true)
        .await
        .unwrap()
        .unwrap();

    let (worker, result) = server.await.unwrap();
    result.unwrap();
    assert!(!worker.is_shut_down());
    assert_eq!(worker.status().unwrap(), Some(SocketWorkerStatus::Ready));
}

// ---------------------------------------------------------------------------
// Failure surfacing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_request_aborts_the_cycle() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("bad.sock"));
    let mut worker = Worker::bind(config.clone(), echo).unwrap();
    let server = tokio::spawn(async move {
        let result = worker.accept().await;
        (worker, result)
    });

    let mut stream = UnixStream::connect(config.socket_path()).await.unwrap();
    stream.write_all(b"this is not json\n").await.unwrap();
    stream.shutdown().await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert!(reply.is_empty());

    let (worker, result) = server.await.unwrap();
    assert!(matches!(result, Err(SocketWorkerError::Decode { .. })));
    assert_eq!(worker.status().unwrap(), Some(SocketWorkerStatus::Ready));
}

#[tokio::test]
async fn handler_error_yields_absent_response() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("fail.sock"));
    let mut worker = Worker::bind(config.clone(), FailingHandler).unwrap();
    let server = tokio::spawn(async move { worker.accept().await });

    let result = Dispatcher::new(&config)
        .unwrap()
        .execute(&SocketCommand::new("explode"), true)
        .await
        .unwrap();
    assert!(result.is_none());

    let err = server.await.unwrap().unwrap_err();
    assert!(matches!(err, SocketWorkerError::Handler { .. }));
}

#[tokio::test]
async fn malformed_response_is_a_hard_error() {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("liar.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();
        writer.write_all(b"{\"status\": \"maybe\"}\n").await.unwrap();
    });

    let err = Dispatcher::new(&WorkerConfig::for_socket(&socket))
        .unwrap()
        .execute(&SocketCommand::new("ping"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, SocketWorkerError::Decode { .. }));
    server.await.unwrap();
}

#[tokio::test]
async fn empty_connection_fails_one_cycle_and_close_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("mute.sock"));
    let mut worker = Worker::bind(config.clone(), echo).unwrap();
    let server = tokio::spawn(async move {
        let result = worker.accept().await;
        (worker, result)
    });

    drop(UnixStream::connect(config.socket_path()).await.unwrap());

    let (mut worker, result) = server.await.unwrap();
    assert!(matches!(result, Err(SocketWorkerError::Decode { .. })));
    assert_eq!(worker.status().unwrap(), Some(SocketWorkerStatus::Ready));
    assert!(!worker.is_shut_down());

    worker.close().unwrap();
    assert_eq!(worker.status().unwrap(), None);
    assert!(!config.socket_path().exists());
    let err = worker.accept().await.unwrap_err();
    assert!(matches!(err, SocketWorkerError::ShutDown { .. }));
}

// ---------------------------------------------------------------------------
// Abandoned cycles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timed_out_accept_returns_to_ready() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("idle.sock"));
    let mut worker = Worker::bind(config.clone(), echo).unwrap();

    let cycle = tokio::time::timeout(Duration::from_millis(50), worker.accept()).await;
    assert!(cycle.is_err());
    assert_eq!(worker.status().unwrap(), Some(SocketWorkerStatus::Ready));

    let dispatch = tokio::time::timeout(
        Duration::from_secs(5),
        Dispatcher::new(&config)
            .unwrap()
            .execute(&SocketCommand::new("ping"), false),
    )
    .await;
    assert!(dispatch.unwrap().unwrap().is_none());
}

#[tokio::test]
async fn abandoned_handler_returns_to_ready() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("stuck.sock"));
    let entered = Arc::new(Notify::new());
    let handler = GatedHandler {
        entered: entered.clone(),
        release: Arc::new(Notify::new()),
    };
    let mut worker = Worker::bind(config.clone(), handler).unwrap();

    let call_config = config.clone();
    let client = tokio::spawn(async move {
        Dispatcher::new(&call_config)
            .unwrap()
            .execute(&SocketCommand::new("slow"), true)
            .await
    });

    tokio::select! {
        result = worker.accept() => panic!("cycle finished early: {result:?}"),
        _ = entered.notified() => {}
    }
    assert_eq!(worker.status().unwrap(), Some(SocketWorkerStatus::Ready));

    let response = tokio::time::timeout(Duration::from_secs(5), client)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(response.is_none());
}

// ---------------------------------------------------------------------------
// Frame limits
// ---------------------------------------------------------------------------

fn blob_handler(command: SocketCommand) -> SocketResponse {
    SocketResponse::ok()
        .with_data("blob", "x".repeat(200))
        .reply_to(&command)
}

#[tokio::test]
async fn oversized_response_fails_on_the_worker() {
    let tmp = TempDir::new().unwrap();
    let mut config = WorkerConfig::for_socket(tmp.path().join("tight.sock"));
    config.max_message_bytes = 64;
    let mut worker = Worker::bind(config.clone(), blob_handler).unwrap();
    let server = tokio::spawn(async move {
        let result = worker.accept().await;
        (worker, result)
    });

    let result = Dispatcher::new(&config)
        .unwrap()
        .execute(&SocketCommand::new("big"), true)
        .await
        .unwrap();
    assert!(result.is_none());

    let (worker, result) = server.await.unwrap();
    assert!(matches!(
        result,
        Err(SocketWorkerError::FrameTooLarge { limit: 64 })
    ));
    assert_eq!(worker.status().unwrap(), Some(SocketWorkerStatus::Ready));
}

#[tokio::test]
async fn oversized_request_fails_on_the_worker() {
    let tmp = TempDir::new().unwrap();
    let mut config = WorkerConfig::for_socket(tmp.path().join("narrow.sock"));
    config.max_message_bytes = 64;
    let mut worker = Worker::bind(config.clone(), echo).unwrap();
    let server = tokio::spawn(async move { worker.accept().await });

    let mut stream = UnixStream::connect(config.socket_path()).await.unwrap();
    let line = format!("{{\"name\":\"{}\"}}\n", "n".repeat(200));
    stream.write_all(line.as_bytes()).await.unwrap();
    let mut reply = Vec::new();
    let _ = stream.read_to_end(&mut reply).await;
    assert!(reply.is_empty());

    let err = server.await.unwrap().unwrap_err();
    assert!(matches!(err, SocketWorkerError::FrameTooLarge { limit: 64 }));
}

#[tokio::test]
async fn response_over_dispatcher_limit_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let config = WorkerConfig::for_socket(tmp.path().join("wide.sock"));
    let mut worker = Worker::bind(config.clone(), blob_handler).unwrap();
    let server = tokio::spawn(async move { worker.accept().await });

    let mut small = config.clone();
    small.max_message_bytes = 64;
    let err = Dispatcher::new(&small)
        .unwrap()
        .execute(&SocketCommand::new("big"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, SocketWorkerError::FrameTooLarge { limit: 64 }));

    server.await.unwrap().unwrap();
}
