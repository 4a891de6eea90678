//! Operator control channel over both endpoint kinds.

mod common;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use common::eventually;
use gpu_watchdog::actuator::restart_queue;
use gpu_watchdog::observability::metrics::{metric_sink, RestartReason};
use gpu_watchdog::sources::control::{ControlError, MAX_MESSAGE_BYTES};
use gpu_watchdog::sources::{ControlEndpoint, ControlHandler, ControlKind};
use gpu_watchdog::{RestartRequest, ServiceSet, Shutdown};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

fn services() -> ServiceSet {
    ServiceSet::from_names(["sd", "upscaler"]).unwrap()
}

async fn next_request(rx: &mut mpsc::Receiver<RestartRequest>) -> RestartRequest {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no restart request")
        .expect("queue closed")
}

#[tokio::test]
async fn rejected_messages_enqueue_nothing() {
    let (queue, mut rx) = restart_queue(10);
    let (sink, _worker, _handle) = metric_sink();
    let handler = ControlHandler::new(services(), queue, sink, RestartReason::Timeout);

    assert_eq!(
        handler.handle_message("restart postgres").await,
        Err(ControlError::NotAllowed("postgres".into()))
    );
    assert!(matches!(
        handler.handle_message("restart").await,
        Err(ControlError::Malformed(_))
    ));
    assert!(matches!(
        handler.handle_message("reboot sd").await,
        Err(ControlError::UnknownCommand(_))
    ));
    assert!(rx.try_recv().is_err());

    assert_eq!(handler.handle_message("restart upscaler\n").await, Ok("upscaler".into()));
    assert_eq!(rx.try_recv().unwrap().service, "upscaler");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn only_primary_restarts_are_counted() {
    let (queue, _rx) = restart_queue(10);
    let (sink, worker, handle) = metric_sink();
    let shutdown = Shutdown::new();
    tokio::spawn(worker.run(shutdown.subscribe()));
    let handler = ControlHandler::new(services(), queue, sink, RestartReason::Manual);

    handler.handle_message("restart upscaler").await.unwrap();
    handler.handle_message("restart sd").await.unwrap();

    assert!(eventually(|| handle.render().contains(r#"restarts{reason="manual"} 1"#)).await);
    assert!(!handle.render().contains("timeout"));
}

#[tokio::test]
async fn socket_endpoint_accepts_one_message_per_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run").join("control.sock");
    let (queue, mut rx) = restart_queue(10);
    let (sink, _worker, _handle) = metric_sink();
    let handler = ControlHandler::new(services(), queue, sink, RestartReason::Timeout);

    let endpoint = ControlEndpoint::create(path.clone(), ControlKind::Socket, handler).unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(endpoint.run(shutdown.subscribe()));

    for message in ["restart postgres\n", "restart upscaler\n", "restart sd"] {
        let mut client = UnixStream::connect(&path).await.unwrap();
        client.write_all(message.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();
    }

    assert_eq!(next_request(&mut rx).await.service, "upscaler");
    assert_eq!(next_request(&mut rx).await.service, "sd");

    shutdown.trigger();
    task.await.unwrap();
    assert!(!path.exists());
}

fn write_fifo(path: PathBuf, message: &'static str) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut fifo = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        fifo.write_all(message.as_bytes()).unwrap();
    })
}

#[tokio::test]
async fn fifo_endpoint_reads_one_message_per_writer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control");
    let (queue, mut rx) = restart_queue(10);
    let (sink, _worker, _handle) = metric_sink();
    let handler = ControlHandler::new(services(), queue, sink, RestartReason::Timeout);

    let endpoint = ControlEndpoint::create(path.clone(), ControlKind::Fifo, handler).unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(endpoint.run(shutdown.subscribe()));

    write_fifo(path.clone(), "restart sd").await.unwrap();
    assert_eq!(next_request(&mut rx).await.service, "sd");

    write_fifo(path.clone(), "restart upscaler\n").await.unwrap();
    assert_eq!(next_request(&mut rx).await.service, "upscaler");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("FIFO reader did not stop")
        .unwrap();
}

#[tokio::test]
async fn oversized_fifo_message_is_drained_and_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control");
    let (queue, mut rx) = restart_queue(10);
    let (sink, _worker, _handle) = metric_sink();
    let handler = ControlHandler::new(services(), queue, sink, RestartReason::Timeout);

    let endpoint = ControlEndpoint::create(path.clone(), ControlKind::Fifo, handler).unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(endpoint.run(shutdown.subscribe()));

    // One write-then-close message whose tail would parse on its own.
    let writer_path = path.clone();
    tokio::task::spawn_blocking(move || {
        let mut fifo = std::fs::OpenOptions::new()
            .write(true)
            .open(writer_path)
            .unwrap();
        fifo.write_all(&vec![b'x'; MAX_MESSAGE_BYTES as usize]).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        fifo.write_all(b"restart sd").unwrap();
    })
    .await
    .unwrap();

    write_fifo(path.clone(), "restart upscaler").await.unwrap();
    assert_eq!(next_request(&mut rx).await.service, "upscaler");
    assert!(rx.try_recv().is_err());

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fifo_shutdown_does_not_wait_for_a_stalled_writer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control");
    let (queue, mut rx) = restart_queue(10);
    let (sink, _worker, _handle) = metric_sink();
    let handler = ControlHandler::new(services(), queue, sink, RestartReason::Timeout);

    let endpoint = ControlEndpoint::create(path.clone(), ControlKind::Fifo, handler).unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(endpoint.run(shutdown.subscribe()));

    let (opened_tx, opened_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let writer_path = path.clone();
    let writer = std::thread::spawn(move || {
        let mut fifo = std::fs::OpenOptions::new()
            .write(true)
            .open(writer_path)
            .unwrap();
        fifo.write_all(b"restart sd").unwrap();
        opened_tx.send(()).unwrap();
        let _ = release_rx.recv();
    });
    opened_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("endpoint waited on a stalled writer")
        .unwrap();

    release_tx.send(()).unwrap();
    writer.join().unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn oversized_socket_message_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control.sock");
    let (queue, mut rx) = restart_queue(10);
    let (sink, _worker, _handle) = metric_sink();
    let handler = ControlHandler::new(services(), queue, sink, RestartReason::Timeout);

    let endpoint = ControlEndpoint::create(path.clone(), ControlKind::Socket, handler).unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(endpoint.run(shutdown.subscribe()));

    let mut oversized = vec![b' '; MAX_MESSAGE_BYTES as usize];
    oversized.splice(0..0, b"restart sd".iter().copied());
    for message in [oversized, b"restart upscaler\n".to_vec()] {
        let mut client = UnixStream::connect(&path).await.unwrap();
        // The server may hang up after the limit; that is fine here.
        let _ = client.write_all(&message).await;
        let _ = client.shutdown().await;
    }

    assert_eq!(next_request(&mut rx).await.service, "upscaler");
    assert!(rx.try_recv().is_err());

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn endpoint_path_taken_by_regular_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control");
    std::fs::write(&path, b"not a pipe").unwrap();

    let (queue, _rx) = restart_queue(10);
    let (sink, _worker, _handle) = metric_sink();
    let handler = ControlHandler::new(services(), queue, sink, RestartReason::Timeout);

    for kind in [ControlKind::Fifo, ControlKind::Socket] {
        let err = ControlEndpoint::create(path.clone(), kind, handler.clone())
            .err()
            .expect("regular file accepted");
        assert_eq!(err.path, path);
    }
}
