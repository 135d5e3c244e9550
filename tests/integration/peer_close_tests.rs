//! Worker behaviour when the connection breaks underneath it.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::test_helpers::{
    bind_local, harness, local_config, spawn_single_accept, wait_terminal, TEST_DEADLINE,
};
use wirequeue::{AppError, WorkerState};

#[tokio::test]
async fn peer_close_fails_worker_and_records_error() {
    let (addr, accepted) = spawn_single_accept().await;
    let mut h = harness(local_config(addr));
    h.worker.start().await.expect("start");

    let server_side = accepted.await.expect("accepted");
    drop(server_side);

    let status = wait_terminal(&h.worker).await;
    assert_eq!(status.state, WorkerState::Failed);
    let err = status.last_error.expect("error recorded");
    assert!(err.contains("connection closed by peer"), "got: {err}");
    assert_eq!(h.worker.last_error().as_deref(), Some(err.as_str()));

    // Stopping a failed worker only joins the finished task.
    h.worker.stop().await.expect("stop after failure");
    assert_eq!(h.worker.state(), WorkerState::Failed);
}

#[tokio::test]
async fn data_sent_before_close_is_still_delivered() {
    let (addr, accepted) = spawn_single_accept().await;
    let mut h = harness(local_config(addr));
    h.worker.start().await.expect("start");

    let mut server_side = accepted.await.expect("accepted");
    server_side.write_all(b"last words").await.expect("write");
    server_side.shutdown().await.expect("shutdown");
    drop(server_side);

    wait_terminal(&h.worker).await;

    let mut collected = Vec::new();
    while let Ok(message) = h.worker.receive(Duration::from_millis(100)).await {
        collected.extend_from_slice(&message);
    }
    assert_eq!(collected, b"last words");
}

#[tokio::test]
async fn send_after_failure_is_queued_but_never_written() {
    let (addr, accepted) = spawn_single_accept().await;
    let mut h = harness(local_config(addr));
    h.worker.start().await.expect("start");
    drop(accepted.await.expect("accepted"));
    wait_terminal(&h.worker).await;

    h.worker.send("too late");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let still_queued = h.outbound.try_pop().await;
    assert_eq!(still_queued.as_deref(), Some(&b"too late"[..]));
}

#[tokio::test]
async fn receive_in_flight_during_peer_close_only_times_out() {
    let (addr, accepted) = spawn_single_accept().await;
    let mut h = harness(local_config(addr));
    h.worker.start().await.expect("start");
    let server_side = accepted.await.expect("accepted");

    let receive = h.worker.receive(Duration::from_millis(400));
    let closer = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(server_side);
    };
    let (result, ()) = tokio::join!(receive, closer);

    assert!(
        matches!(result, Err(AppError::ReceiveTimeout(_))),
        "got: {result:?}"
    );
    let status = wait_terminal(&h.worker).await;
    assert_eq!(status.state, WorkerState::Failed);
    assert!(tokio::time::timeout(TEST_DEADLINE, h.worker.stop()).await.is_ok());
}

#[tokio::test]
async fn write_failure_fails_worker_with_write_error() {
    let (listener, addr) = bind_local().await;
    let mut client = TcpStream::connect(addr).await.expect("connect");
    // Keep the server side open so the read path stays idle.
    let (_server_side, _) = listener.accept().await.expect("accept");
    client.shutdown().await.expect("shut down write side");

    let mut h = harness(local_config(addr));
    h.worker.attach(client).expect("attach");
    h.worker.send("never delivered");

    let status = wait_terminal(&h.worker).await;
    assert_eq!(status.state, WorkerState::Failed);
    let err = status.last_error.expect("error recorded");
    assert!(err.starts_with("write:"), "got: {err}");

    h.worker.stop().await.expect("stop after failure");
    assert_eq!(h.worker.state(), WorkerState::Failed);
}
