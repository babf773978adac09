mod common;

use axum::http::StatusCode;
use common::test_server::TestServer;
use scanrelay::device::{
    ConnectivityState, ControllerSettings, DeviceController, Dispatch, LinkState,
};
use scanrelay::event::{CardUid, LocalClock, ScanEvent};
use scanrelay::forward::{Forwarder, ForwardingClient, Outcome, TransportErrorKind};
use scanrelay::queue::DurableQueue;
use scanrelay::reconcile::{run_pass, Trigger};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn client_for(server: &TestServer) -> ForwardingClient {
    ForwardingClient::try_new(
        &server.endpoint(),
        Duration::from_secs(5),
        Duration::from_secs(2),
    )
    .unwrap()
}

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("offline_logs.ndjson")
}

async fn open_queue(dir: &TempDir) -> DurableQueue {
    DurableQueue::open(store_path(dir), 1_000, LocalClock::start())
        .await
        .unwrap()
}

fn settings() -> ControllerSettings {
    ControllerSettings {
        location_id: "loc_1".to_string(),
        reconcile_interval: Duration::from_secs(3600),
        scan_debounce: Duration::from_millis(100),
    }
}

fn card(n: u32) -> CardUid {
    CardUid::new(n.to_be_bytes())
}

fn stored_lines(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn posts_event_as_json() {
    let server = TestServer::launch().await.unwrap();
    let client = client_for(&server);

    let event = ScanEvent::new("loc_1", "0x04a1b2c3".parse().unwrap());
    assert_eq!(client.send(&event).await, Outcome::Delivered);

    let received = server.received();
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0].body,
        serde_json::json!({"location": "loc_1", "card_id": "0x04a1b2c3"})
    );
    assert_eq!(
        received[0].content_type.as_deref(),
        Some("application/json")
    );
    server.shutdown();
}

#[tokio::test]
async fn non_200_status_is_rejected() {
    let server = TestServer::launch().await.unwrap();
    let client = client_for(&server);
    let event = ScanEvent::new("loc_1", card(1));

    server.respond_with(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        client.send(&event).await,
        Outcome::Rejected { status: 500 }
    );

    // only 200 counts as delivered
    server.respond_with(StatusCode::CREATED);
    assert_eq!(
        client.send(&event).await,
        Outcome::Rejected { status: 201 }
    );
    server.shutdown();
}

#[tokio::test]
async fn large_rejection_body_is_still_a_rejection() {
    let server = TestServer::launch().await.unwrap();
    let client = client_for(&server);

    server.respond_with_body(StatusCode::BAD_REQUEST, "e".repeat(1 << 20));
    assert_eq!(
        client.send(&ScanEvent::new("loc_1", card(1))).await,
        Outcome::Rejected { status: 400 }
    );
    server.shutdown();
}

#[tokio::test]
async fn slow_endpoint_is_a_transport_timeout() {
    let server = TestServer::launch().await.unwrap();
    server.delay_responses(Duration::from_secs(3));
    let client = ForwardingClient::try_new(
        &server.endpoint(),
        Duration::from_millis(200),
        Duration::from_millis(200),
    )
    .unwrap();

    let outcome = client.send(&ScanEvent::new("loc_1", card(1))).await;
    match outcome {
        Outcome::TransportFailed(e) => assert_eq!(e.kind(), TransportErrorKind::Timeout),
        other => panic!("expected a timeout, got {:?}", other),
    }
    server.shutdown();
}

#[tokio::test]
async fn offline_captures_are_delivered_once_link_returns() {
    let server = TestServer::launch().await.unwrap();
    let dir = TempDir::new().unwrap();
    let link = ConnectivityState::new(LinkState::Unlinked);
    let mut controller = DeviceController::new(
        client_for(&server),
        open_queue(&dir).await,
        link.subscribe(),
        settings(),
    );

    for n in 1..=3 {
        let result = controller.dispatch(card(n)).await;
        assert!(matches!(result, Dispatch::Queued { outcome: None, .. }));
    }
    assert!(server.received().is_empty());
    assert_eq!(stored_lines(&store_path(&dir)), 3);

    link.set(LinkState::Linked);
    let report = controller
        .on_link_observed(LinkState::Linked)
        .await
        .unwrap();

    assert_eq!(report.delivered, 3);
    assert!(report.is_drained());
    assert_eq!(
        server.accepted_cards(),
        ["0x00000001", "0x00000002", "0x00000003"]
    );
    assert!(!store_path(&dir).exists());
    server.shutdown();
}

#[tokio::test]
async fn rejected_events_survive_until_accepted() {
    let server = TestServer::launch().await.unwrap();
    let dir = TempDir::new().unwrap();
    let link = ConnectivityState::new(LinkState::Linked);
    let mut controller = DeviceController::new(
        client_for(&server),
        open_queue(&dir).await,
        link.subscribe(),
        settings(),
    );

    server.respond_with(StatusCode::INTERNAL_SERVER_ERROR);
    for n in 1..=5 {
        let result = controller.dispatch(card(n)).await;
        assert!(matches!(
            result,
            Dispatch::Queued {
                outcome: Some(Outcome::Rejected { status: 500 }),
                ..
            }
        ));
    }

    // still failing: nothing is removed
    let report = controller.reconcile(Trigger::Interval).await.unwrap();
    assert_eq!(report.rejected, 5);
    assert_eq!(report.remaining, 5);
    assert_eq!(stored_lines(&store_path(&dir)), 5);

    server.respond_with(StatusCode::OK);
    let report = controller.reconcile(Trigger::Interval).await.unwrap();
    assert_eq!(report.delivered, 5);
    assert!(report.is_drained());

    let accepted = server.accepted_cards();
    let expected: Vec<String> = (1..=5).map(|n| card(n).to_string()).collect();
    assert_eq!(accepted, expected);
    server.shutdown();
}

#[tokio::test]
async fn backlog_survives_restart() {
    let server = TestServer::launch().await.unwrap();
    let dir = TempDir::new().unwrap();

    {
        let queue = open_queue(&dir).await;
        queue
            .append(ScanEvent::new("loc_1", card(7)))
            .await
            .unwrap();
        queue
            .append(ScanEvent::new("loc_1", card(8)))
            .await
            .unwrap();
    }

    let queue = open_queue(&dir).await;
    assert_eq!(queue.len().await, 2);

    let report = run_pass(&queue, &client_for(&server), Trigger::Manual)
        .await
        .unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(server.accepted_cards(), ["0x00000007", "0x00000008"]);
    assert!(!store_path(&dir).exists());
    server.shutdown();
}

#[tokio::test]
async fn device_loop_queues_offline_and_drains_on_link_up() {
    let server = TestServer::launch().await.unwrap();
    let dir = TempDir::new().unwrap();
    let link = ConnectivityState::new(LinkState::Unlinked);
    let controller = DeviceController::new(
        client_for(&server),
        open_queue(&dir).await,
        link.subscribe(),
        settings(),
    );

    let (tx, rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();
    let path = store_path(&dir);

    let driver = async {
        for n in 1..=3 {
            tx.send(card(n)).await.unwrap();
        }
        wait_until("three queued records", || stored_lines(&path) == 3).await;
        assert!(server.received().is_empty());

        link.set(LinkState::Linked);
        wait_until("backlog delivery", || server.accepted_cards().len() == 3).await;
        wait_until("store removal", || !path.exists()).await;

        tx.send(card(4)).await.unwrap();
        wait_until("live delivery", || server.accepted_cards().len() == 4).await;
        shutdown.cancel();
    };

    let (result, ()) = tokio::join!(controller.run(rx, shutdown.clone()), driver);
    result.unwrap();

    assert_eq!(
        server.accepted_cards(),
        ["0x00000001", "0x00000002", "0x00000003", "0x00000004"]
    );
    server.shutdown();
}
