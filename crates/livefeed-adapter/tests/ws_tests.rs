/*
[INPUT]:  WebSocket test scenarios against a local stream server
[OUTPUT]: Test results for the market stream
[POS]:    Integration tests - WebSocket
[UPDATE]: When WebSocket session or routing changes
*/

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::spawn_stream_server;
use livefeed_adapter::{MarketStream, Room, SendOutcome, SessionEvent, SessionState};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(5);

async fn wait_event(events: &mut broadcast::Receiver<SessionEvent>, wanted: SessionEvent) {
    let result = timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if event == wanted => return,
                Ok(_) => continue,
                Err(err) => panic!("event channel closed: {err}"),
            }
        }
    })
    .await;
    assert_ok!(result);
}

#[test]
fn test_stream_default_is_closed() {
    let stream = MarketStream::default();
    assert_eq!(stream.state(), SessionState::Closed);
    assert_eq!(stream.session().url(), "ws://localhost:8081/ws");
}

#[tokio::test]
async fn test_queued_messages_flush_in_call_order() {
    let mut server = spawn_stream_server().await;
    let stream = MarketStream::new(server.url.clone());
    let mut events = stream.events();

    stream.subscribe(&Room::depth("SOL_USDC"));
    stream.subscribe(&Room::trade("SOL_USDC"));
    stream.unsubscribe(&Room::depth("SOL_USDC"));

    assert_ok!(stream.open());
    // Second open while connecting is a no-op.
    assert_ok!(stream.open());
    wait_event(&mut events, SessionEvent::Opened).await;
    assert_eq!(stream.state(), SessionState::Open);

    assert_eq!(
        stream.subscribe(&Room::ticker("SOL_USDC")),
        SendOutcome::Sent { id: 4 }
    );

    let mut frames: Vec<Value> = Vec::new();
    for _ in 0..4 {
        let frame = assert_ok!(timeout(WAIT, server.received.recv()).await);
        frames.push(frame.expect("server closed"));
    }

    let seen: Vec<(&str, &str, u64)> = frames
        .iter()
        .map(|frame| {
            (
                frame["type"].as_str().unwrap_or_default(),
                frame["payload"]["room"].as_str().unwrap_or_default(),
                frame["id"].as_u64().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        seen,
        vec![
            ("SUBSCRIBE", "depth@SOL_USDC", 1),
            ("SUBSCRIBE", "trade@SOL_USDC", 2),
            ("UNSUBSCRIBE", "depth@SOL_USDC", 3),
            ("SUBSCRIBE", "ticker@SOL_USDC", 4),
        ]
    );

    stream.close();
    assert_eq!(stream.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_pushed_depth_reaches_listener() {
    let server = spawn_stream_server().await;
    let stream = MarketStream::new(server.url.clone());
    let mut events = stream.events();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    stream.register_depth("SOL_USDC", move |depth| {
        sink.lock().push(depth.clone());
        let _ = done_tx.send(());
    });

    stream.subscribe(&Room::depth("SOL_USDC"));
    assert_ok!(stream.open());
    wait_event(&mut events, SessionEvent::Opened).await;

    // Frame for a room nobody listens on, then the real one.
    assert_ok!(server.push.send(
        r#"{"room":"depth@BTC_USDC","data":"{\"a\":[[\"1\",\"1\"]]}"}"#.to_string()
    ));
    assert_ok!(server.push.send(
        r#"{"room":"depth@SOL_USDC","data":"{\"stream\":\"depth@SOL_USDC\",\"data\":{\"a\":[[\"101\",\"2\"]],\"b\":[[\"99\",\"3\"]],\"e\":\"depth\"}}"}"#
            .to_string()
    ));

    assert_ok!(timeout(WAIT, done_rx.recv()).await);
    let books = received.lock().clone();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].asks[0].price().to_string(), "101");
    assert_eq!(books[0].bids[0].quantity().to_string(), "3");

    let stats = stream.router_stats();
    assert_eq!(stats.frames, 2);
    assert_eq!(stats.decoded, 1);
    assert_eq!(stats.dispatched, 1);
}

#[tokio::test]
async fn test_connection_failure_reports_error_and_closes() {
    // Bind then drop to get a port nothing listens on.
    let listener = assert_ok!(tokio::net::TcpListener::bind("127.0.0.1:0").await);
    let addr = assert_ok!(listener.local_addr());
    drop(listener);

    let stream = MarketStream::new(format!("ws://{addr}"));
    let mut events = stream.events();
    stream.subscribe(&Room::trade("SOL_USDC"));
    assert_ok!(stream.open());

    let first = assert_ok!(timeout(WAIT, events.recv()).await);
    assert!(matches!(first, Ok(SessionEvent::Error(_))));
    wait_event(&mut events, SessionEvent::Closed).await;
    assert_eq!(stream.state(), SessionState::Closed);

    // Nothing was transmitted, so the subscribe is still waiting.
    assert_eq!(stream.session().pending(), 1);
}
