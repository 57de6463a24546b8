/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for livefeed-adapter tests

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use livefeed_adapter::{ClientConfig, SnapshotClient};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Snapshot client pointed at the mock server's `/api/v1` prefix
pub fn snapshot_client(server: &MockServer) -> SnapshotClient {
    SnapshotClient::with_config_and_base_url(
        ClientConfig::default(),
        &format!("{}/api/v1", server.uri()),
    )
    .expect("client init")
}

/// Single-connection WebSocket server.
///
/// Every text frame the client sends is forwarded to `received` as JSON; every
/// string pushed into the returned sender is written back to the client.
pub struct StreamServer {
    pub url: String,
    pub received: mpsc::UnboundedReceiver<Value>,
    pub push: mpsc::UnboundedSender<String>,
}

pub async fn spawn_stream_server() -> StreamServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (received_tx, received) = mpsc::unbounded_channel();
    let (push, mut push_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        let Ok(ws) = tokio_tungstenite::accept_async(socket).await else {
            return;
        };
        let (mut write, mut read) = ws.split();
        loop {
            tokio::select! {
                outgoing = push_rx.recv() => match outgoing {
                    Some(text) => {
                        if write.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(value) = serde_json::from_str(text.as_str()) {
                            let _ = received_tx.send(value);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    });

    StreamServer {
        url: format!("ws://{addr}"),
        received,
        push,
    }
}
