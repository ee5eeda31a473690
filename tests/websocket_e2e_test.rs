// ABOUTME: End-to-end WebSocket tests against a server bound to an ephemeral port
// ABOUTME: Connects with tokio-tungstenite, streams samples and checks predictions and errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{create_manager, create_resources, RichScorer};
use cpet_realtime_server::realtime::SessionManager;
use cpet_realtime_server::routes::build_router;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, Arc<SessionManager>) {
    let scorer = Arc::new(RichScorer {
        probability: 0.9,
        crossing_time_index: None,
        peak_value: Some(21.0),
    });
    let manager = create_manager(scorer, None);
    let router = build_router(&create_resources(Arc::clone(&manager)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, manager)
}

async fn connect(addr: SocketAddr, session_id: &str) -> Client {
    let url = format!("ws://{addr}/api/ws/realtime/{session_id}");
    let (client, _) = connect_async(url).await.unwrap();
    client
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_samples_stream_back_as_predictions() {
    let (addr, manager) = start_server().await;
    let mut client = connect(addr, "e2e-1").await;

    let connected = next_json(&mut client).await;
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["session_id"], "e2e-1");
    assert_eq!(connected["mode"], "live");

    for t in [10.0, 20.0, 30.0] {
        let sample = json!({ "type": "sample", "timestamp": t, "vo2": 1800, "work_rate": 120, "rer": 1.0 });
        client.send(Message::Text(sample.to_string())).await.unwrap();
    }

    let mut last = Value::Null;
    for _ in 0..3 {
        last = next_json(&mut client).await;
        assert_eq!(last["type"], "prediction");
    }
    assert_eq!(last["at_triggered"], true);
    assert_eq!(last["data_count"], 3);
    assert_eq!(last["sample"]["work_rate"], 120.0);
    assert_eq!(last["vo2_peak_prediction"]["weber_class"], "A");
    assert_eq!(manager.active_sessions(), 1);

    client.close(None).await.unwrap();
    for _ in 0..50 {
        if manager.active_sessions() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(manager.active_sessions(), 0);
}

#[tokio::test]
async fn test_bad_messages_report_errors_and_keep_the_session() {
    let (addr, manager) = start_server().await;
    let mut client = connect(addr, "e2e-2").await;
    next_json(&mut client).await;

    client
        .send(Message::Text("not json".to_owned()))
        .await
        .unwrap();
    let error = next_json(&mut client).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "INVALID_FORMAT");

    client
        .send(Message::Text(json!({ "type": "pause" }).to_string()))
        .await
        .unwrap();
    let error = next_json(&mut client).await;
    assert_eq!(error["code"], "INVALID_INPUT");

    client
        .send(Message::Text(json!({ "vo2": 1200 }).to_string()))
        .await
        .unwrap();
    let error = next_json(&mut client).await;
    assert_eq!(error["code"], "MISSING_REQUIRED_FIELD");

    assert_eq!(manager.summary("e2e-2").await.unwrap().samples, 0);
}

#[tokio::test]
async fn test_second_socket_for_a_session_is_rejected() {
    let (addr, manager) = start_server().await;
    let mut first = connect(addr, "e2e-3").await;
    next_json(&mut first).await;

    let mut second = connect(addr, "e2e-3").await;
    let error = next_json(&mut second).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "RESOURCE_LOCKED");

    assert!(manager.is_connected("e2e-3"));
}
