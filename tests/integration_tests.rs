//! End-to-end integration tests — real server on an OS-assigned port,
//! WebSocket clients, and the `/health` status query.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use huddle_server::Dispatcher;
use huddle_transport::{TransportConfig, TransportServer};
use serde_json::{Value, json};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a test server on a random port.
async fn start_test_server() -> (u16, Arc<Dispatcher>) {
    let config = TransportConfig {
        port: 0, // OS-assigned
        hostname: "127.0.0.1".into(),
        ..TransportConfig::default()
    };
    let dispatcher = Arc::new(Dispatcher::new());
    let transport = TransportServer::start_with_handler(config, dispatcher.clone())
        .await
        .unwrap();
    let port = transport.port();

    // Leak the transport to keep it running for the test
    Box::leak(Box::new(transport));

    (port, dispatcher)
}

/// Connect and wait until the server has registered the connection.
async fn connect(port: u16, dispatcher: &Dispatcher) -> Client {
    let before = dispatcher.connected_count();
    let (ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .expect("Failed to connect");
    wait_until(|| dispatcher.connected_count() > before).await;
    ws
}

async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}

async fn send(ws: &mut Client, payload: Value) {
    ws.send(Message::Text(payload.to_string().into())).await.unwrap();
}

async fn recv(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timeout waiting for event")
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn health(port: u16) -> Value {
    reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn join(ws: &mut Client, name: &str) {
    send(ws, json!({"type": "setName", "name": name})).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn naming_confirms_and_announces() {
    let (port, dispatcher) = start_test_server().await;
    let mut x = connect(port, &dispatcher).await;
    let mut y = connect(port, &dispatcher).await;

    join(&mut x, "Alice").await;

    let joined = json!({"type": "userJoined", "name": "Alice", "message": "Alice joined the chat"});
    assert_eq!(recv(&mut x).await, json!({"type": "nameSet", "name": "Alice"}));
    assert_eq!(recv(&mut x).await, joined);
    assert_eq!(recv(&mut y).await, joined);
}

#[tokio::test]
async fn named_message_is_broadcast_with_timestamp() {
    let (port, dispatcher) = start_test_server().await;
    let mut x = connect(port, &dispatcher).await;
    let mut y = connect(port, &dispatcher).await;

    join(&mut x, "Alice").await;
    recv(&mut x).await;
    recv(&mut x).await;
    recv(&mut y).await;

    send(&mut x, json!({"type": "message", "message": "hi"})).await;

    for ws in [&mut x, &mut y] {
        let event = recv(ws).await;
        assert_eq!(event["type"], "message");
        assert_eq!(event["name"], "Alice");
        assert_eq!(event["message"], "hi");
        assert!(event["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}

#[tokio::test]
async fn anonymous_message_produces_nothing() {
    let (port, dispatcher) = start_test_server().await;
    let mut alice = connect(port, &dispatcher).await;
    let mut y = connect(port, &dispatcher).await;

    join(&mut alice, "Alice").await;
    recv(&mut alice).await;
    recv(&mut alice).await;
    recv(&mut y).await;

    // Y never named itself; its message must not reach anyone. Alice's
    // follow-up acts as a marker: it must be the next frame everywhere.
    send(&mut y, json!({"type": "message", "message": "hi"})).await;
    send(&mut y, json!({"type": "bogus"})).await;
    y.send(Message::Text("{broken".into())).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    send(&mut alice, json!({"type": "message", "message": "marker"})).await;

    for ws in [&mut alice, &mut y] {
        let event = recv(ws).await;
        assert_eq!(event["name"], "Alice");
        assert_eq!(event["message"], "marker");
    }
}

#[tokio::test]
async fn disconnect_announces_departure_and_unregisters() {
    let (port, dispatcher) = start_test_server().await;
    let mut x = connect(port, &dispatcher).await;
    let mut y = connect(port, &dispatcher).await;

    join(&mut x, "Alice").await;
    recv(&mut y).await;
    assert_eq!(dispatcher.connected_count(), 2);

    x.close(None).await.unwrap();

    assert_eq!(
        recv(&mut y).await,
        json!({"type": "userLeft", "name": "Alice", "message": "Alice left the chat"})
    );
    wait_until(|| dispatcher.connected_count() == 1).await;
}

#[tokio::test]
async fn abrupt_disconnect_of_anonymous_client_is_silent() {
    let (port, dispatcher) = start_test_server().await;
    let anon = connect(port, &dispatcher).await;
    let mut alice = connect(port, &dispatcher).await;

    drop(anon);
    wait_until(|| dispatcher.connected_count() == 1).await;

    join(&mut alice, "Alice").await;
    assert_eq!(recv(&mut alice).await["type"], "nameSet");
    assert_eq!(recv(&mut alice).await["type"], "userJoined");
}

#[tokio::test]
async fn health_reports_tracked_connections() {
    let (port, dispatcher) = start_test_server().await;

    let status = health(port).await;
    assert_eq!(status["status"], "ok");
    assert_eq!(status["connectedUsers"], 0);

    let mut x = connect(port, &dispatcher).await;
    let _y = connect(port, &dispatcher).await;
    join(&mut x, "Alice").await;
    recv(&mut x).await;
    recv(&mut x).await;

    let status = health(port).await;
    assert_eq!(status["connectedUsers"], 2);
    assert_eq!(status["namedUsers"], 1);
    assert!(status["timestamp"].is_string());

    drop(x);
    wait_until(|| dispatcher.connected_count() == 1).await;
    assert_eq!(health(port).await["connectedUsers"], 1);
}

#[tokio::test]
async fn all_clients_see_messages_in_the_same_order() {
    let (port, dispatcher) = start_test_server().await;

    let mut clients = Vec::new();
    for _ in 0..4 {
        clients.push(connect(port, &dispatcher).await);
    }
    for (i, ws) in clients.iter_mut().enumerate() {
        join(ws, &format!("user{i}")).await;
    }
    wait_until(|| dispatcher.named_count() == 4).await;

    // nameSet + one userJoined per client for the sender, one userJoined per
    // client for everyone else.
    for ws in clients.iter_mut() {
        let mut joins = 0;
        while joins < 4 {
            if recv(ws).await["type"] == "userJoined" {
                joins += 1;
            }
        }
    }

    for (i, ws) in clients.iter_mut().enumerate() {
        send(ws, json!({"type": "message", "message": format!("m{i}")})).await;
    }

    let mut orders = Vec::new();
    for ws in clients.iter_mut() {
        let mut order = Vec::new();
        for _ in 0..4 {
            let event = recv(ws).await;
            assert_eq!(event["type"], "message");
            order.push(event["message"].as_str().unwrap().to_owned());
        }
        orders.push(order);
    }

    for order in &orders[1..] {
        assert_eq!(order, &orders[0]);
    }
}
