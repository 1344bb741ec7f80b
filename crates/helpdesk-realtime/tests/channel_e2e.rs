//! End-to-end tests against a real local `WebSocket` server.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tokio_util::sync::CancellationToken;

use helpdesk_auth::SessionStore;
use helpdesk_core::{Role, User};
use helpdesk_realtime::desktop::DisabledNotifier;
use helpdesk_realtime::{
    ChannelConfig, ChannelHandle, ChannelState, SharedStore, StoreChange, WsConnector,
    bind_session, spawn_channel,
};

const TIMEOUT: Duration = Duration::from_secs(5);

type ServerWs = WebSocketStream<TcpStream>;

/// One accepted connection and the request URI it came in on.
struct Accepted {
    uri: String,
    ws: ServerWs,
}

/// Accept connections forever, handing each to the test.
async fn boot_server() -> (String, mpsc::UnboundedReceiver<Accepted>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    drop(tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let mut uri = String::new();
            let Ok(ws) = accept_hdr_async(stream, |req: &Request, resp: Response| {
                uri = req.uri().to_string();
                Ok(resp)
            })
            .await
            else {
                continue;
            };
            if tx.send(Accepted { uri, ws }).is_err() {
                break;
            }
        }
    }));
    (format!("ws://{addr}/api/v1/notifications/ws"), rx)
}

fn config(endpoint: &str) -> ChannelConfig {
    ChannelConfig {
        heartbeat_interval: Duration::from_millis(150),
        reconnect_delay: Duration::from_millis(200),
        ..ChannelConfig::new(endpoint)
    }
}

fn start(endpoint: &str) -> (SessionStore, ChannelHandle, CancellationToken) {
    let sessions = SessionStore::new();
    let channel = spawn_channel(
        config(endpoint),
        Arc::new(WsConnector),
        SharedStore::default(),
        Arc::new(DisabledNotifier),
    );
    let shutdown = CancellationToken::new();
    drop(bind_session(&sessions, channel.clone(), shutdown.clone()));
    (sessions, channel, shutdown)
}

fn technician() -> User {
    User::new(7, "ana", Role::Technician)
}

async fn accept(rx: &mut mpsc::UnboundedReceiver<Accepted>) -> Accepted {
    timeout(TIMEOUT, rx.recv())
        .await
        .expect("timeout waiting for connection")
        .expect("server stopped")
}

async fn wait_state(channel: &ChannelHandle, state: ChannelState) {
    let mut rx = channel.watch_state();
    let _ = timeout(TIMEOUT, rx.wait_for(|s| s.state == state))
        .await
        .expect("timeout waiting for state")
        .unwrap();
}

/// Next non-heartbeat text frame as JSON.
async fn read_json_skipping_heartbeats(ws: &mut ServerWs) -> Value {
    loop {
        let value = read_json(ws).await;
        if value["type"] != "heartbeat" {
            return value;
        }
    }
}

async fn read_json(ws: &mut ServerWs) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut ServerWs, value: &Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

#[tokio::test]
async fn login_receive_and_mark_read() {
    let (endpoint, mut server) = boot_server().await;
    let (sessions, channel, _shutdown) = start(&endpoint);
    let mut changes = channel.store().subscribe();

    sessions.establish("tok-abc", technician());
    let mut conn = accept(&mut server).await;
    assert_eq!(conn.uri, "/api/v1/notifications/ws?token=tok%2Dabc");
    wait_state(&channel, ChannelState::Open).await;

    send_json(
        &mut conn.ws,
        &json!({"type": "connection_established", "message": "Connected", "user_id": 7}),
    )
    .await;
    send_json(
        &mut conn.ws,
        &json!({
            "type": "ticket_created",
            "message": "Ticket #7 created",
            "ticket_id": 7,
            "title": "Printer jam",
            "timestamp": "2024-03-01T10:15:00"
        }),
    )
    .await;

    let change = timeout(TIMEOUT, changes.recv()).await.unwrap().unwrap();
    let StoreChange::Added(notification) = change else {
        panic!("expected an added notification, got {change:?}");
    };
    assert_eq!(notification.ticket_id, Some(7));
    assert_eq!(notification.title(), Some("Printer jam"));
    assert_eq!(channel.store().unread_count(), 1);

    assert!(channel.mark_as_read(&notification.id));
    assert_eq!(channel.store().unread_count(), 0);
    assert!(channel.store().get(&notification.id).unwrap().read);

    let receipt = read_json_skipping_heartbeats(&mut conn.ws).await;
    assert_eq!(
        receipt,
        json!({"type": "mark_notification_read", "notification_id": notification.id.as_str()})
    );
}

#[tokio::test]
async fn heartbeats_flow_while_open() {
    let (endpoint, mut server) = boot_server().await;
    let (sessions, channel, _shutdown) = start(&endpoint);

    sessions.establish("tok", technician());
    let mut conn = accept(&mut server).await;
    wait_state(&channel, ChannelState::Open).await;

    for _ in 0..2 {
        let beat = read_json(&mut conn.ws).await;
        assert_eq!(beat["type"], "heartbeat");
        assert!(beat["timestamp"].as_str().is_some());
        send_json(&mut conn.ws, &json!({"type": "heartbeat_response"})).await;
    }
    assert!(channel.store().is_empty());
}

#[tokio::test]
async fn dropped_connection_reconnects() {
    let (endpoint, mut server) = boot_server().await;
    let (sessions, channel, _shutdown) = start(&endpoint);

    sessions.establish("tok", technician());
    let first = accept(&mut server).await;
    wait_state(&channel, ChannelState::Open).await;

    drop(first);
    wait_state(&channel, ChannelState::ClosedWillRetry).await;

    let second = accept(&mut server).await;
    assert!(second.uri.ends_with("token=tok"));
    wait_state(&channel, ChannelState::Open).await;
}

#[tokio::test]
async fn server_going_away_reconnects() {
    let (endpoint, mut server) = boot_server().await;
    let (sessions, channel, _shutdown) = start(&endpoint);

    sessions.establish("tok", technician());
    let mut first = accept(&mut server).await;
    wait_state(&channel, ChannelState::Open).await;

    first
        .ws
        .close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".to_string().into(),
        }))
        .await
        .unwrap();

    let _second = accept(&mut server).await;
    wait_state(&channel, ChannelState::Open).await;
}

#[tokio::test]
async fn logout_closes_with_normal_code() {
    let (endpoint, mut server) = boot_server().await;
    let (sessions, channel, _shutdown) = start(&endpoint);

    sessions.establish("tok", technician());
    let mut conn = accept(&mut server).await;
    wait_state(&channel, ChannelState::Open).await;

    sessions.clear();
    let frame = loop {
        let msg = timeout(TIMEOUT, conn.ws.next())
            .await
            .expect("timeout waiting for close")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Close(frame) = msg {
            break frame.expect("close frame without payload");
        }
    };
    assert_eq!(u16::from(frame.code), 1000);
    assert_eq!(frame.reason.as_str(), "Manual disconnect");

    // Answer the close handshake so the client sees it confirmed.
    let _ = conn.ws.flush().await;
    drop(conn);
    wait_state(&channel, ChannelState::Idle).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(server.try_recv().is_err());
}

#[tokio::test]
async fn unreachable_server_keeps_retrying_until_it_appears() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let endpoint = format!("ws://{addr}/ws");
    let (sessions, channel, _shutdown) = start(&endpoint);

    sessions.establish("tok", technician());
    wait_state(&channel, ChannelState::ClosedWillRetry).await;

    let listener = TcpListener::bind(addr).await.unwrap();
    let (stream, _) = timeout(TIMEOUT, listener.accept()).await.unwrap().unwrap();
    let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    wait_state(&channel, ChannelState::Open).await;
}
