#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tether_server::relay::SignalingRelay;
use tether_server::server::{ServerMode, build_state, serve_listener};
use tether_settings::TetherSettings;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    addr: SocketAddr,
    relay: Arc<SignalingRelay>,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

async fn start() -> Harness {
    let mut settings = TetherSettings::default();
    settings.membership.communities = BTreeMap::from([(
        "c1".to_string(),
        vec!["m1".to_string(), "m2".to_string(), "m3".to_string()],
    )]);
    let state = build_state(&ServerMode::Full, &settings, None).unwrap();
    let relay = state.relay.clone().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server_settings = settings.server.clone();
    let server = tokio::spawn(async move {
        serve_listener(listener, state, &server_settings, async move {
            signal.cancelled().await;
        })
        .await
        .unwrap();
    });

    Harness {
        addr,
        relay,
        shutdown,
        server,
    }
}

async fn connect(h: &Harness, query: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/notify?{query}", h.addr)).await.unwrap();
    socket
}

async fn wait_for_connections(relay: &SignalingRelay, n: usize) {
    for _ in 0..200 {
        if relay.registry().connection_count() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {n} connections, have {}",
        relay.registry().connection_count()
    );
}

async fn next_frame(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("valid message");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn notify(h: &Harness, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{}/notify", h.addr))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn direct_notify_reaches_every_device() {
    let h = start().await;
    let mut phone = connect(&h, "userId=u2").await;
    let mut laptop = connect(&h, "identity=u2").await;
    wait_for_connections(&h.relay, 2).await;

    let (status, body) = notify(
        &h,
        json!({"toUserId": "u2", "type": "incoming_call", "callId": "call_1",
               "callerId": "u1", "roomName": "u1-u2"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"ok": true, "delivered": 1}));

    for socket in [&mut phone, &mut laptop] {
        let frame = next_frame(socket).await;
        assert_eq!(frame["type"], "incoming_call");
        assert_eq!(frame["callerId"], "u1");
        assert!(frame.get("toUserId").is_none());
    }

    h.shutdown.cancel();
    h.server.await.unwrap();
}

#[tokio::test]
async fn offline_recipient_is_not_an_error() {
    let h = start().await;
    let (status, body) = notify(&h, json!({"toUserId": "nobody", "type": "ping"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["delivered"], 0);
    h.shutdown.cancel();
}

#[tokio::test]
async fn community_broadcast_skips_excluded_member() {
    let h = start().await;
    let mut m1 = connect(&h, "userId=m1&communityId=c1").await;
    let mut m2 = connect(&h, "userId=m2&communityId=c1").await;
    wait_for_connections(&h.relay, 2).await;

    let (status, body) = notify(
        &h,
        json!({"communityId": "c1", "type": "new_community_message",
               "excludeUserId": "m1", "message": {"body": "hello"}}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({"ok": true, "delivered": 1, "totalMembers": 2, "connectedMembers": 1})
    );

    let frame = next_frame(&mut m2).await;
    assert_eq!(frame["message"]["body"], "hello");

    let nothing = tokio::time::timeout(Duration::from_millis(200), m1.next()).await;
    assert!(nothing.is_err(), "excluded member received a frame");

    h.shutdown.cancel();
}

#[tokio::test]
async fn missing_identity_is_rejected_before_upgrade() {
    let h = start().await;
    let err = connect_async(format!("ws://{}/ws?communityId=c1", h.addr))
        .await
        .unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 400),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.relay.registry().connection_count(), 0);
    h.shutdown.cancel();
}

#[tokio::test]
async fn client_close_unregisters() {
    let h = start().await;
    let mut socket = connect(&h, "userId=u1").await;
    wait_for_connections(&h.relay, 1).await;

    socket.send(Message::Close(None)).await.unwrap();
    wait_for_connections(&h.relay, 0).await;
    assert_eq!(h.relay.registry().identity_count(), 0);
    h.shutdown.cancel();
}

#[tokio::test]
async fn shutdown_closes_sockets() {
    let h = start().await;
    let mut socket = connect(&h, "userId=u1").await;
    wait_for_connections(&h.relay, 1).await;

    h.shutdown.cancel();
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(msg)) = socket.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "socket still open after shutdown");
    wait_for_connections(&h.relay, 0).await;
}
