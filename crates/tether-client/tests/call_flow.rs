#![allow(missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tether_client::call::{
    CallDriver, CallHandle, CallState, CallStateMachine, GrantSource, MediaCommand, RunningCall,
    Signaler,
};
use tether_client::connection::{LinkStatus, RelayConnection, socket_url};
use tether_client::gateway_client::GatewayClient;
use tether_core::frames::CallType;
use tether_core::ids::UserId;
use tether_server::server::{ServerMode, build_state, serve_listener};
use tether_settings::{RetrySettings, TetherSettings};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn start_server() -> (SocketAddr, CancellationToken) {
    let mut settings = TetherSettings::default();
    settings.media.api_key = "key".into();
    settings.media.api_secret = "secret-secret-secret-secret".into();
    settings.media.url = "wss://media.test".into();
    let state = build_state(&ServerMode::Full, &settings, None).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server_settings = settings.server.clone();
    drop(tokio::spawn(async move {
        serve_listener(listener, state, &server_settings, async move {
            signal.cancelled().await;
        })
        .await
        .unwrap();
    }));
    (addr, shutdown)
}

struct Peer {
    link: RelayConnection,
    running: RunningCall,
    cancel: CancellationToken,
}

impl Peer {
    fn handle(&self) -> CallHandle {
        self.running.handle.clone()
    }

    async fn next_media(&mut self) -> MediaCommand {
        tokio::time::timeout(Duration::from_secs(5), self.running.media.recv())
            .await
            .expect("media command within timeout")
            .expect("driver running")
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.link.shutdown().await;
    }
}

async fn join(addr: SocketAddr, identity: &str) -> Peer {
    let base = format!("http://{addr}");
    let me = UserId::new(identity);
    let retry = RetrySettings {
        base_delay_ms: 20,
        max_delay_ms: 100,
        jitter_factor: 0.0,
    };

    let (frames_tx, frames_rx) = mpsc::channel(16);
    let link = RelayConnection::open(socket_url(&base, &me, None).unwrap(), &retry, frames_tx);
    let mut status = link.subscribe();
    let _ = tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| *s == LinkStatus::Connected),
    )
    .await
    .expect("connected within timeout")
    .unwrap();

    let gateway = Arc::new(GatewayClient::new(&base).unwrap().with_display_name(identity));
    let cancel = CancellationToken::new();
    let running = CallDriver::new(
        CallStateMachine::new(me, Some(identity.to_string())),
        Arc::clone(&gateway) as Arc<dyn Signaler>,
        gateway as Arc<dyn GrantSource>,
    )
    .spawn(frames_rx, cancel.clone());

    Peer {
        link,
        running,
        cancel,
    }
}

async fn wait_for_connections(addr: SocketAddr, n: u64) {
    let client = reqwest::Client::new();
    for _ in 0..200 {
        let health: serde_json::Value = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if health["connections"].as_u64() == Some(n) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("relay never reached {n} connections");
}

async fn wait_state(handle: &CallHandle, state: CallState) {
    let mut rx = handle.subscribe();
    let _ = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("never reached {state:?}"))
        .unwrap();
}

#[tokio::test]
async fn call_is_placed_answered_and_ended_through_the_relay() {
    let (addr, shutdown) = start_server().await;
    let mut caller = join(addr, "u1").await;
    let mut callee = join(addr, "u2").await;
    wait_for_connections(addr, 2).await;

    let call_id = caller
        .handle()
        .start_call(UserId::new("u2"), CallType::Video, None)
        .await
        .unwrap();
    wait_state(&callee.handle(), CallState::Ringing).await;
    let ringing = callee.handle().snapshot().session.unwrap();
    assert_eq!(ringing.call_id, call_id);
    assert_eq!(ringing.peer_name.as_deref(), Some("u1"));
    assert_eq!(ringing.room_name, "u1-u2");

    callee.handle().accept().await.unwrap();
    wait_state(&caller.handle(), CallState::Connected).await;

    assert_matches!(caller.next_media().await, MediaCommand::Join(g) if g.room_name == "u1-u2");
    assert_matches!(callee.next_media().await, MediaCommand::Join(g) if g.identity == UserId::new("u2"));

    caller.handle().hang_up().await.unwrap();
    assert_eq!(caller.next_media().await, MediaCommand::Leave);
    wait_state(&callee.handle(), CallState::Idle).await;
    assert_eq!(callee.next_media().await, MediaCommand::Leave);

    caller.stop().await;
    callee.stop().await;
    shutdown.cancel();
}

#[tokio::test]
async fn rejected_call_returns_both_sides_to_idle() {
    let (addr, shutdown) = start_server().await;
    let caller = join(addr, "u1").await;
    let callee = join(addr, "u2").await;
    wait_for_connections(addr, 2).await;

    let _ = caller
        .handle()
        .start_call(UserId::new("u2"), CallType::Audio, None)
        .await
        .unwrap();
    wait_state(&callee.handle(), CallState::Ringing).await;
    callee.handle().reject().await.unwrap();
    wait_state(&caller.handle(), CallState::Idle).await;
    assert_eq!(callee.handle().snapshot().state, CallState::Idle);

    caller.stop().await;
    callee.stop().await;
    shutdown.cancel();
}

#[tokio::test]
async fn link_reports_reconnecting_after_server_shutdown() {
    let (addr, shutdown) = start_server().await;
    let peer = join(addr, "u1").await;
    wait_for_connections(addr, 1).await;

    let mut status = peer.link.subscribe();
    shutdown.cancel();
    let _ = tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| matches!(s, LinkStatus::Reconnecting { .. })),
    )
    .await
    .expect("reconnecting within timeout")
    .unwrap();

    peer.stop().await;
}
