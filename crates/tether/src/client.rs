//! `tether client`: one user on a terminal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use tether_client::call::{
    CallDriver, CallHandle, CallSnapshot, CallState, CallStateMachine, GrantSource, MediaCommand,
    Signaler,
};
use tether_client::connection::{LinkStatus, RelayConnection, socket_url};
use tether_client::gateway_client::GatewayClient;
use tether_client::presence::{PresenceNotifier, PresenceStore, PresenceTracker, RestPresenceStore};
use tether_core::frames::{CallType, SignalFrame};
use tether_core::ids::{CommunityId, UserId};
use tether_settings::TetherSettings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Client options.
#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Identity to connect as.
    #[arg(long)]
    identity: String,
    /// Display name sent with invitations.
    #[arg(long)]
    name: Option<String>,
    /// Community to subscribe to.
    #[arg(long)]
    community: Option<String>,
    /// Gateway base URL.
    #[arg(long, default_value = "http://127.0.0.1:8084")]
    gateway_url: String,
    /// Relay base URL (defaults to the gateway URL).
    #[arg(long)]
    relay_url: Option<String>,
    /// Bearer token for the gateway.
    #[arg(long)]
    token: Option<String>,
    /// Data store root URL for last-seen updates.
    #[arg(long)]
    data_url: Option<String>,
    /// Data store API key.
    #[arg(long, default_value = "")]
    data_key: String,
}

/// A line typed at the prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Call { callee: UserId, call_type: CallType },
    Accept,
    Reject,
    HangUp,
    Minimize,
    Restore,
    Status,
    Quit,
}

/// Parse one prompt line. Empty lines yield `Ok(None)`.
pub fn parse_input(line: &str) -> Result<Option<Input>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let input = match verb.to_ascii_lowercase().as_str() {
        "call" => {
            let callee = words.next().context("usage: call <identity> [audio|video]")?;
            let call_type = match words.next() {
                None | Some("audio") => CallType::Audio,
                Some("video") => CallType::Video,
                Some(other) => bail!("unknown call type {other:?}"),
            };
            Input::Call {
                callee: UserId::new(callee),
                call_type,
            }
        }
        "accept" => Input::Accept,
        "reject" => Input::Reject,
        "hangup" | "hang-up" => Input::HangUp,
        "minimize" => Input::Minimize,
        "restore" => Input::Restore,
        "status" => Input::Status,
        "quit" | "exit" => Input::Quit,
        other => bail!("unknown command {other:?}"),
    };
    Ok(Some(input))
}

/// Connect, then run until `quit`, end of input or ctrl-c.
pub async fn run(args: &ClientArgs, settings: &TetherSettings) -> Result<()> {
    let me = UserId::new(args.identity.trim());
    let community = args.community.as_deref().map(CommunityId::new);
    let relay_base = args.relay_url.as_deref().unwrap_or(&args.gateway_url);
    let url = socket_url(relay_base, &me, community.as_ref())?;

    let mut gateway = GatewayClient::new(&args.gateway_url)?;
    if let Some(token) = &args.token {
        gateway = gateway.with_bearer(token.clone());
    }
    if let Some(name) = &args.name {
        gateway = gateway.with_display_name(name.clone());
    }
    let gateway = Arc::new(gateway);

    let cancel = CancellationToken::new();
    let (raw_tx, raw_rx) = mpsc::channel(64);
    let (frames_tx, frames_rx) = mpsc::channel(64);
    let link = RelayConnection::open(url.clone(), &settings.retry, raw_tx);
    drop(tokio::spawn(echo_frames(raw_rx, frames_tx)));

    let running = CallDriver::new(
        CallStateMachine::new(me.clone(), args.name.clone()),
        Arc::clone(&gateway) as Arc<dyn Signaler>,
        Arc::clone(&gateway) as Arc<dyn GrantSource>,
    )
    .spawn(frames_rx, cancel.clone());
    drop(tokio::spawn(print_media(running.media)));
    drop(tokio::spawn(print_states(running.handle.subscribe())));

    let mut tracker = PresenceTracker::new(
        me.clone(),
        Duration::from_secs(settings.presence.heartbeat_interval_secs),
    )
    .with_notifier(Arc::clone(&gateway) as Arc<dyn PresenceNotifier>);
    if let Some(data_url) = &args.data_url {
        let store = RestPresenceStore::new(data_url, &args.data_key, Duration::from_secs(10))?;
        tracker = tracker.with_store(Arc::new(store) as Arc<dyn PresenceStore>);
    }
    let nudge = tracker.nudger();
    let presence = tracker.spawn(cancel.clone());
    drop(tokio::spawn(watch_link(link.subscribe(), nudge)));

    println!("connecting to {url} as {me}; type `call <id>`, `accept`, `reject`, `hangup`, `quit`");
    let result = prompt_loop(&running.handle).await;

    let _ = running.handle.hang_up().await;
    cancel.cancel();
    link.shutdown().await;
    let _ = presence.await;
    let _ = running.task.await;
    result
}

async fn prompt_loop(handle: &CallHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        let Some(line) = line else { return Ok(()) };
        let input = match parse_input(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        let outcome = match input {
            Input::Call { callee, call_type } => handle
                .start_call(callee, call_type, None)
                .await
                .map(|id| println!("calling ({id})")),
            Input::Accept => handle.accept().await,
            Input::Reject => handle.reject().await,
            Input::HangUp => handle.hang_up().await,
            Input::Minimize => handle.minimize().await,
            Input::Restore => handle.restore().await,
            Input::Status => {
                print_snapshot(&handle.snapshot());
                Ok(())
            }
            Input::Quit => return Ok(()),
        };
        if let Err(err) = outcome {
            println!("{err}");
        }
    }
}

async fn echo_frames(mut raw: mpsc::Receiver<SignalFrame>, frames: mpsc::Sender<SignalFrame>) {
    while let Some(frame) = raw.recv().await {
        match &frame {
            SignalFrame::NewCommunityMessage {
                community_id,
                message,
            } => println!("[{community_id}] {message}"),
            SignalFrame::UserPresence { user_id, last_seen } => {
                println!("{user_id} seen {}", last_seen.as_deref().unwrap_or("now"));
            }
            _ => {}
        }
        if frames.send(frame).await.is_err() {
            break;
        }
    }
}

async fn print_media(mut media: mpsc::Receiver<MediaCommand>) {
    while let Some(command) = media.recv().await {
        match command {
            MediaCommand::Join(grant) => {
                println!("joining room {} at {}", grant.room_name, grant.url);
            }
            MediaCommand::Leave => println!("left media room"),
            MediaCommand::Unavailable(reason) => println!("media unavailable: {reason}"),
        }
    }
}

async fn print_states(mut states: watch::Receiver<CallSnapshot>) {
    while states.changed().await.is_ok() {
        let snapshot = states.borrow_and_update().clone();
        print_snapshot(&snapshot);
    }
}

fn print_snapshot(snapshot: &CallSnapshot) {
    match (&snapshot.state, &snapshot.session) {
        (CallState::Ringing, Some(s)) => println!(
            "incoming {:?} call from {} ({})",
            s.call_type,
            s.peer_name.as_deref().unwrap_or(s.peer.as_str()),
            s.call_id
        ),
        (state, Some(s)) => println!("{state:?} with {} in room {}", s.peer, s.room_name),
        (state, None) => println!("{state:?}"),
    }
}

async fn watch_link(mut status: watch::Receiver<LinkStatus>, nudge: Arc<tokio::sync::Notify>) {
    let mut was_connected = false;
    while status.changed().await.is_ok() {
        let now = *status.borrow_and_update();
        match now {
            LinkStatus::Connected if was_connected => nudge.notify_one(),
            LinkStatus::Reconnecting { attempt } => println!("relay lost, retry #{attempt}"),
            LinkStatus::Closed => break,
            LinkStatus::Connected | LinkStatus::Connecting => {}
        }
        was_connected |= now == LinkStatus::Connected;
    }
}
