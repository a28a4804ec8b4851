//! Async shell around [`CallStateMachine`].
//!
//! The driver task owns the machine and feeds it one event at a time from
//! two sources: user actions sent through a [`CallHandle`] and frames
//! forwarded by the relay connection. Effects are executed without
//! blocking the loop:
//!
//! - signaling frames go to a dedicated sender task, so they leave in the
//!   order the machine produced them
//! - grant fetches run on their own tasks and report back as
//!   [`CallEvent::GrantResolved`]
//! - media joins and leaves are handed to the embedder as [`MediaCommand`]s

use std::sync::Arc;

use async_trait::async_trait;
use tether_core::frames::{CallType, SignalFrame};
use tether_core::grant::MediaGrant;
use tether_core::ids::{CallId, UserId};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::machine::CallStateMachine;
use super::types::{CallEvent, CallSession, CallState, Effect};
use crate::errors::{CallError, ClientError};

const INPUT_CAPACITY: usize = 64;

/// Sends a signaling frame to one user.
#[async_trait]
pub trait Signaler: Send + Sync {
    /// Deliver `frame` to every live connection of `to`.
    async fn signal(&self, to: &UserId, frame: &SignalFrame) -> Result<(), ClientError>;
}

/// Fetches media grants.
#[async_trait]
pub trait GrantSource: Send + Sync {
    /// Request a grant for `identity` in `room`.
    async fn fetch_grant(&self, room: &str, identity: &UserId) -> Result<MediaGrant, ClientError>;
}

/// Instruction for the media layer.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaCommand {
    /// Join the room the grant authorizes.
    Join(MediaGrant),
    /// Leave the current room.
    Leave,
    /// The call is live but media could not be joined.
    Unavailable(String),
}

/// Observable call state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallSnapshot {
    /// Current state.
    pub state: CallState,
    /// Current call, if any.
    pub session: Option<CallSession>,
}

impl CallSnapshot {
    fn of(machine: &CallStateMachine) -> Self {
        Self {
            state: machine.state(),
            session: machine.session().cloned(),
        }
    }
}

type Reply = oneshot::Sender<Result<(), CallError>>;

struct Input {
    event: CallEvent,
    reply: Option<Reply>,
}

/// User-facing side of a running driver. Cheap to clone.
#[derive(Clone)]
pub struct CallHandle {
    inputs: mpsc::Sender<Input>,
    snapshot: watch::Receiver<CallSnapshot>,
}

impl CallHandle {
    /// Place a call and return its id.
    pub async fn start_call(
        &self,
        callee: UserId,
        call_type: CallType,
        room: Option<String>,
    ) -> Result<CallId, ClientError> {
        self.apply(CallEvent::StartCall {
            callee,
            call_type,
            room,
        })
        .await?;
        self.snapshot
            .borrow()
            .session
            .as_ref()
            .map(|s| s.call_id.clone())
            .ok_or(ClientError::DriverStopped)
    }

    /// Answer the ringing call.
    pub async fn accept(&self) -> Result<(), ClientError> {
        self.apply(CallEvent::AcceptCall).await
    }

    /// Decline the ringing call.
    pub async fn reject(&self) -> Result<(), ClientError> {
        self.apply(CallEvent::RejectCall).await
    }

    /// End, cancel or decline whatever is in progress. Safe in any state.
    pub async fn hang_up(&self) -> Result<(), ClientError> {
        self.apply(CallEvent::HangUp).await
    }

    /// Collapse the call UI.
    pub async fn minimize(&self) -> Result<(), ClientError> {
        self.apply(CallEvent::Minimize).await
    }

    /// Expand the call UI.
    pub async fn restore(&self) -> Result<(), ClientError> {
        self.apply(CallEvent::Restore).await
    }

    /// State as of the last processed event.
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot.clone()
    }

    /// Send an event and wait until the driver has applied it.
    async fn apply(&self, event: CallEvent) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.inputs
            .send(Input {
                event,
                reply: Some(tx),
            })
            .await
            .map_err(|_| ClientError::DriverStopped)?;
        rx.await.map_err(|_| ClientError::DriverStopped)??;
        Ok(())
    }
}

/// Handles returned by [`CallDriver::spawn`].
pub struct RunningCall {
    /// User actions and state.
    pub handle: CallHandle,
    /// Media instructions, in order.
    pub media: mpsc::Receiver<MediaCommand>,
    /// The driver task. Ends when the cancellation token fires.
    pub task: JoinHandle<()>,
}

/// Owns a [`CallStateMachine`] and executes its effects.
pub struct CallDriver {
    machine: CallStateMachine,
    signaler: Arc<dyn Signaler>,
    grants: Arc<dyn GrantSource>,
}

impl CallDriver {
    /// Wrap `machine` with its collaborators.
    pub fn new(
        machine: CallStateMachine,
        signaler: Arc<dyn Signaler>,
        grants: Arc<dyn GrantSource>,
    ) -> Self {
        Self {
            machine,
            signaler,
            grants,
        }
    }

    /// Start the driver loop.
    ///
    /// `frames` is the relay connection's output. The loop keeps running
    /// after `frames` closes so user actions still work while offline.
    pub fn spawn(self, frames: mpsc::Receiver<SignalFrame>, cancel: CancellationToken) -> RunningCall {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(CallSnapshot::of(&self.machine));
        let (media_tx, media_rx) = mpsc::channel(INPUT_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let sender = tokio::spawn(send_signals(Arc::clone(&self.signaler), outbound_rx));
        let task = tokio::spawn(
            DriverLoop {
                machine: self.machine,
                grants: self.grants,
                inputs: input_tx.clone(),
                snapshot: snapshot_tx,
                media: media_tx,
                outbound: outbound_tx,
            }
            .run(input_rx, frames, cancel, sender),
        );

        RunningCall {
            handle: CallHandle {
                inputs: input_tx,
                snapshot: snapshot_rx,
            },
            media: media_rx,
            task,
        }
    }
}

struct DriverLoop {
    machine: CallStateMachine,
    grants: Arc<dyn GrantSource>,
    inputs: mpsc::Sender<Input>,
    snapshot: watch::Sender<CallSnapshot>,
    media: mpsc::Sender<MediaCommand>,
    outbound: mpsc::UnboundedSender<(UserId, SignalFrame)>,
}

impl DriverLoop {
    async fn run(
        mut self,
        mut inputs: mpsc::Receiver<Input>,
        mut frames: mpsc::Receiver<SignalFrame>,
        cancel: CancellationToken,
        sender: JoinHandle<()>,
    ) {
        let mut frames_open = true;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                input = inputs.recv() => {
                    let Some(Input { event, reply }) = input else { break };
                    let result = self.apply(event).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                frame = frames.recv(), if frames_open => match frame {
                    Some(frame) => {
                        let _ = self.apply(CallEvent::Frame(frame)).await;
                    }
                    None => {
                        debug!("relay frame stream closed");
                        frames_open = false;
                    }
                },
            }
        }

        // Dropping the outbound sender lets queued signals drain.
        drop(self.outbound);
        let _ = sender.await;
        debug!(identity = %self.machine.local(), "call driver stopped");
    }

    async fn apply(&mut self, event: CallEvent) -> Result<(), CallError> {
        let name = event.name();
        let before = self.machine.state();
        let effects = match self.machine.handle(event) {
            Ok(effects) => effects,
            Err(err) => {
                debug!(event = name, error = %err, "call action refused");
                return Err(err);
            }
        };
        let after = self.machine.state();
        if before != after {
            info!(event = name, from = ?before, to = ?after, "call state changed");
        }
        let _ = self.snapshot.send_if_modified(|current| {
            let next = CallSnapshot::of(&self.machine);
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        for effect in effects {
            self.execute(effect).await;
        }
        Ok(())
    }

    async fn execute(&self, effect: Effect) {
        match effect {
            Effect::Send { to, frame } => {
                let _ = self.outbound.send((to, frame));
            }
            Effect::RequestGrant { call_id, room } => {
                let grants = Arc::clone(&self.grants);
                let inputs = self.inputs.clone();
                let identity = self.machine.local().clone();
                drop(tokio::spawn(async move {
                    let result = grants
                        .fetch_grant(&room, &identity)
                        .await
                        .map_err(|e| e.to_string());
                    if let Err(reason) = &result {
                        warn!(call_id = %call_id, room = %room, error = %reason, "grant request failed");
                    }
                    let _ = inputs
                        .send(Input {
                            event: CallEvent::GrantResolved { call_id, result },
                            reply: None,
                        })
                        .await;
                }));
            }
            Effect::JoinMedia(grant) => self.media_command(MediaCommand::Join(grant)).await,
            Effect::LeaveMedia => self.media_command(MediaCommand::Leave).await,
            Effect::MediaUnavailable(reason) => {
                self.media_command(MediaCommand::Unavailable(reason)).await;
            }
        }
    }

    async fn media_command(&self, command: MediaCommand) {
        if self.media.send(command).await.is_err() {
            debug!("media receiver dropped");
        }
    }
}

async fn send_signals(
    signaler: Arc<dyn Signaler>,
    mut outbound: mpsc::UnboundedReceiver<(UserId, SignalFrame)>,
) {
    while let Some((to, frame)) = outbound.recv().await {
        if let Err(err) = signaler.signal(&to, &frame).await {
            warn!(to = %to, kind = frame.kind(), error = %err, "signaling failed");
        }
    }
}
