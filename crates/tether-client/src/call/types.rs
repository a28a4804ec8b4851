//! Call lifecycle vocabulary: states, sessions, inputs and outputs.

use tether_core::frames::{CallType, SignalFrame};
use tether_core::grant::MediaGrant;
use tether_core::ids::{CallId, UserId};

/// Where the local user is in the call lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CallState {
    /// No call.
    #[default]
    Idle,
    /// Outgoing invitation sent, waiting for the callee.
    Calling,
    /// Incoming invitation, waiting for the local user.
    Ringing,
    /// Both sides agreed; media is joined or being joined.
    Connected,
    /// Connected, with the call UI collapsed.
    Minimized,
}

impl CallState {
    /// Whether a call is in progress.
    pub fn is_active(self) -> bool {
        self != Self::Idle
    }

    /// Whether both parties have agreed to the call.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connected | Self::Minimized)
    }
}

/// Which side started the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Local user placed the call.
    Outgoing,
    /// Peer placed the call.
    Incoming,
}

/// The call in progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSession {
    /// Call attempt id, carried on every frame.
    pub call_id: CallId,
    /// The other party.
    pub peer: UserId,
    /// The other party's display name, if known.
    pub peer_name: Option<String>,
    /// Audio or video.
    pub call_type: CallType,
    /// Conferencing room for the call.
    pub room_name: String,
    /// Who placed the call.
    pub direction: Direction,
    /// Grant in use once media is joined.
    pub grant: Option<MediaGrant>,
    /// A grant request for this call is outstanding.
    pub awaiting_grant: bool,
}

/// Input to the state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum CallEvent {
    /// Local user places a call.
    StartCall {
        /// Who to call.
        callee: UserId,
        /// Audio or video.
        call_type: CallType,
        /// Room override; defaults to `"<caller>-<callee>"`.
        room: Option<String>,
    },
    /// Local user answers the ringing call.
    AcceptCall,
    /// Local user declines the ringing call.
    RejectCall,
    /// Local user ends, cancels or declines whatever is in progress.
    HangUp,
    /// Local user collapses the call UI.
    Minimize,
    /// Local user expands the call UI.
    Restore,
    /// A frame arrived from the relay.
    Frame(SignalFrame),
    /// A grant request finished.
    GrantResolved {
        /// Call the grant was requested for.
        call_id: CallId,
        /// Grant or failure reason.
        result: Result<MediaGrant, String>,
    },
}

impl CallEvent {
    /// Short label for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartCall { .. } => "start_call",
            Self::AcceptCall => "accept_call",
            Self::RejectCall => "reject_call",
            Self::HangUp => "hang_up",
            Self::Minimize => "minimize",
            Self::Restore => "restore",
            Self::Frame(frame) => frame.kind(),
            Self::GrantResolved { .. } => "grant_resolved",
        }
    }
}

/// Output of a transition, executed by the driver.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Signal `frame` to `to` through the gateway.
    Send {
        /// Recipient.
        to: UserId,
        /// Frame to push.
        frame: SignalFrame,
    },
    /// Fetch a grant for `room`; report back with
    /// [`CallEvent::GrantResolved`] tagged with `call_id`.
    RequestGrant {
        /// Call the grant is for.
        call_id: CallId,
        /// Room to join.
        room: String,
    },
    /// Join the conferencing room with `grant`.
    JoinMedia(MediaGrant),
    /// Leave the conferencing room.
    LeaveMedia,
    /// The call is live but media could not be joined.
    MediaUnavailable(String),
}
