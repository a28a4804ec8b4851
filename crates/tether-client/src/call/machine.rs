//! The call state machine.
//!
//! Sans-IO: [`CallStateMachine::handle`] takes one event, runs the
//! transition to completion, and returns the [`Effect`]s for the driver to
//! execute. The machine never waits on the network, so a hang-up is always
//! processed even while a grant request is outstanding.
//!
//! | From | Event | To | Effects |
//! |------|-------|----|---------|
//! | Idle | `StartCall` | Calling | send `incoming_call` |
//! | Idle | `incoming_call` | Ringing | |
//! | Ringing | `AcceptCall` | Connected | send `call_accepted`, request grant |
//! | Ringing | `RejectCall` / `HangUp` | Idle | send `call_rejected` |
//! | Calling | `call_accepted` | Connected | request grant |
//! | Calling | `HangUp` | Idle | send `call_ended` |
//! | Calling, Ringing | `call_rejected` / `call_ended` | Idle | |
//! | Connected, Minimized | `HangUp` | Idle | send `call_ended`, leave media |
//! | Connected, Minimized | `call_ended` | Idle | leave media |
//! | Connected | `Minimize` | Minimized | |
//! | Minimized | `Restore` | Connected | |
//!
//! Everything else leaves the machine untouched. Frames and grants are
//! matched against the current call id and peer; anything else is stale
//! and dropped.

use tether_core::frames::{CallType, SignalFrame};
use tether_core::grant::MediaGrant;
use tether_core::ids::{CallId, UserId};
use tracing::debug;

use super::types::{CallEvent, CallSession, CallState, Direction, Effect};
use crate::errors::CallError;

/// One user's call lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallStateMachine {
    local: UserId,
    local_name: Option<String>,
    state: CallState,
    session: Option<CallSession>,
}

impl CallStateMachine {
    /// Idle machine for `local`.
    pub fn new(local: UserId, local_name: Option<String>) -> Self {
        Self {
            local,
            local_name,
            state: CallState::Idle,
            session: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Call in progress, if any.
    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    /// Local identity.
    pub fn local(&self) -> &UserId {
        &self.local
    }

    /// Apply one event.
    ///
    /// Only `StartCall` can fail; every other unexpected event is ignored.
    pub fn handle(&mut self, event: CallEvent) -> Result<Vec<Effect>, CallError> {
        let effects = match event {
            CallEvent::StartCall {
                callee,
                call_type,
                room,
            } => return self.start_call(callee, call_type, room),
            CallEvent::AcceptCall => self.accept(),
            CallEvent::RejectCall => self.reject(),
            CallEvent::HangUp => self.hang_up(),
            CallEvent::Minimize => self.set_view(CallState::Connected, CallState::Minimized),
            CallEvent::Restore => self.set_view(CallState::Minimized, CallState::Connected),
            CallEvent::Frame(frame) => self.on_frame(frame),
            CallEvent::GrantResolved { call_id, result } => self.on_grant(&call_id, result),
        };
        Ok(effects)
    }

    fn start_call(
        &mut self,
        callee: UserId,
        call_type: CallType,
        room: Option<String>,
    ) -> Result<Vec<Effect>, CallError> {
        if let Some(session) = &self.session {
            return Err(CallError::AlreadyInCall {
                state: self.state,
                call_id: session.call_id.clone(),
            });
        }
        if callee.is_blank() || callee == self.local {
            return Err(CallError::InvalidCallee(callee.into_inner()));
        }

        let call_id = CallId::generate();
        let room_name = room
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("{}-{}", self.local, callee));

        let frame = SignalFrame::IncomingCall {
            call_id: call_id.clone(),
            caller_id: self.local.clone(),
            caller_name: self.local_name.clone(),
            call_type,
            room_name: room_name.clone(),
        };
        self.session = Some(CallSession {
            call_id,
            peer: callee.clone(),
            peer_name: None,
            call_type,
            room_name,
            direction: Direction::Outgoing,
            grant: None,
            awaiting_grant: false,
        });
        self.state = CallState::Calling;
        Ok(vec![Effect::Send { to: callee, frame }])
    }

    fn accept(&mut self) -> Vec<Effect> {
        if self.state != CallState::Ringing {
            return Vec::new();
        }
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.awaiting_grant = true;
        let effects = vec![
            Effect::Send {
                to: session.peer.clone(),
                frame: SignalFrame::CallAccepted {
                    call_id: session.call_id.clone(),
                    from_user_id: self.local.clone(),
                    room_name: session.room_name.clone(),
                },
            },
            Effect::RequestGrant {
                call_id: session.call_id.clone(),
                room: session.room_name.clone(),
            },
        ];
        self.state = CallState::Connected;
        effects
    }

    fn reject(&mut self) -> Vec<Effect> {
        if self.state != CallState::Ringing {
            return Vec::new();
        }
        self.decline()
    }

    fn hang_up(&mut self) -> Vec<Effect> {
        match self.state {
            CallState::Idle => Vec::new(),
            CallState::Ringing => self.decline(),
            CallState::Calling | CallState::Connected | CallState::Minimized => {
                let Some(session) = self.end() else {
                    return Vec::new();
                };
                let mut effects = vec![Effect::Send {
                    to: session.peer,
                    frame: SignalFrame::CallEnded {
                        call_id: session.call_id,
                        from_user_id: self.local.clone(),
                    },
                }];
                if session.grant.is_some() {
                    effects.push(Effect::LeaveMedia);
                }
                effects
            }
        }
    }

    fn decline(&mut self) -> Vec<Effect> {
        let Some(session) = self.end() else {
            return Vec::new();
        };
        vec![Effect::Send {
            to: session.peer,
            frame: SignalFrame::CallRejected {
                call_id: session.call_id,
                from_user_id: self.local.clone(),
            },
        }]
    }

    fn set_view(&mut self, from: CallState, to: CallState) -> Vec<Effect> {
        if self.state == from {
            self.state = to;
        }
        Vec::new()
    }

    fn on_frame(&mut self, frame: SignalFrame) -> Vec<Effect> {
        match frame {
            SignalFrame::IncomingCall {
                call_id,
                caller_id,
                caller_name,
                call_type,
                room_name,
            } => {
                if self.state != CallState::Idle || caller_id == self.local {
                    debug!(call_id = %call_id, caller = %caller_id, state = ?self.state, "ignoring invitation");
                    return Vec::new();
                }
                self.session = Some(CallSession {
                    call_id,
                    peer: caller_id,
                    peer_name: caller_name,
                    call_type,
                    room_name,
                    direction: Direction::Incoming,
                    grant: None,
                    awaiting_grant: false,
                });
                self.state = CallState::Ringing;
                Vec::new()
            }
            SignalFrame::CallAccepted {
                call_id,
                from_user_id,
                room_name,
            } => {
                if self.state != CallState::Calling || !self.is_current(&call_id, &from_user_id) {
                    return self.stale("call_accepted", &call_id);
                }
                let Some(session) = self.session.as_mut() else {
                    return Vec::new();
                };
                if !room_name.trim().is_empty() {
                    session.room_name = room_name;
                }
                session.awaiting_grant = true;
                let effect = Effect::RequestGrant {
                    call_id: session.call_id.clone(),
                    room: session.room_name.clone(),
                };
                self.state = CallState::Connected;
                vec![effect]
            }
            SignalFrame::CallRejected {
                call_id,
                from_user_id,
            } => {
                let pending = matches!(self.state, CallState::Calling | CallState::Ringing);
                if !pending || !self.is_current(&call_id, &from_user_id) {
                    return self.stale("call_rejected", &call_id);
                }
                let _ = self.end();
                Vec::new()
            }
            SignalFrame::CallEnded {
                call_id,
                from_user_id,
            } => {
                if !self.state.is_active() || !self.is_current(&call_id, &from_user_id) {
                    return self.stale("call_ended", &call_id);
                }
                match self.end() {
                    Some(session) if session.grant.is_some() => vec![Effect::LeaveMedia],
                    _ => Vec::new(),
                }
            }
            SignalFrame::NewCommunityMessage { .. } | SignalFrame::UserPresence { .. } => {
                Vec::new()
            }
        }
    }

    fn on_grant(&mut self, call_id: &CallId, result: Result<MediaGrant, String>) -> Vec<Effect> {
        let live = self.state.is_live();
        let Some(session) = self.session.as_mut() else {
            return self.stale("grant", call_id);
        };
        if !live || !session.awaiting_grant || session.call_id != *call_id {
            return self.stale("grant", call_id);
        }
        session.awaiting_grant = false;
        match result {
            Ok(grant) => {
                session.grant = Some(grant.clone());
                vec![Effect::JoinMedia(grant)]
            }
            Err(reason) => vec![Effect::MediaUnavailable(reason)],
        }
    }

    fn is_current(&self, call_id: &CallId, from: &UserId) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.call_id == *call_id && s.peer == *from)
    }

    fn end(&mut self) -> Option<CallSession> {
        self.state = CallState::Idle;
        self.session.take()
    }

    fn stale(&self, what: &str, call_id: &CallId) -> Vec<Effect> {
        debug!(what, call_id = %call_id, state = ?self.state, "discarding stale call input");
        Vec::new()
    }
}
