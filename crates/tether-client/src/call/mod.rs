//! Call lifecycle.
//!
//! [`CallStateMachine`] is the pure transition function; [`CallDriver`]
//! runs it against the network.

mod driver;
mod machine;
mod types;

pub use driver::{
    CallDriver, CallHandle, CallSnapshot, GrantSource, MediaCommand, RunningCall, Signaler,
};
pub use machine::CallStateMachine;
pub use types::{CallEvent, CallSession, CallState, Direction, Effect};
