//! # tether-client
//!
//! Client side of the tether signaling stack.
//!
//! - **Calls**: [`call::CallStateMachine`] is the sans-IO call lifecycle;
//!   [`call::CallDriver`] runs it against the relay and gateway
//! - **Relay link**: [`connection::RelayConnection`] owns the session's one
//!   socket and reconnects with backoff
//! - **Gateway**: [`gateway_client::GatewayClient`] sends signaling through
//!   `/notify` and fetches media grants from `/token`
//! - **Presence**: [`presence::PresenceTracker`] refreshes last-seen on an
//!   interval
//!
//! ## Crate Position
//!
//! Depends on tether-core and tether-settings. Depended on by the `tether`
//! binary.

#![deny(unsafe_code)]

pub mod call;
pub mod connection;
pub mod errors;
pub mod gateway_client;
pub mod presence;

pub use errors::{CallError, ClientError};
