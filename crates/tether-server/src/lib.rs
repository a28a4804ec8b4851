//! # tether-server
//!
//! HTTP and WebSocket surface of the tether signaling stack.
//!
//! - **Relay**: [`relay::SignalingRelay`] holds live sockets in a
//!   [`relay::ConnectionRegistry`] and pushes frames best-effort
//! - **Gateway**: [`gateway::NotificationGateway`] classifies notify
//!   requests (direct, presence, community) and fans them out through any
//!   [`relay::FrameDelivery`]
//! - **Tokens**: [`token::TokenBroker`] signs short-lived media grants
//! - **Auth**: [`auth::Authenticator`] verifies bearer tokens when configured
//! - **HTTP**: [`http::router`] mounts whichever components this process runs
//! - **Server**: [`server::run`] wires components from settings and serves
//!
//! ## Crate Position
//!
//! Depends on tether-core and tether-settings. Depended on by the `tether`
//! binary.

#![deny(unsafe_code)]

pub mod auth;
pub mod gateway;
pub mod http;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod token;

pub use server::{ServerError, ServerMode};
