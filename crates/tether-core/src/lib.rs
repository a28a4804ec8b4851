//! # tether-core
//!
//! Foundation types shared by the tether relay, gateway, and call client.
//!
//! - **Branded IDs**: [`ids::UserId`], [`ids::CommunityId`], [`ids::CallId`], [`ids::ConnectionId`]
//! - **Frames**: [`frames::SignalFrame`], the JSON messages the relay pushes to sockets
//! - **Delivery**: [`delivery::DeliveryResult`] and the [`delivery::Targets`] selector
//! - **Media grants**: [`grant::MediaGrant`] and [`grant::Capabilities`]
//! - **Errors**: [`errors::ErrorCode`], the machine-checkable taxonomy shared by every HTTP surface
//! - **Retry**: [`retry::Backoff`] for reconnect delays
//! - **Logging**: [`logging::init_subscriber`]
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other tether crates.

#![deny(unsafe_code)]

pub mod delivery;
pub mod errors;
pub mod frames;
pub mod grant;
pub mod ids;
pub mod logging;
pub mod retry;
