//! Signaling relay: live sockets, the registry behind them, and delivery.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | One registered socket: outbound queue, drop counter, close token |
//! | `registry` | Identity and community indexes over live connections |
//! | `signaling` | [`SignalingRelay`]: accept, close, best-effort fan-out |
//! | `delivery` | [`FrameDelivery`] seam used by the gateway |
//! | `socket` | WebSocket upgrade and per-connection write loop |
//! | `internal` | `POST /internal/deliver` for out-of-process gateways |
//! | `remote` | [`RemoteRelay`], the gateway side of `internal` |
//!
//! ## Data Flow
//!
//! `socket` → `signaling::accept_connection` → `registry`.
//! Gateway → [`FrameDelivery::deliver`] → `registry::resolve` → per-connection queue → `socket`.

pub mod connection;
pub mod delivery;
pub mod internal;
pub mod registry;
pub mod remote;
pub mod signaling;
pub mod socket;

pub use connection::{ClientConnection, SendOutcome};
pub use delivery::{DeliveryError, FrameDelivery};
pub use internal::{DeliverRequest, RELAY_TOKEN_HEADER};
pub use registry::ConnectionRegistry;
pub use remote::RemoteRelay;
pub use signaling::{CloseReason, SignalingRelay};
