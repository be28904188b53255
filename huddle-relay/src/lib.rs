//! WebSocket relay hosting room presence and signaling mailboxes.
//!
//! Each participant opens one socket per room at `/ws/{room}/{participant}`.
//! The socket is the participant's identity: records and messages that claim
//! another participant are rejected, and the participant's presence record is
//! retracted when the socket closes.

pub mod config;
pub mod error;
pub mod server;
pub mod signaling;

pub use config::RelayConfig;
pub use error::RelayError;
pub use server::{RelayServer, router};
pub use signaling::{ConnectionId, RelayState};
