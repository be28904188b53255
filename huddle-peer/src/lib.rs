//! Mesh peer-connection orchestration: presence-driven peer lifecycle,
//! offer/answer negotiation over a signaling mailbox, and shared local media.

pub mod config;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod room;
pub mod signaling;
pub mod transport;

pub use config::OrchestratorConfig;
pub use error::*;
pub use room::{Collaborators, NoopObserver, Orchestrator, PeerSnapshot, RoomObserver};
