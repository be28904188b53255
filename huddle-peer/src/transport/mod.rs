mod link;
mod transport_config;
mod transport_event;
mod webrtc_link;

pub use link::*;
pub use transport_config::*;
pub use transport_event::*;
pub use webrtc_link::*;
