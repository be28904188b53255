pub mod mock_link;
pub mod mock_relay;
pub mod recording_observer;

pub use mock_link::*;
pub use mock_media::*;
pub use mock_relay::*;
pub use recording_observer::*;
pub use room_helpers::*;
pub use scripted_presence::*;
