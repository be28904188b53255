mod orchestrator;
mod registry;
mod room_actor;
mod room_command;
mod room_observer;

pub use orchestrator::*;
pub use registry::*;
pub use room_observer::*;
