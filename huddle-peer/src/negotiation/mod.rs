mod machine;
mod peer_task;
mod state;

pub use machine::*;
pub(crate) use peer_task::*;
pub use state::*;
