mod constraints;
mod local_media;
mod media_device;
mod synthetic;

pub use constraints::*;
pub use local_media::*;
pub use media_device::*;
pub use synthetic::*;
