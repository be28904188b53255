use crate::error::MediaError;
use crate::media::{LocalMedia, MediaConstraints};
use async_trait::async_trait;

/// Local capture. Implementations wrap whatever produces the samples.
#[async_trait]
pub trait MediaDevice: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia, MediaError>;

    /// Stops capture for tracks from a previous `acquire`.
    async fn release(&self, media: LocalMedia);
}
