mod mailbox;
mod memory;
mod presence;
mod relay_client;

pub use mailbox::*;
pub use memory::*;
pub use presence::*;
pub use relay_client::*;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::mpsc;

pub(crate) fn receiver_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}
