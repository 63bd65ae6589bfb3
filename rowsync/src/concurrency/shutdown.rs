use tokio::sync::watch;

use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;

/// Sending half of a shutdown channel.
///
/// Cloneable so multiple owners can trigger the same shutdown. Dropping all
/// senders does not signal shutdown; only an explicit [`ShutdownTx::shutdown`]
/// call does.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Signals shutdown to every subscribed [`ShutdownRx`].
    pub fn shutdown(&self) -> SyncResult<()> {
        self.0.send(()).map_err(|_| {
            sync_error!(
                ErrorKind::InvalidState,
                "Failed to send shutdown signal",
                "All shutdown receivers have been dropped"
            )
        })
    }

    /// Creates a new receiver subscribed to this sender.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Receiving half of a shutdown channel.
///
/// Await `changed()` inside a `select!` arm to react to shutdown.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a connected shutdown channel pair.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());

    (ShutdownTx(tx), rx)
}
