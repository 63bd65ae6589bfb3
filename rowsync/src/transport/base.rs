use std::future::Future;

use crate::error::SyncResult;
use crate::types::ChangeEvent;

/// Outcome reported by the broker for a delivered send call.
///
/// Distinct from a transport error: `Failed` means the broker took the call
/// and rejected the message, an `Err` means the call itself did not
/// complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Ok,
    Failed,
}

/// Hands events to the next pipeline stage, preserving per-key order.
pub trait Transport: Send + Sync {
    /// Sends one event. Errors once the transport is closed.
    fn send(&self, event: ChangeEvent) -> impl Future<Output = SyncResult<()>> + Send;
}

/// The broker's ordered-send surface.
///
/// Messages sharing an ordering key must land on the same partition so the
/// consumer observes them in send order.
pub trait BrokerClient: Send + Sync {
    /// Sends one serialized event to the topic, ordered by `ordering_key`.
    fn send_ordered(
        &self,
        topic: &str,
        ordering_key: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = SyncResult<SendStatus>> + Send;
}
