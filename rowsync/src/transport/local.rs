use std::sync::Arc;

use crate::error::SyncResult;
use crate::router::EventRouter;
use crate::transport::base::Transport;
use crate::types::ChangeEvent;

/// Direct hand-off into the dispatch router, used when capture and
/// reconciliation are co-located in one process.
///
/// The send completes only when the event has been fully dispatched, so the
/// caller's send order is the processing order and a failure is a direct
/// error to the caller.
pub struct LocalTransport {
    router: Arc<EventRouter>,
}

impl LocalTransport {
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self { router }
    }
}

impl Transport for LocalTransport {
    async fn send(&self, event: ChangeEvent) -> SyncResult<()> {
        self.router.dispatch(event).await
    }
}
