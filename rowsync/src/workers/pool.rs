use rowsync_config::shared::WorkerPoolConfig;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::router::EventRouter;
use crate::types::ChangeEvent;

/// A pool of worker lanes that processes events with per-key ordering.
///
/// Each event is assigned to a lane by hashing its ordering key, so all
/// events for the same source row land on the same lane and are processed in
/// admission order. Lanes never steal work from each other; a hot key slows
/// only its own lane.
pub struct ShardedWorkerPool {
    lanes: Mutex<Vec<mpsc::Sender<ChangeEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    enqueue_timeout: Duration,
    mask: u64,
}

impl ShardedWorkerPool {
    /// Starts the pool with one task per lane, dispatching through `router`.
    ///
    /// The config must have been validated; the worker count is a power of
    /// two so lane selection reduces to a bit mask.
    pub fn start(router: Arc<EventRouter>, config: &WorkerPoolConfig) -> Self {
        let mut lanes = Vec::with_capacity(config.workers);
        let mut tasks = Vec::with_capacity(config.workers);

        for lane in 0..config.workers {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            lanes.push(tx);
            tasks.push(tokio::spawn(run_lane(lane, rx, router.clone())));
        }

        info!(workers = config.workers, "started worker pool");

        Self {
            lanes: Mutex::new(lanes),
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
            enqueue_timeout: Duration::from_millis(config.enqueue_timeout_ms),
            mask: (config.workers as u64) - 1,
        }
    }

    /// Returns the lane index an ordering key maps to.
    pub fn lane_for(&self, ordering_key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        ordering_key.hash(&mut hasher);

        (hasher.finish() & self.mask) as usize
    }

    /// Submits an event to its lane, waiting up to the enqueue timeout for
    /// queue space.
    ///
    /// Events without a resolvable primary key are rejected: they have no
    /// ordering key, so admitting them would break the per-row ordering
    /// guarantee.
    pub async fn submit(&self, event: ChangeEvent) -> SyncResult<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!(
                ErrorKind::PoolClosed,
                "Worker pool is closed",
                format!("Rejected event {}", event.summary())
            );
        }

        if event.primary_key.is_none() {
            bail!(
                ErrorKind::InvalidEvent,
                "Event has no primary key",
                format!("Rejected event {}", event.summary())
            );
        }

        let lane = self.lane_for(&event.ordering_key());
        let sender = {
            let lanes = self.lanes.lock().unwrap();
            match lanes.get(lane) {
                Some(sender) => sender.clone(),
                None => bail!(
                    ErrorKind::PoolClosed,
                    "Worker pool is shutting down",
                    format!("Rejected event {}", event.summary())
                ),
            }
        };

        match sender.send_timeout(event, self.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(event)) => Err(SyncError::from((
                ErrorKind::AdmissionTimeout,
                "Timed out waiting for worker queue space",
                format!("Lane {lane} queue is full, event {}", event.summary()),
            ))),
            Err(SendTimeoutError::Closed(event)) => Err(SyncError::from((
                ErrorKind::PoolClosed,
                "Worker lane is closed",
                format!("Lane {lane} stopped, event {}", event.summary()),
            ))),
        }
    }

    /// Whether the pool has been closed to new submissions.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the pool and waits for every lane to drain its queue.
    ///
    /// Already-admitted events are still processed; only new submissions are
    /// rejected. Safe to call more than once.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.closed.store(true, Ordering::Release);
        self.lanes.lock().unwrap().clear();

        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        let errors: Vec<SyncError> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .enumerate()
            .filter_map(|(lane, result)| {
                result.err().map(|err| {
                    SyncError::from((
                        ErrorKind::WorkerPanic,
                        "Worker lane terminated abnormally",
                        format!("Lane {lane}: {err}"),
                    ))
                })
            })
            .collect();

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!("worker pool shut down");

        Ok(())
    }
}

async fn run_lane(lane: usize, mut rx: mpsc::Receiver<ChangeEvent>, router: Arc<EventRouter>) {
    debug!(lane, "worker lane started");

    while let Some(event) = rx.recv().await {
        // A failing event must not stall the lane; the failure is logged and
        // the lane moves on to preserve progress for other keys.
        if let Err(err) = router.dispatch(event).await {
            error!(lane, error = %err, "failed to process event");
        }
    }

    debug!(lane, "worker lane drained and exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EventMetadata, EventType, FieldData, FieldType, FieldValue};
    use chrono::Utc;

    fn event(key: i64) -> ChangeEvent {
        ChangeEvent {
            metadata: EventMetadata {
                db: "shop".to_string(),
                table: "orders".to_string(),
                primary_key_name: "id".to_string(),
            },
            timestamp: Utc::now(),
            event_type: EventType::Insert,
            before: None,
            after: Some(Entity::new()),
            primary_key: Some(FieldData {
                name: "id".to_string(),
                value: FieldValue::Integer(key),
                is_primary_key: true,
                field_type: FieldType::Integer,
            }),
        }
    }

    #[tokio::test]
    async fn same_key_maps_to_same_lane() {
        let pool = ShardedWorkerPool::start(Arc::new(EventRouter::new()), &WorkerPoolConfig::default());

        let a = pool.lane_for(&event(7).ordering_key());
        let b = pool.lane_for(&event(7).ordering_key());
        assert_eq!(a, b);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_event_without_primary_key() {
        let pool = ShardedWorkerPool::start(Arc::new(EventRouter::new()), &WorkerPoolConfig::default());

        let mut e = event(1);
        e.primary_key = None;

        let err = pool.submit(e).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEvent);

        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_submissions_after_shutdown() {
        let pool = ShardedWorkerPool::start(Arc::new(EventRouter::new()), &WorkerPoolConfig::default());
        pool.shutdown().await.unwrap();

        let err = pool.submit(event(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PoolClosed);
    }
}
