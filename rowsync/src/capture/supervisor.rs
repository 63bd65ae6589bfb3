use rowsync_config::shared::{CaptureConfig, GroupConfig};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;

/// A connected capture consumer for one source group.
///
/// `run` drives the blocking capture loop until the stream ends, an error
/// occurs, or a checkpoint reset terminates it ([`SaveOutcome::Reset`] from
/// the checkpoint store must end the run so the supervisor restarts the
/// client from the reset position).
///
/// [`SaveOutcome::Reset`]: crate::checkpoint::SaveOutcome::Reset
pub trait CaptureClient: Send + Sync {
    fn run(&self) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Builds a fresh [`CaptureClient`] per group start or restart.
pub trait CaptureClientFactory: Send + Sync {
    type Client: CaptureClient + 'static;

    fn create(&self, group: &GroupConfig) -> impl Future<Output = SyncResult<Self::Client>> + Send;
}

struct GroupState {
    group: GroupConfig,
    /// Set by the worker task when its capture loop exits, for any reason.
    worker_down: AtomicBool,
    /// Set by the supervisor on deliberate shutdown; a downed worker is only
    /// restarted while this is unset, so a liveness check never races a
    /// shutdown into a restart.
    exited: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Runs and heals one capture worker per configured source group.
///
/// A periodic health check restarts any worker that is down and not
/// deliberately exited. Shutdown forcibly aborts the workers, even
/// mid-consume; at-least-once delivery makes the interrupted batch safe to
/// re-consume.
pub struct CaptureSupervisor {
    shutdown_tx: ShutdownTx,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CaptureSupervisor {
    /// Starts one worker and one health-check task per configured group.
    pub fn start<F>(factory: F, config: &CaptureConfig) -> Self
    where
        F: CaptureClientFactory + 'static,
    {
        let factory = Arc::new(factory);
        let (shutdown_tx, _) = create_shutdown_channel();
        let interval = Duration::from_secs(config.health_check_interval_secs);

        let tasks = config
            .groups
            .iter()
            .map(|group| {
                let state = Arc::new(GroupState {
                    group: group.clone(),
                    worker_down: AtomicBool::new(false),
                    exited: AtomicBool::new(false),
                    worker: Mutex::new(None),
                });

                tokio::spawn(supervise_group(
                    factory.clone(),
                    state,
                    interval,
                    shutdown_tx.subscribe(),
                ))
            })
            .collect();

        info!(groups = config.groups.len(), "started capture supervisor");

        Self {
            shutdown_tx,
            tasks: Mutex::new(tasks),
        }
    }

    /// Stops every group: marks them exited, aborts the capture workers, and
    /// waits for the supervision tasks to finish.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx.shutdown()?;

        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            task.await.map_err(|err| {
                sync_error!(
                    ErrorKind::WorkerPanic,
                    "Supervision task terminated abnormally",
                    err.to_string()
                )
            })?;
        }

        info!("capture supervisor shut down");

        Ok(())
    }
}

async fn supervise_group<F>(
    factory: Arc<F>,
    state: Arc<GroupState>,
    interval: Duration,
    mut shutdown_rx: ShutdownRx,
) where
    F: CaptureClientFactory + 'static,
{
    start_worker(&factory, &state).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                state.exited.store(true, Ordering::Release);
                if let Some(worker) = state.worker.lock().unwrap().take() {
                    worker.abort();
                }
                debug!(group_id = %state.group.group_id, "capture group exited");
                break;
            }
            _ = ticker.tick() => {
                if state.worker_down.load(Ordering::Acquire)
                    && !state.exited.load(Ordering::Acquire)
                {
                    warn!(group_id = %state.group.group_id, "capture worker down, restarting");
                    start_worker(&factory, &state).await;
                }
            }
        }
    }
}

async fn start_worker<F>(factory: &Arc<F>, state: &Arc<GroupState>)
where
    F: CaptureClientFactory + 'static,
{
    state.worker_down.store(false, Ordering::Release);

    let client = match factory.create(&state.group).await {
        Ok(client) => client,
        Err(err) => {
            error!(
                group_id = %state.group.group_id,
                error = %err,
                "failed to create capture client"
            );
            state.worker_down.store(true, Ordering::Release);

            return;
        }
    };

    let worker_state = state.clone();
    let worker = tokio::spawn(async move {
        debug!(group_id = %worker_state.group.group_id, "capture worker started");

        match client.run().await {
            Ok(()) => info!(group_id = %worker_state.group.group_id, "capture worker exited"),
            Err(err) => warn!(
                group_id = %worker_state.group.group_id,
                error = %err,
                "capture worker failed"
            ),
        }

        worker_state.worker_down.store(true, Ordering::Release);
    });

    *state.worker.lock().unwrap() = Some(worker);
}
