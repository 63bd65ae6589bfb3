use rowsync_config::shared::TransportConfig;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, SyncResult};
use crate::transport::base::{BrokerClient, SendStatus, Transport};
use crate::types::ChangeEvent;

/// Broker-backed ordered transport with bounded local retry buffering.
///
/// Sends are admitted to a bounded queue serviced by a single sender task,
/// so the broker's ordered send is invoked strictly in admission order and
/// events sharing an ordering key land on their partition in the order they
/// were produced. A failed send lands on a second bounded queue serviced by
/// a retry loop that makes a small number of further attempts; an event that
/// still cannot be delivered is dropped with an alert-level log, never
/// re-queued. Events stuck in either queue at shutdown are drained and
/// logged individually, making the data-loss boundary visible.
pub struct BrokerTransport<C> {
    shared: Arc<Shared<C>>,
    send_tx: mpsc::Sender<(ChangeEvent, Vec<u8>)>,
    shutdown_tx: ShutdownTx,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared<C> {
    client: C,
    topic: String,
    max_send_attempts: u32,
    retry_tx: mpsc::Sender<ChangeEvent>,
    closed: AtomicBool,
}

impl<C> BrokerTransport<C>
where
    C: BrokerClient + 'static,
{
    /// Starts the transport, its sender task, and its retry loop.
    pub fn start(client: C, config: &TransportConfig) -> Self {
        let (send_tx, send_rx) = mpsc::channel(config.retry_queue_capacity);
        let (retry_tx, retry_rx) = mpsc::channel(config.retry_queue_capacity);
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let shared = Arc::new(Shared {
            client,
            topic: config.topic.clone(),
            max_send_attempts: config.max_send_attempts,
            retry_tx,
            closed: AtomicBool::new(false),
        });

        let tasks = vec![
            tokio::spawn(run_send_loop(shared.clone(), send_rx, shutdown_rx.clone())),
            tokio::spawn(run_retry_loop(shared.clone(), retry_rx, shutdown_rx)),
        ];

        info!(topic = %config.topic, "started broker transport");

        Self {
            shared,
            send_tx,
            shutdown_tx,
            tasks: Mutex::new(tasks),
        }
    }

    /// Whether the transport has been closed to new sends.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Closes the transport and waits for the sender and retry loops to
    /// drain.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shared.closed.store(true, Ordering::Release);

        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        if !tasks.is_empty() {
            self.shutdown_tx.shutdown()?;
            for task in tasks {
                task.await.map_err(|err| {
                    crate::sync_error!(
                        ErrorKind::WorkerPanic,
                        "Transport task terminated abnormally",
                        err.to_string()
                    )
                })?;
            }
        }

        info!("broker transport shut down");

        Ok(())
    }
}

impl<C> Transport for BrokerTransport<C>
where
    C: BrokerClient + 'static,
{
    async fn send(&self, event: ChangeEvent) -> SyncResult<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            bail!(
                ErrorKind::TransportClosed,
                "Transport is closed",
                format!("Rejected event {}", event.summary())
            );
        }

        let payload = serde_json::to_vec(&event)?;

        if let Err(mpsc::error::SendError((event, _))) =
            self.send_tx.send((event, payload)).await
        {
            bail!(
                ErrorKind::TransportClosed,
                "Transport send queue is closed",
                format!("Rejected event {}", event.summary())
            );
        }

        Ok(())
    }
}

fn enqueue_retry<C>(shared: &Shared<C>, event: ChangeEvent, reason: &str) {
    match shared.retry_tx.try_send(event) {
        Ok(()) => debug!(reason, "queued event for retry"),
        Err(mpsc::error::TrySendError::Full(event)) => {
            error!(
                event = %event.summary(),
                "retry queue full, event lost and requires manual replay"
            );
        }
        Err(mpsc::error::TrySendError::Closed(event)) => {
            error!(
                event = %event.summary(),
                "retry queue closed, event lost and requires manual replay"
            );
        }
    }
}

/// Invokes the broker's ordered send for admitted events, one at a time, in
/// admission order. Only the failure path leaves this ordering: a rejected
/// or errored event moves to the retry queue while newer traffic proceeds.
async fn run_send_loop<C: BrokerClient>(
    shared: Arc<Shared<C>>,
    mut send_rx: mpsc::Receiver<(ChangeEvent, Vec<u8>)>,
    mut shutdown_rx: ShutdownRx,
) {
    debug!("transport send loop started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            maybe_event = send_rx.recv() => match maybe_event {
                Some((event, payload)) => send_once(&shared, event, payload).await,
                None => break,
            }
        }
    }

    send_rx.close();
    while let Ok((event, _)) = send_rx.try_recv() {
        error!(event = %event.summary(), "event lost in send queue at shutdown");
    }

    debug!("transport send loop exited");
}

async fn send_once<C: BrokerClient>(shared: &Shared<C>, event: ChangeEvent, payload: Vec<u8>) {
    let status = shared
        .client
        .send_ordered(&shared.topic, &event.ordering_key(), payload)
        .await;

    match status {
        Ok(SendStatus::Ok) => {}
        Ok(SendStatus::Failed) => enqueue_retry(shared, event, "broker rejected send"),
        Err(err) => {
            warn!(error = %err, event = %event.summary(), "ordered send failed");
            enqueue_retry(shared, event, "send error");
        }
    }
}

async fn run_retry_loop<C: BrokerClient>(
    shared: Arc<Shared<C>>,
    mut retry_rx: mpsc::Receiver<ChangeEvent>,
    mut shutdown_rx: ShutdownRx,
) {
    debug!("transport retry loop started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            maybe_event = retry_rx.recv() => match maybe_event {
                Some(event) => retry_send(&shared, event).await,
                None => break,
            }
        }
    }

    // Shutdown drain: every event still buffered here is lost, and each one
    // is logged so the loss is visible rather than silent.
    retry_rx.close();
    while let Ok(event) = retry_rx.try_recv() {
        error!(event = %event.summary(), "event lost in retry queue at shutdown");
    }

    debug!("transport retry loop exited");
}

/// Makes up to `max_send_attempts` synchronous sends, stopping at the first
/// success. A still-undelivered event is dropped with one alert-level log.
async fn retry_send<C: BrokerClient>(shared: &Shared<C>, event: ChangeEvent) {
    let payload = match serde_json::to_vec(&event) {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, event = %event.summary(), "cannot serialize event for retry, dropping");
            return;
        }
    };

    for attempt in 1..=shared.max_send_attempts {
        match shared
            .client
            .send_ordered(&shared.topic, &event.ordering_key(), payload.clone())
            .await
        {
            Ok(SendStatus::Ok) => {
                debug!(attempt, event = %event.summary(), "retry send succeeded");
                return;
            }
            Ok(SendStatus::Failed) => {
                warn!(attempt, event = %event.summary(), "retry send rejected by broker");
            }
            Err(err) => {
                warn!(attempt, error = %err, event = %event.summary(), "retry send failed");
            }
        }
    }

    error!(
        attempts = shared.max_send_attempts,
        event = %event.summary(),
        "event undeliverable after bounded retries, dropping"
    );
}
