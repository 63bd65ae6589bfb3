//! Top-level composition of the consume and capture sides.

use rowsync_config::shared::{CaptureConfig, PipelineConfig, ValidationError};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::capture::supervisor::{CaptureClientFactory, CaptureSupervisor};
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::conversions::normalize_event;
use crate::error::{ErrorKind, SyncResult};
use crate::reconcile::base::{ConfigStore, SyncReader, SyncWriter};
use crate::reconcile::engine::SyncEngine;
use crate::reconcile::snapshot::ConfigCache;
use crate::router::EventRouter;
use crate::sync_error;
use crate::types::ChangeEvent;
use crate::workers::ShardedWorkerPool;

fn invalid_config(err: ValidationError) -> crate::error::SyncError {
    sync_error!(
        ErrorKind::InvalidConfig,
        "Configuration validation failed",
        err.to_string(),
        source: err
    )
}

/// The consume side of a sync deployment: config cache and refresher,
/// reconciliation engine, dispatch router, and the ordered worker pool.
///
/// Events enter through [`SyncPipeline::submit`] (or the pool handle via
/// [`SyncPipeline::pool`]) and flow pool -> router -> engine -> reader/
/// writer.
pub struct SyncPipeline {
    id: u64,
    pool: Arc<ShardedWorkerPool>,
    router: Arc<EventRouter>,
    cache: Arc<ConfigCache>,
    shutdown_tx: ShutdownTx,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl SyncPipeline {
    /// Validates the config, loads the initial snapshot, and starts every
    /// component.
    pub async fn start<R, W, S>(
        config: &PipelineConfig,
        store: Arc<S>,
        reader: R,
        writer: W,
    ) -> SyncResult<Self>
    where
        R: SyncReader + 'static,
        W: SyncWriter + 'static,
        S: ConfigStore + 'static,
    {
        config.validate().map_err(invalid_config)?;

        let cache = Arc::new(ConfigCache::load(store.as_ref()).await?);
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let refresher = cache.spawn_refresher(
            store,
            Duration::from_secs(config.refresh.interval_secs),
            shutdown_rx,
        );

        let engine = SyncEngine::new(
            format!("sync-engine-{}", config.id),
            cache.clone(),
            reader,
            writer,
        );

        // The engine goes in as the default consumer: its support check reads
        // the live snapshot, so pairs added by a later refresh are routable
        // without re-registration.
        let mut router = EventRouter::new();
        router.set_default(Arc::new(engine));
        let router = Arc::new(router);

        let pool = Arc::new(ShardedWorkerPool::start(router.clone(), &config.pool));

        info!(id = config.id, "started sync pipeline");

        Ok(Self {
            id: config.id,
            pool,
            router,
            cache,
            shutdown_tx,
            refresher: Mutex::new(Some(refresher)),
        })
    }

    /// The identifier of this pipeline.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handle to the worker pool, for producers that submit directly.
    pub fn pool(&self) -> Arc<ShardedWorkerPool> {
        self.pool.clone()
    }

    /// Handle to the dispatch router, for a co-located local transport.
    pub fn router(&self) -> Arc<EventRouter> {
        self.router.clone()
    }

    /// Handle to the config cache.
    pub fn config_cache(&self) -> Arc<ConfigCache> {
        self.cache.clone()
    }

    /// Submits one event for ordered processing.
    ///
    /// Events fresh off the wire are normalized against their declared field
    /// types here; already-normalized events pass through unchanged.
    pub async fn submit(&self, mut event: ChangeEvent) -> SyncResult<()> {
        normalize_event(&mut event);

        self.pool.submit(event).await
    }

    /// Stops the refresher, closes the pool, and waits for admitted events
    /// to drain.
    pub async fn shutdown_and_wait(&self) -> SyncResult<()> {
        self.shutdown_tx.shutdown()?;
        self.pool.shutdown().await?;

        let refresher = self.refresher.lock().unwrap().take();
        if let Some(refresher) = refresher {
            refresher.await.map_err(|err| {
                sync_error!(
                    ErrorKind::WorkerPanic,
                    "Config refresher terminated abnormally",
                    err.to_string()
                )
            })?;
        }

        info!(id = self.id, "sync pipeline shut down");

        Ok(())
    }
}

/// The capture side of a sync deployment: a supervisor over one capture
/// client per configured source group.
pub struct CapturePipeline {
    supervisor: CaptureSupervisor,
}

impl CapturePipeline {
    /// Validates the config and starts the supervisor.
    pub fn start<F>(factory: F, config: &CaptureConfig) -> SyncResult<Self>
    where
        F: CaptureClientFactory + 'static,
    {
        config.validate().map_err(invalid_config)?;

        Ok(Self {
            supervisor: CaptureSupervisor::start(factory, config),
        })
    }

    /// Stops and waits for every capture group.
    pub async fn shutdown_and_wait(&self) -> SyncResult<()> {
        self.supervisor.shutdown().await
    }
}
