use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::types::ChangeEvent;

/// A processing endpoint for change events.
///
/// Consumers declare the tables they handle up front; the router builds its
/// lookup from those declarations at registration time. An error returned
/// from [`EventConsumer::consume`] propagates to the caller, the router does
/// not swallow reconciliation failures.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Stable name used in log lines.
    fn name(&self) -> &str;

    /// Tables this consumer handles, as db name to table names.
    fn supported_tables(&self) -> HashMap<String, Vec<String>>;

    /// Whether this consumer wants the event.
    ///
    /// Only consulted for the default consumer, which sits outside the table
    /// mapping; the provided implementation checks the declared tables.
    fn supports(&self, event: &ChangeEvent) -> bool {
        self.supported_tables()
            .get(&event.metadata.db)
            .is_some_and(|tables| tables.contains(&event.metadata.table))
    }

    /// Processes a single change event.
    async fn consume(&self, event: ChangeEvent) -> SyncResult<()>;
}

/// Routes change events to registered consumers by `db.table` key.
///
/// Consumers are registered explicitly at startup and the routing table is
/// immutable once the router is shared, so dispatch needs no locking. An
/// optional default consumer runs after the table-mapped consumers for any
/// event it self-reports support for.
#[derive(Default)]
pub struct EventRouter {
    routes: HashMap<String, Vec<Arc<dyn EventConsumer>>>,
    default: Option<Arc<dyn EventConsumer>>,
}

impl EventRouter {
    /// Creates a router with no consumers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer for every table it declares support for.
    ///
    /// Consumers sharing a table are invoked in registration order.
    pub fn register(&mut self, consumer: Arc<dyn EventConsumer>) {
        for (db, tables) in consumer.supported_tables() {
            for table in tables {
                self.routes
                    .entry(format!("{db}.{table}"))
                    .or_default()
                    .push(consumer.clone());
            }
        }
    }

    /// Sets the catch-all consumer invoked for events it reports support for,
    /// independent of the table mapping.
    pub fn set_default(&mut self, consumer: Arc<dyn EventConsumer>) {
        self.default = Some(consumer);
    }

    /// Dispatches an event to every matching consumer in registration order.
    ///
    /// An event nobody handles is not an error: sources often carry tables
    /// this process is not interested in, so it is logged and dropped. A
    /// consumer error stops the dispatch and propagates to the caller.
    pub async fn dispatch(&self, event: ChangeEvent) -> SyncResult<()> {
        let mut handled = false;

        if let Some(consumers) = self.routes.get(&event.table_key()) {
            for consumer in consumers {
                debug!(
                    consumer = consumer.name(),
                    event = %event.summary(),
                    "dispatching event"
                );
                consumer.consume(event.clone()).await?;
                handled = true;
            }
        }

        if let Some(default) = &self.default {
            if default.supports(&event) {
                debug!(
                    consumer = default.name(),
                    event = %event.summary(),
                    "dispatching event to default consumer"
                );
                default.consume(event.clone()).await?;
                handled = true;
            }
        }

        if !handled {
            warn!(table = %event.table_key(), "no consumer registered for event, skipping");
        }

        Ok(())
    }
}
