use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::SyncResult;
use crate::reconcile::base::{SyncReader, SyncWriter};
use crate::reconcile::config::SyncFlags;
use crate::reconcile::snapshot::{ConfigCache, ConfigPair};
use crate::router::EventConsumer;
use crate::types::{ChangeEvent, EventType};

/// Default page size for the by-page upsert path.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// The single write decision computed for one config pair and one event.
///
/// Re-routing between the update and delete paths is bounded to one hop in
/// each direction: an UPDATE may become a `DeleteRow` via the soft-delete
/// rule, and a DELETE may fall back to an update-shaped intent, but never
/// back again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Nothing to write; the change is not relevant to this pair.
    Skip,
    /// Fetch the whole row and upsert it.
    UpsertRow,
    /// Fetch a projection and push a query-based partial update.
    PartialUpdate,
    /// Count affected rows and upsert them page by page.
    PagedUpsert,
    /// Delete the target record.
    DeleteRow,
}

/// Computes the write intent for one config pair and one event.
///
/// Pure over its inputs; the engine executes the returned intent against the
/// reader/writer collaborators.
pub fn decide(pair: &ConfigPair, event: &ChangeEvent) -> Intent {
    match event.event_type {
        EventType::Insert => insert_intent(pair),
        EventType::Update => update_intent(pair, event, true),
        EventType::Delete => delete_intent(pair, event),
    }
}

fn insert_intent(pair: &ConfigPair) -> Intent {
    if pair.reader.flags.is_main_table {
        Intent::UpsertRow
    } else {
        // An inserted related row may invalidate a large parent aggregate,
        // so it is re-materialized page by page.
        Intent::PagedUpsert
    }
}

fn update_intent(pair: &ConfigPair, event: &ChangeEvent, allow_delete_reroute: bool) -> Intent {
    if !update_is_relevant(&pair.reader.flags, event) {
        return Intent::Skip;
    }

    if allow_delete_reroute
        && pair.reader.flags.del_whole_data
        && marks_soft_delete(&pair.reader.flags, event)
    {
        return Intent::DeleteRow;
    }

    if pair.reader.flags.is_main_table {
        return Intent::UpsertRow;
    }

    // A DELETE cascading through here has no after image to project a
    // partial update from; the parent aggregate is re-materialized instead.
    if pair.reader.flags.update_by_query && event.event_type != EventType::Delete {
        return Intent::PartialUpdate;
    }

    Intent::PagedUpsert
}

fn delete_intent(pair: &ConfigPair, event: &ChangeEvent) -> Intent {
    if pair.writer.flags.del_whole_data {
        Intent::DeleteRow
    } else {
        // A physical delete of a related row is an update-shaped cascade:
        // dependent aggregates are recomputed, not deleted.
        update_intent(pair, event, false)
    }
}

/// Change-relevance filter over the configured compare fields.
///
/// An empty compare list means every update is relevant. A field present in
/// one image and missing in the other counts as changed.
fn update_is_relevant(reader: &SyncFlags, event: &ChangeEvent) -> bool {
    let fields = reader.compare_fields();
    if fields.is_empty() {
        return true;
    }

    let (before, after) = match (&event.before, &event.after) {
        (None, None) => return false,
        (Some(before), Some(after)) => (before, after),
        _ => return true,
    };

    for name in fields {
        match (before.field(name), after.field(name)) {
            (None, None) => continue,
            (Some(b), Some(a)) if b.value == a.value => continue,
            _ => return true,
        }
    }

    false
}

/// Whether this event marks the row as logically deleted.
fn marks_soft_delete(reader: &SyncFlags, event: &ChangeEvent) -> bool {
    let Some(del_key) = reader.del_key_name.as_deref() else {
        return false;
    };

    if event.event_type == EventType::Delete {
        return true;
    }

    let Some(has_del_val) = reader.has_del_val.as_deref() else {
        return false;
    };

    event
        .after
        .as_ref()
        .and_then(|after| after.field(del_key))
        .is_some_and(|field| field.value.to_plain_string() == has_del_val)
}

/// Config-driven reconciliation engine over one reader/writer pair of
/// collaborators.
///
/// Implements [`EventConsumer`]: each consumed event is resolved against the
/// current config snapshot and every matched pair is reconciled in turn.
/// The engine performs no retries of its own; collaborator errors propagate
/// to the worker lane, which logs and moves on.
pub struct SyncEngine<R, W> {
    name: String,
    cache: Arc<ConfigCache>,
    reader: R,
    writer: W,
    page_size: u64,
}

impl<R, W> SyncEngine<R, W>
where
    R: SyncReader,
    W: SyncWriter,
{
    /// Creates an engine over the given collaborators.
    pub fn new(name: impl Into<String>, cache: Arc<ConfigCache>, reader: R, writer: W) -> Self {
        Self {
            name: name.into(),
            cache,
            reader,
            writer,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the by-page upsert page size.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;

        self
    }

    async fn apply(&self, pair: &ConfigPair, intent: Intent, event: &ChangeEvent) -> SyncResult<()> {
        match intent {
            Intent::Skip => {
                debug!(event = %event.summary(), "no relevant change, skipping");
            }
            Intent::UpsertRow => match self.reader.whole_row(&pair.reader, event).await? {
                Some(row) => self.writer.upsert(&pair.writer, vec![row]).await?,
                None => {
                    debug!(event = %event.summary(), "source row no longer exists, skipping upsert");
                }
            },
            Intent::PartialUpdate => match self.reader.update_projection(&pair.reader, event).await? {
                Some(projection) if !projection.fields.is_empty() => {
                    self.writer.partial_update(&pair.writer, projection).await?;
                }
                _ => {
                    debug!(event = %event.summary(), "empty update projection, skipping");
                }
            },
            Intent::PagedUpsert => self.paged_upsert(pair, event).await?,
            Intent::DeleteRow => self.writer.delete(&pair.writer, event).await?,
        }

        Ok(())
    }

    /// Upserts the affected rows in fixed-size pages.
    ///
    /// The count and the pages are eventually consistent with the underlying
    /// data, not transactionally consistent: a short or empty page means "no
    /// more data" and stops the loop even when the counted total has not
    /// been reached.
    async fn paged_upsert(&self, pair: &ConfigPair, event: &ChangeEvent) -> SyncResult<()> {
        let count = self.reader.count_affected(&pair.reader, event).await?;
        if count == 0 {
            debug!(event = %event.summary(), "no affected rows");

            return Ok(());
        }

        let mut offset = 0;
        while offset < count {
            let page = self
                .reader
                .page(&pair.reader, event, offset, self.page_size)
                .await?;
            if page.is_empty() {
                debug!(offset, count, "empty page before counted total, stopping");
                break;
            }

            let short = (page.len() as u64) < self.page_size;
            self.writer.upsert(&pair.writer, page).await?;

            if short {
                break;
            }
            offset += self.page_size;
        }

        Ok(())
    }
}

#[async_trait]
impl<R, W> EventConsumer for SyncEngine<R, W>
where
    R: SyncReader + 'static,
    W: SyncWriter + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_tables(&self) -> HashMap<String, Vec<String>> {
        let snapshot = self.cache.current();
        let mut tables: HashMap<String, Vec<String>> = HashMap::new();

        for key in snapshot.table_keys() {
            if let Some((db, table)) = key.split_once('.') {
                tables.entry(db.to_string()).or_default().push(table.to_string());
            }
        }

        tables
    }

    async fn consume(&self, event: ChangeEvent) -> SyncResult<()> {
        let snapshot = self.cache.current();
        let pairs = snapshot.pairs_for(&event.table_key());
        if pairs.is_empty() {
            debug!(table = %event.table_key(), "no config pair for event, skipping");

            return Ok(());
        }

        for pair in pairs {
            let intent = decide(pair, &event);
            debug!(
                id = pair.reader.flags.id,
                ?intent,
                event = %event.summary(),
                "reconciling event"
            );
            self.apply(pair, intent, &event).await?;
        }

        Ok(())
    }
}
