mod support;

use async_trait::async_trait;
use rand::Rng;
use rowsync::error::{ErrorKind, SyncResult};
use rowsync::pipeline::SyncPipeline;
use rowsync::reconcile::memory::{MemoryConfigStore, MemoryReader, MemoryWriter, ReaderCall, WriterCall};
use rowsync::reconcile::{ConfigCache, ReaderConfig, SyncFlags, WriterConfig};
use rowsync::router::{EventConsumer, EventRouter};
use rowsync::types::{ChangeEvent, FieldData, FieldType, FieldValue};
use rowsync::workers::ShardedWorkerPool;
use rowsync_config::shared::{ConfigRefreshConfig, PipelineConfig, WorkerPoolConfig};
use rowsync_telemetry::tracing::init_test_tracing;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use support::{delete_event, entity, insert_event, update_event};

fn pool_config(workers: usize) -> WorkerPoolConfig {
    WorkerPoolConfig {
        workers,
        queue_capacity: 200,
        enqueue_timeout_ms: 1000,
    }
}

fn pipeline_config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        id: 1,
        pool: pool_config(workers),
        refresh: ConfigRefreshConfig::default(),
    }
}

fn reader_config(id: u64, flags: SyncFlags) -> ReaderConfig {
    ReaderConfig {
        flags: SyncFlags { id, ..flags },
        ..Default::default()
    }
}

fn writer_config(id: u64, flags: SyncFlags) -> WriterConfig {
    WriterConfig {
        flags: SyncFlags { id, ..flags },
        index: "idx_orders".to_string(),
        ..Default::default()
    }
}

fn orders_flags() -> SyncFlags {
    SyncFlags {
        db: "shop".to_string(),
        table: "orders".to_string(),
        ..Default::default()
    }
}

fn seq_event(key: i64, seq: i64) -> ChangeEvent {
    let mut event = insert_event("shop", "orders", key);
    event.after.as_mut().unwrap().insert(FieldData {
        name: "seq".to_string(),
        value: FieldValue::Integer(seq),
        is_primary_key: false,
        field_type: FieldType::Integer,
    });

    event
}

/// Records the per-key sequence numbers it observes, with artificial jitter
/// so out-of-order processing would actually surface.
struct OrderingConsumer {
    seen: Mutex<HashMap<String, Vec<i64>>>,
}

impl OrderingConsumer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl EventConsumer for OrderingConsumer {
    fn name(&self) -> &str {
        "ordering"
    }

    fn supported_tables(&self) -> HashMap<String, Vec<String>> {
        HashMap::from([("shop".to_string(), vec!["orders".to_string()])])
    }

    async fn consume(&self, event: ChangeEvent) -> SyncResult<()> {
        let jitter = rand::thread_rng().gen_range(0..3);
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let seq = match event.after.as_ref().and_then(|after| after.field("seq")) {
            Some(FieldData {
                value: FieldValue::Integer(seq),
                ..
            }) => *seq,
            _ => panic!("event without sequence field"),
        };

        self.seen
            .lock()
            .unwrap()
            .entry(event.ordering_key())
            .or_default()
            .push(seq);

        Ok(())
    }
}

#[tokio::test]
async fn events_sharing_a_key_are_processed_in_admission_order() {
    init_test_tracing();

    let consumer = OrderingConsumer::new();
    let mut router = EventRouter::new();
    router.register(consumer.clone());

    let pool = ShardedWorkerPool::start(Arc::new(router), &pool_config(4));

    for seq in 0..25 {
        for key in 0..4 {
            pool.submit(seq_event(key, seq)).await.unwrap();
        }
    }

    pool.shutdown().await.unwrap();

    let seen = consumer.seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    for sequence in seen.values() {
        assert_eq!(*sequence, (0..25).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn colliding_keys_on_one_lane_keep_per_key_order() {
    init_test_tracing();

    let consumer = OrderingConsumer::new();
    let mut router = EventRouter::new();
    router.register(consumer.clone());

    // One lane forces every key onto the same shard.
    let pool = ShardedWorkerPool::start(Arc::new(router), &pool_config(1));

    for seq in 0..20 {
        pool.submit(seq_event(1, seq)).await.unwrap();
        pool.submit(seq_event(2, seq)).await.unwrap();
    }

    pool.shutdown().await.unwrap();

    let seen = consumer.seen.lock().unwrap();
    for sequence in seen.values() {
        assert_eq!(*sequence, (0..20).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn submitting_to_a_shut_down_pipeline_fails() {
    init_test_tracing();

    let store = Arc::new(MemoryConfigStore::new(
        vec![reader_config(1, orders_flags())],
        vec![writer_config(1, orders_flags())],
    ));
    let pipeline = SyncPipeline::start(
        &pipeline_config(2),
        store,
        MemoryReader::new(),
        MemoryWriter::new(),
    )
    .await
    .unwrap();

    pipeline.shutdown_and_wait().await.unwrap();

    let err = pipeline
        .submit(insert_event("shop", "orders", 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PoolClosed);
}

#[tokio::test]
async fn related_table_insert_upserts_by_page() {
    init_test_tracing();

    let store = Arc::new(MemoryConfigStore::new(
        vec![reader_config(1, orders_flags())],
        vec![writer_config(1, orders_flags())],
    ));
    let reader = MemoryReader::new();
    reader.set_rows(vec![entity(&[]); 120]);
    let writer = MemoryWriter::new();

    let pipeline = SyncPipeline::start(&pipeline_config(2), store, reader.clone(), writer.clone())
        .await
        .unwrap();

    pipeline
        .submit(insert_event("shop", "orders", 1))
        .await
        .unwrap();
    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(
        reader.calls(),
        vec![
            ReaderCall::CountAffected,
            ReaderCall::Page { offset: 0, limit: 50 },
            ReaderCall::Page { offset: 50, limit: 50 },
            ReaderCall::Page { offset: 100, limit: 50 },
        ]
    );
    assert_eq!(
        writer.calls(),
        vec![
            WriterCall::Upsert { rows: 50 },
            WriterCall::Upsert { rows: 50 },
            WriterCall::Upsert { rows: 20 },
        ]
    );
}

#[tokio::test]
async fn short_page_stops_paging_before_stale_count_is_reached() {
    init_test_tracing();

    let store = Arc::new(MemoryConfigStore::new(
        vec![reader_config(1, orders_flags())],
        vec![writer_config(1, orders_flags())],
    ));
    let reader = MemoryReader::new();
    reader.set_rows(vec![entity(&[]); 60]);
    reader.set_count(200);
    let writer = MemoryWriter::new();

    let pipeline = SyncPipeline::start(&pipeline_config(2), store, reader.clone(), writer.clone())
        .await
        .unwrap();

    pipeline
        .submit(insert_event("shop", "orders", 1))
        .await
        .unwrap();
    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(
        writer.calls(),
        vec![
            WriterCall::Upsert { rows: 50 },
            WriterCall::Upsert { rows: 10 },
        ]
    );
}

#[tokio::test]
async fn irrelevant_update_produces_no_reads_or_writes() {
    init_test_tracing();

    let flags = SyncFlags {
        is_main_table: true,
        update_compare_fields: Some("status".to_string()),
        ..orders_flags()
    };
    let store = Arc::new(MemoryConfigStore::new(
        vec![reader_config(1, flags.clone())],
        vec![writer_config(1, flags)],
    ));
    let reader = MemoryReader::new();
    let writer = MemoryWriter::new();

    let pipeline = SyncPipeline::start(&pipeline_config(2), store, reader.clone(), writer.clone())
        .await
        .unwrap();

    pipeline
        .submit(update_event(
            "shop",
            "orders",
            1,
            &[("status", "A"), ("amount", "1")],
            &[("status", "A"), ("amount", "2")],
        ))
        .await
        .unwrap();
    pipeline.shutdown_and_wait().await.unwrap();

    assert!(reader.calls().is_empty());
    assert!(writer.calls().is_empty());
}

#[tokio::test]
async fn soft_delete_update_deletes_target_record() {
    init_test_tracing();

    let flags = SyncFlags {
        is_main_table: true,
        del_whole_data: true,
        del_key_name: Some("status".to_string()),
        has_del_val: Some("DELETED".to_string()),
        ..orders_flags()
    };
    let store = Arc::new(MemoryConfigStore::new(
        vec![reader_config(1, flags.clone())],
        vec![writer_config(1, flags)],
    ));
    let reader = MemoryReader::new();
    let writer = MemoryWriter::new();

    let pipeline = SyncPipeline::start(&pipeline_config(2), store, reader.clone(), writer.clone())
        .await
        .unwrap();

    pipeline
        .submit(update_event(
            "shop",
            "orders",
            1,
            &[("status", "ACTIVE")],
            &[("status", "DELETED")],
        ))
        .await
        .unwrap();
    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(writer.calls(), vec![WriterCall::Delete]);
    assert!(reader.calls().is_empty());
}

#[tokio::test]
async fn main_table_update_upserts_whole_row() {
    init_test_tracing();

    let flags = SyncFlags {
        is_main_table: true,
        ..orders_flags()
    };
    let store = Arc::new(MemoryConfigStore::new(
        vec![reader_config(1, flags.clone())],
        vec![writer_config(1, flags)],
    ));
    let reader = MemoryReader::new();
    reader.set_whole_row(Some(entity(&[("status", "B")])));
    let writer = MemoryWriter::new();

    let pipeline = SyncPipeline::start(&pipeline_config(2), store, reader.clone(), writer.clone())
        .await
        .unwrap();

    pipeline
        .submit(update_event(
            "shop",
            "orders",
            1,
            &[("status", "A")],
            &[("status", "B")],
        ))
        .await
        .unwrap();
    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(reader.calls(), vec![ReaderCall::WholeRow]);
    assert_eq!(writer.calls(), vec![WriterCall::Upsert { rows: 1 }]);
}

#[tokio::test]
async fn delete_without_del_whole_data_recomputes_aggregate() {
    init_test_tracing();

    let store = Arc::new(MemoryConfigStore::new(
        vec![reader_config(1, orders_flags())],
        vec![writer_config(1, orders_flags())],
    ));
    let reader = MemoryReader::new();
    reader.set_rows(vec![entity(&[]); 3]);
    let writer = MemoryWriter::new();

    let pipeline = SyncPipeline::start(&pipeline_config(2), store, reader.clone(), writer.clone())
        .await
        .unwrap();

    pipeline
        .submit(delete_event("shop", "orders", 1, &[("status", "A")]))
        .await
        .unwrap();
    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(writer.calls(), vec![WriterCall::Upsert { rows: 3 }]);
}

#[tokio::test]
async fn pairs_added_by_refresh_become_routable() {
    init_test_tracing();

    // The store starts empty: nothing is routable at startup.
    let store = MemoryConfigStore::new(Vec::new(), Vec::new());
    let reader = MemoryReader::new();
    reader.set_whole_row(Some(entity(&[("status", "A")])));
    let writer = MemoryWriter::new();

    let pipeline = SyncPipeline::start(
        &pipeline_config(2),
        Arc::new(store.clone()),
        reader.clone(),
        writer.clone(),
    )
    .await
    .unwrap();

    let flags = SyncFlags {
        is_main_table: true,
        ..orders_flags()
    };
    store.replace(
        vec![reader_config(1, flags.clone())],
        vec![writer_config(1, flags)],
    );
    pipeline.config_cache().refresh(&store).await.unwrap();

    pipeline
        .submit(insert_event("shop", "orders", 1))
        .await
        .unwrap();
    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(reader.calls(), vec![ReaderCall::WholeRow]);
    assert_eq!(writer.calls(), vec![WriterCall::Upsert { rows: 1 }]);
}

#[tokio::test]
async fn config_refresh_is_fail_open() {
    init_test_tracing();

    let store = MemoryConfigStore::new(
        vec![reader_config(1, orders_flags())],
        vec![writer_config(1, orders_flags())],
    );
    let cache = ConfigCache::load(&store).await.unwrap();
    assert_eq!(cache.current().len(), 1);

    // A failing refresh keeps the previous snapshot.
    store.fail_reads(true);
    assert!(cache.refresh(&store).await.is_err());
    assert_eq!(cache.current().len(), 1);

    // A later successful refresh swaps in the new configs.
    store.fail_reads(false);
    let mut items = orders_flags();
    items.table = "items".to_string();
    store.replace(
        vec![reader_config(1, orders_flags()), reader_config(2, items.clone())],
        vec![writer_config(1, orders_flags()), writer_config(2, items)],
    );
    cache.refresh(&store).await.unwrap();
    assert_eq!(cache.current().len(), 2);
}
