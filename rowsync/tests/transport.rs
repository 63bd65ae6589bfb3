mod support;

use rowsync::error::ErrorKind;
use rowsync::transport::{BrokerTransport, MemoryBroker, Transport};
use rowsync::types::{ChangeEvent, EventType, FieldValue};
use rowsync_config::shared::TransportConfig;
use rowsync_telemetry::tracing::init_test_tracing;
use std::time::Duration;

use support::{entity, event, insert_event, wait_until};

fn transport_config() -> TransportConfig {
    TransportConfig {
        topic: "changes".to_string(),
        retry_queue_capacity: 100,
        max_send_attempts: 3,
    }
}

#[tokio::test]
async fn delivers_events_with_their_ordering_key() {
    init_test_tracing();

    let broker = MemoryBroker::new();
    let transport = BrokerTransport::start(broker.clone(), &transport_config());

    let event = insert_event("shop", "orders", 42);
    let key = event.ordering_key();
    transport.send(event).await.unwrap();

    let viewer = broker.clone();
    wait_until(
        || {
            let viewer = viewer.clone();
            async move { viewer.delivered().len() == 1 }
        },
        Duration::from_secs(2),
        "event delivery",
    )
    .await;

    let (topic, delivered_key, _payload) = broker.delivered().remove(0);
    assert_eq!(topic, "changes");
    assert_eq!(delivered_key, key);

    transport.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_key_sends_reach_the_broker_in_submission_order() {
    init_test_tracing();

    let broker = MemoryBroker::new();
    let transport = BrokerTransport::start(broker.clone(), &transport_config());

    // Every event shares one primary key, so they all carry the same
    // ordering key and must hit the broker in the order they were sent.
    for seq in 0..300 {
        let e = event(
            "shop",
            "orders",
            7,
            EventType::Insert,
            None,
            Some(entity(&[("seq", &seq.to_string())])),
        );
        transport.send(e).await.unwrap();
    }

    let viewer = broker.clone();
    wait_until(
        || {
            let viewer = viewer.clone();
            async move { viewer.delivered().len() == 300 }
        },
        Duration::from_secs(5),
        "ordered delivery",
    )
    .await;

    let sequence: Vec<FieldValue> = broker
        .delivered()
        .iter()
        .map(|(_, _, payload)| {
            let delivered: ChangeEvent = serde_json::from_slice(payload).unwrap();
            delivered.after.unwrap().field("seq").unwrap().value.clone()
        })
        .collect();
    let expected: Vec<FieldValue> = (0..300)
        .map(|seq: i64| FieldValue::String(seq.to_string()))
        .collect();
    assert_eq!(sequence, expected);

    transport.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_send_is_retried_until_success() {
    init_test_tracing();

    let broker = MemoryBroker::new();
    // The first send and the first retry fail, the second retry lands.
    broker.fail_next(2);
    let transport = BrokerTransport::start(broker.clone(), &transport_config());

    transport
        .send(insert_event("shop", "orders", 1))
        .await
        .unwrap();

    let viewer = broker.clone();
    wait_until(
        || {
            let viewer = viewer.clone();
            async move { viewer.delivered().len() == 1 }
        },
        Duration::from_secs(2),
        "retried delivery",
    )
    .await;

    assert_eq!(broker.attempts().len(), 3);

    transport.shutdown().await.unwrap();
}

#[tokio::test]
async fn undeliverable_event_is_dropped_after_bounded_attempts() {
    init_test_tracing();

    let broker = MemoryBroker::new();
    // One failed send plus three failed retry attempts.
    broker.fail_next(4);
    let transport = BrokerTransport::start(broker.clone(), &transport_config());

    transport
        .send(insert_event("shop", "orders", 1))
        .await
        .unwrap();

    let viewer = broker.clone();
    wait_until(
        || {
            let viewer = viewer.clone();
            async move { viewer.attempts().len() == 4 }
        },
        Duration::from_secs(2),
        "bounded retry attempts",
    )
    .await;

    // The event is not re-queued: no further attempts happen.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.attempts().len(), 4);
    assert!(broker.delivered().is_empty());

    // The transport still delivers subsequent events.
    transport
        .send(insert_event("shop", "orders", 2))
        .await
        .unwrap();
    let viewer = broker.clone();
    wait_until(
        || {
            let viewer = viewer.clone();
            async move { viewer.delivered().len() == 1 }
        },
        Duration::from_secs(2),
        "delivery after drop",
    )
    .await;

    transport.shutdown().await.unwrap();
}

#[tokio::test]
async fn transport_errors_are_retried_like_rejections() {
    init_test_tracing();

    let broker = MemoryBroker::new();
    broker.error_next(1);
    let transport = BrokerTransport::start(broker.clone(), &transport_config());

    transport
        .send(insert_event("shop", "orders", 1))
        .await
        .unwrap();

    let viewer = broker.clone();
    wait_until(
        || {
            let viewer = viewer.clone();
            async move { viewer.delivered().len() == 1 }
        },
        Duration::from_secs(2),
        "delivery after transport error",
    )
    .await;

    assert_eq!(broker.attempts().len(), 2);

    transport.shutdown().await.unwrap();
}

#[tokio::test]
async fn closed_transport_rejects_new_sends() {
    init_test_tracing();

    let broker = MemoryBroker::new();
    let transport = BrokerTransport::start(broker.clone(), &transport_config());
    transport.shutdown().await.unwrap();

    let err = transport
        .send(insert_event("shop", "orders", 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportClosed);
}

#[tokio::test]
async fn shutdown_completes_with_events_stuck_in_retry() {
    init_test_tracing();

    let broker = MemoryBroker::new();
    // Every send fails, so the events pile up in the retry path.
    broker.fail_next(u32::MAX);
    let transport = BrokerTransport::start(broker.clone(), &transport_config());

    for id in 0..5 {
        transport
            .send(insert_event("shop", "orders", id))
            .await
            .unwrap();
    }

    // Shutdown drains the queue, logging each lost event, and terminates.
    tokio::time::sleep(Duration::from_millis(50)).await;
    transport.shutdown().await.unwrap();

    assert!(broker.delivered().is_empty());
}
