use argus_core::bus::QueueBus;
use argus_core::messages::{Queue, PRIORITY_INITIAL, PRIORITY_RETRY};
use argus_db::PgQueueBus;

use crate::integration::common::setup_test_db;

fn payload(n: i64) -> serde_json::Value {
    serde_json::json!({ "n": n })
}

#[tokio::test]
async fn publish_then_claim_roundtrips_payload() {
    let (pool, _container) = setup_test_db().await;
    let bus = PgQueueBus::new(pool);

    bus.publish(Queue::Requests, payload(1), PRIORITY_INITIAL)
        .await
        .unwrap();

    let delivery = bus
        .claim(Queue::Requests, "worker-1")
        .await
        .unwrap()
        .expect("Should claim the message");
    assert_eq!(delivery.payload, payload(1));
}

#[tokio::test]
async fn claim_returns_none_on_empty_queue() {
    let (pool, _container) = setup_test_db().await;
    let bus = PgQueueBus::new(pool);

    assert!(bus.claim(Queue::Requests, "worker-1").await.unwrap().is_none());
}

#[tokio::test]
async fn claimed_message_is_invisible_to_other_consumers() {
    let (pool, _container) = setup_test_db().await;
    let bus = PgQueueBus::new(pool);

    bus.publish(Queue::Requests, payload(1), PRIORITY_INITIAL)
        .await
        .unwrap();

    let first = bus.claim(Queue::Requests, "worker-1").await.unwrap();
    assert!(first.is_some());
    let second = bus.claim(Queue::Requests, "worker-2").await.unwrap();
    assert!(second.is_none(), "claim holds the message");
}

#[tokio::test]
async fn queues_are_isolated() {
    let (pool, _container) = setup_test_db().await;
    let bus = PgQueueBus::new(pool);

    bus.publish(Queue::Started, payload(1), PRIORITY_INITIAL)
        .await
        .unwrap();

    assert!(bus.claim(Queue::Results, "c").await.unwrap().is_none());
    assert!(bus.claim(Queue::Started, "c").await.unwrap().is_some());
}

#[tokio::test]
async fn higher_priority_is_delivered_first() {
    let (pool, _container) = setup_test_db().await;
    let bus = PgQueueBus::new(pool);

    bus.publish(Queue::Requests, payload(1), PRIORITY_INITIAL)
        .await
        .unwrap();
    bus.publish(Queue::Requests, payload(2), PRIORITY_RETRY)
        .await
        .unwrap();

    let first = bus.claim(Queue::Requests, "w").await.unwrap().unwrap();
    assert_eq!(first.payload, payload(2), "retry jumps the queue");
    let second = bus.claim(Queue::Requests, "w").await.unwrap().unwrap();
    assert_eq!(second.payload, payload(1));
}

#[tokio::test]
async fn equal_priority_is_fifo() {
    let (pool, _container) = setup_test_db().await;
    let bus = PgQueueBus::new(pool);

    for n in 1..=3 {
        bus.publish(Queue::Requests, payload(n), PRIORITY_INITIAL)
            .await
            .unwrap();
    }

    for n in 1..=3 {
        let d = bus.claim(Queue::Requests, "w").await.unwrap().unwrap();
        assert_eq!(d.payload, payload(n));
        bus.ack(Queue::Requests, d.tag).await.unwrap();
    }
}

#[tokio::test]
async fn ack_removes_the_message() {
    let (pool, _container) = setup_test_db().await;
    let bus = PgQueueBus::new(pool);

    bus.publish(Queue::Results, payload(1), PRIORITY_INITIAL)
        .await
        .unwrap();
    let d = bus.claim(Queue::Results, "c").await.unwrap().unwrap();
    bus.ack(Queue::Results, d.tag).await.unwrap();

    assert_eq!(bus.depth(Queue::Results).await.unwrap(), 0);
}

#[tokio::test]
async fn reject_drops_without_requeue() {
    let (pool, _container) = setup_test_db().await;
    let bus = PgQueueBus::new(pool);

    bus.publish(Queue::Failures, payload(1), PRIORITY_INITIAL)
        .await
        .unwrap();
    let d = bus.claim(Queue::Failures, "c").await.unwrap().unwrap();
    bus.reject(Queue::Failures, d.tag).await.unwrap();

    assert!(bus.claim(Queue::Failures, "c").await.unwrap().is_none());
    assert_eq!(bus.depth(Queue::Failures).await.unwrap(), 0);
}

#[tokio::test]
async fn expired_messages_are_skipped_and_purged() {
    let (pool, _container) = setup_test_db().await;
    let bus = PgQueueBus::new(pool.clone());

    bus.publish(Queue::Requests, payload(1), PRIORITY_INITIAL)
        .await
        .unwrap();
    // Force the TTL into the past.
    sqlx::query("UPDATE queue_messages SET expires_at = NOW() - INTERVAL '1 minute'")
        .execute(&pool)
        .await
        .unwrap();

    assert!(
        bus.claim(Queue::Requests, "w").await.unwrap().is_none(),
        "expired messages are dropped silently"
    );
    assert_eq!(bus.purge_expired().await.unwrap(), 1);
}

#[tokio::test]
async fn stale_claim_is_redelivered() {
    let (pool, _container) = setup_test_db().await;
    let bus = PgQueueBus::new(pool.clone());

    bus.publish(Queue::Requests, payload(1), PRIORITY_INITIAL)
        .await
        .unwrap();
    let first = bus.claim(Queue::Requests, "w1").await.unwrap();
    assert!(first.is_some());

    // Simulate a consumer that died mid-claim.
    sqlx::query("UPDATE queue_messages SET claimed_at = NOW() - INTERVAL '20 minutes'")
        .execute(&pool)
        .await
        .unwrap();

    let redelivered = bus.claim(Queue::Requests, "w2").await.unwrap();
    assert!(redelivered.is_some(), "at-least-once redelivery");
}
