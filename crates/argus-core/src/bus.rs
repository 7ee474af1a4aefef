//! Durable queue abstraction and the shared consumer loop.
//!
//! The bus contract: at-least-once delivery with manual acknowledgement,
//! publish durable before return, per-message TTL with silent expiry, and
//! reject-without-requeue on handler failure (poison messages are dropped;
//! the stale-pending sweep mops up the orphaned record). Each consumer loop
//! holds at most one unacknowledged delivery, which is the only load
//! balancing mechanism across worker replicas.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::messages::Queue;

/// One claimed message. `tag` identifies the delivery for ack/reject.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: i64,
    pub payload: serde_json::Value,
}

/// Durable queue bus over the four pipeline queues.
pub trait QueueBus: Send + Sync + Clone {
    /// Durably enqueue a message. Returns only after the message is
    /// accepted; higher priority is delivered first.
    fn publish(
        &self,
        queue: Queue,
        payload: serde_json::Value,
        priority: i16,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Claim the next available message, or `None` when the queue is empty.
    /// A claimed message is invisible to other consumers until acked,
    /// rejected, or its claim expires (redelivery).
    fn claim(
        &self,
        queue: Queue,
        consumer: &str,
    ) -> impl Future<Output = Result<Option<Delivery>, AppError>> + Send;

    /// Acknowledge a delivery, removing the message permanently.
    fn ack(&self, queue: Queue, tag: i64) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Reject a delivery WITHOUT requeue. The message is dropped.
    fn reject(&self, queue: Queue, tag: i64) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Serialize a message and publish it.
pub async fn publish_message<B: QueueBus, T: Serialize>(
    bus: &B,
    queue: Queue,
    message: &T,
    priority: i16,
) -> Result<(), AppError> {
    let payload = serde_json::to_value(message)?;
    bus.publish(queue, payload, priority).await
}

/// Handles one queue's message payloads.
pub trait MessageHandler: Send + Sync {
    fn handle(
        &self,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Claim-handle-ack loop over one queue until cancellation.
///
/// Handler success acks the delivery; handler failure rejects it without
/// requeue. The in-flight delivery is always settled before the loop exits,
/// so cancellation never strands a claim until the redelivery timeout.
pub async fn run_consumer<B, H>(
    bus: B,
    queue: Queue,
    consumer_tag: String,
    poll_interval: Duration,
    cancel: CancellationToken,
    handler: H,
) where
    B: QueueBus,
    H: MessageHandler,
{
    tracing::info!(queue = %queue, consumer = %consumer_tag, "Consumer started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match bus.claim(queue, &consumer_tag).await {
            Ok(Some(delivery)) => {
                let tag = delivery.tag;
                match handler.handle(delivery.payload).await {
                    Ok(()) => {
                        if let Err(e) = bus.ack(queue, tag).await {
                            tracing::error!(queue = %queue, tag, error = %e, "Ack failed");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            queue = %queue,
                            tag,
                            error = %e,
                            "Handler failed, rejecting without requeue"
                        );
                        if let Err(e) = bus.reject(queue, tag).await {
                            tracing::error!(queue = %queue, tag, error = %e, "Reject failed");
                        }
                    }
                }
            }
            Ok(None) => {
                tokio::select! {
                    () = tokio::time::sleep(poll_interval) => {}
                    () = cancel.cancelled() => break,
                }
            }
            Err(e) => {
                tracing::error!(queue = %queue, error = %e, "Failed to claim message");
                tokio::select! {
                    () = tokio::time::sleep(poll_interval * 2) => {}
                    () = cancel.cancelled() => break,
                }
            }
        }
    }

    tracing::info!(queue = %queue, consumer = %consumer_tag, "Consumer stopped");
}
