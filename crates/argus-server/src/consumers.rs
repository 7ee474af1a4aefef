//! Wires the three result streams to the record state machine.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use argus_core::bus::run_consumer;
use argus_core::consumers::{FailureHandler, ResultConsumer, ResultHandler, StartedHandler};
use argus_core::messages::Queue;
use argus_db::Database;

/// Idle poll interval for the control-plane consumers.
pub const CONSUMER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Spawn the started/results/failures consumers. Each holds at most one
/// unacknowledged delivery at a time and shuts down on cancellation.
pub fn spawn_result_consumers(
    db: &Database,
    max_retries: u32,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let consumer = ResultConsumer::new(db.fetch_repo(), db.queue_bus(), max_retries);

    vec![
        tokio::spawn(run_consumer(
            db.queue_bus(),
            Queue::Started,
            "api-started".to_string(),
            CONSUMER_POLL_INTERVAL,
            cancel.clone(),
            StartedHandler(consumer.clone()),
        )),
        tokio::spawn(run_consumer(
            db.queue_bus(),
            Queue::Results,
            "api-results".to_string(),
            CONSUMER_POLL_INTERVAL,
            cancel.clone(),
            ResultHandler(consumer.clone()),
        )),
        tokio::spawn(run_consumer(
            db.queue_bus(),
            Queue::Failures,
            "api-failures".to_string(),
            CONSUMER_POLL_INTERVAL,
            cancel,
            FailureHandler(consumer),
        )),
    ]
}
