//! Control-plane result consumers.
//!
//! Three independent consumers advance the record state machine from the
//! started/result/failure streams. All three are idempotent: the bus may
//! redeliver, and the three streams have no ordering guarantee between
//! them. The retry decision lives here, not in the worker — the
//! authoritative retry count is the persisted one, and a worker-local
//! counter would split-brain against it.

use chrono::Utc;

use crate::bus::{publish_message, MessageHandler, QueueBus};
use crate::error::AppError;
use crate::messages::{
    Queue, ScrapeFailure, ScrapeRequest, ScrapeResult, ScrapeStarted, PRIORITY_RETRY,
};
use crate::record::{FetchStatus, Patch, RecordUpdate};
use crate::store::FetchStore;

/// Applies worker reports to fetch records.
#[derive(Clone)]
pub struct ResultConsumer<S, B> {
    store: S,
    bus: B,
    max_retries: u32,
}

impl<S, B> ResultConsumer<S, B>
where
    S: FetchStore,
    B: QueueBus,
{
    pub fn new(store: S, bus: B, max_retries: u32) -> Self {
        Self {
            store,
            bus,
            max_retries,
        }
    }

    /// An attempt began: move the record to PROCESSING and clear any retry
    /// breadcrumb. A started event for a record already in a terminal state
    /// is ignored — out-of-order delivery must not regress SUCCESS/FAILED.
    pub async fn handle_started(&self, msg: ScrapeStarted) -> Result<(), AppError> {
        match self.store.find_by_id(msg.id).await? {
            None => {
                tracing::warn!(id = %msg.id, "Started event for unknown record, ignoring");
                return Ok(());
            }
            Some(record) if record.status.is_terminal() => {
                tracing::debug!(
                    id = %msg.id,
                    status = %record.status,
                    "Late started event for terminal record, ignoring"
                );
                return Ok(());
            }
            Some(_) => {}
        }

        let update = RecordUpdate {
            status: Some(FetchStatus::Processing),
            user_agent: Patch::Set(msg.user_agent),
            error_message: Patch::Clear,
            ..Default::default()
        };
        self.apply(msg.id, update).await
    }

    /// An attempt finished with a page outcome.
    pub async fn handle_result(&self, msg: ScrapeResult) -> Result<(), AppError> {
        let mut update = RecordUpdate {
            fetched_at: Patch::Set(msg.fetched_at),
            last_scraped_at: Patch::Set(msg.fetched_at),
            final_url: patch_from(msg.final_url),
            response_time_ms: Patch::Set(msg.response_time_ms),
            content_length: patch_from(msg.content_length),
            user_agent: Patch::Set(msg.user_agent),
            redirect_chain: Some(msg.redirect_chain),
            http_status: patch_from(msg.http_status),
            ..Default::default()
        };

        if msg.success {
            update.status = Some(FetchStatus::Success);
            update.content = patch_from(msg.content);
            update.content_type =
                Patch::Set(msg.content_type.unwrap_or_else(|| "text/html".to_string()));
            update.content_hash = patch_from(msg.content_hash);
            update.error_message = Patch::Clear;
            tracing::info!(id = %msg.id, url = %msg.url, "Scrape succeeded");
        } else {
            update.status = Some(FetchStatus::Failed);
            update.error_message = Patch::Set(
                msg.error_message
                    .unwrap_or_else(|| "Scrape failed".to_string()),
            );
            update.content = Patch::Clear;
            update.content_type = Patch::Clear;
            update.content_hash = Patch::Clear;
            tracing::warn!(id = %msg.id, url = %msg.url, "Scrape reported failure");
        }

        self.apply(msg.id, update).await
    }

    /// An attempt failed. Retryable failures under the cap go back to
    /// PENDING with a breadcrumb and a fresh higher-priority request;
    /// everything else is terminal.
    pub async fn handle_failure(&self, msg: ScrapeFailure) -> Result<(), AppError> {
        if msg.retryable && msg.retry_count < self.max_retries {
            // Absolute count from the failed request keeps redelivery
            // idempotent — reprocessing the same failure sets the same value.
            let next_count = msg.retry_count + 1;
            let update = RecordUpdate {
                status: Some(FetchStatus::Pending),
                retry_count: Some(next_count),
                error_message: Patch::Set(format!(
                    "Retry {next_count}/{}: {}",
                    self.max_retries, msg.error_message
                )),
                http_status: patch_from(msg.http_status),
                content: Patch::Clear,
                content_type: Patch::Clear,
                content_hash: Patch::Clear,
                fetched_at: Patch::Clear,
                ..Default::default()
            };
            self.apply(msg.id, update).await?;

            let request = ScrapeRequest {
                id: msg.id,
                url: msg.url.clone(),
                retry_count: next_count,
                priority: PRIORITY_RETRY,
            };
            publish_message(&self.bus, Queue::Requests, &request, PRIORITY_RETRY).await?;
            tracing::info!(
                id = %msg.id,
                url = %msg.url,
                attempt = next_count,
                "Requeued retryable failure"
            );
        } else {
            let reason = if msg.retryable {
                format!("Maximum retries ({}) exceeded", self.max_retries)
            } else {
                "Error is not retryable".to_string()
            };
            let now = Utc::now();
            let update = RecordUpdate {
                status: Some(FetchStatus::Failed),
                error_message: Patch::Set(format!("{reason}: {}", msg.error_message)),
                http_status: patch_from(msg.http_status),
                content: Patch::Clear,
                content_type: Patch::Clear,
                content_hash: Patch::Clear,
                fetched_at: Patch::Set(now),
                last_scraped_at: Patch::Set(now),
                ..Default::default()
            };
            self.apply(msg.id, update).await?;
            tracing::warn!(
                id = %msg.id,
                url = %msg.url,
                retryable = msg.retryable,
                "Scrape failed terminally"
            );
        }
        Ok(())
    }

    /// Update, treating a missing record as already-handled (redelivery
    /// after deletion must not poison the queue).
    async fn apply(&self, id: uuid::Uuid, update: RecordUpdate) -> Result<(), AppError> {
        match self.store.update(id, update).await {
            Ok(_) => Ok(()),
            Err(AppError::NotFound(_)) => {
                tracing::warn!(id = %id, "Record vanished mid-update, ignoring");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn patch_from<T>(value: Option<T>) -> Patch<T> {
    match value {
        Some(v) => Patch::Set(v),
        None => Patch::Clear,
    }
}

// ---------------------------------------------------------------------------
// Queue adapters
// ---------------------------------------------------------------------------

/// `scrape.started` consumer.
#[derive(Clone)]
pub struct StartedHandler<S, B>(pub ResultConsumer<S, B>);

impl<S: FetchStore, B: QueueBus> MessageHandler for StartedHandler<S, B> {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), AppError> {
        let msg: ScrapeStarted = serde_json::from_value(payload)?;
        self.0.handle_started(msg).await
    }
}

/// `scrape.results` consumer.
#[derive(Clone)]
pub struct ResultHandler<S, B>(pub ResultConsumer<S, B>);

impl<S: FetchStore, B: QueueBus> MessageHandler for ResultHandler<S, B> {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), AppError> {
        let msg: ScrapeResult = serde_json::from_value(payload)?;
        self.0.handle_result(msg).await
    }
}

/// `scrape.failures` consumer.
#[derive(Clone)]
pub struct FailureHandler<S, B>(pub ResultConsumer<S, B>);

impl<S: FetchStore, B: QueueBus> MessageHandler for FailureHandler<S, B> {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), AppError> {
        let msg: ScrapeFailure = serde_json::from_value(payload)?;
        self.0.handle_failure(msg).await
    }
}
