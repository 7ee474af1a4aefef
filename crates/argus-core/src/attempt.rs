//! One scrape attempt, from request to published outcome.
//!
//! The worker is stateless against the record store: it announces the
//! attempt, drives the page engine, classifies what happened, and reports
//! on the result/failure queues. Whether to retry is the control plane's
//! call. The inbound request is acked only after the outbound publish
//! succeeded; a publish failure propagates, the request is rejected without
//! requeue, and the stale-pending sweep eventually fails the record.

use std::time::Instant;

use chrono::Utc;

use crate::bus::{publish_message, MessageHandler, QueueBus};
use crate::classify;
use crate::engine::{PageEngine, PageFetch};
use crate::error::AppError;
use crate::messages::{
    Queue, ScrapeFailure, ScrapeRequest, ScrapeResult, ScrapeStarted, PRIORITY_EVENT,
};
use crate::normalize;
use crate::record::compute_hash;

/// Executes scrape attempts against a shared page engine.
#[derive(Clone)]
pub struct ScrapeWorker<E, B> {
    engine: E,
    bus: B,
    user_agent: String,
}

impl<E, B> ScrapeWorker<E, B>
where
    E: PageEngine,
    B: QueueBus,
{
    pub fn new(engine: E, bus: B, user_agent: impl Into<String>) -> Self {
        Self {
            engine,
            bus,
            user_agent: user_agent.into(),
        }
    }

    /// Run one attempt for a dequeued request.
    pub async fn handle_request(&self, request: &ScrapeRequest) -> Result<(), AppError> {
        tracing::info!(
            id = %request.id,
            url = %request.url,
            attempt = request.retry_count,
            "Attempt started"
        );

        let started = ScrapeStarted {
            id: request.id,
            url: request.url.clone(),
            started_at: Utc::now(),
            user_agent: self.user_agent.clone(),
        };
        publish_message(&self.bus, Queue::Started, &started, PRIORITY_EVENT).await?;

        let begun = Instant::now();
        let outcome = self.engine.fetch(&request.url).await;
        let elapsed_ms = begun.elapsed().as_millis() as i64;

        match outcome {
            Ok(page) => match page.http_status {
                None => {
                    self.publish_failure(
                        request,
                        AppError::NoResponse.to_string(),
                        true,
                        None,
                        elapsed_ms,
                    )
                    .await
                }
                Some(status) if status >= 400 => {
                    let verdict = classify::classify_status(status);
                    let message = match page.status_text.as_deref() {
                        Some(text) if !text.is_empty() => {
                            format!("{}: {}", verdict.reason, text)
                        }
                        _ => verdict.reason.clone(),
                    };
                    self.publish_failure(request, message, verdict.retryable, verdict.status, elapsed_ms)
                        .await
                }
                Some(status) => self.publish_result(request, page, status, elapsed_ms).await,
            },
            Err(e) => {
                let message = e.to_string();
                let verdict = classify::classify_error(&message, None);
                self.publish_failure(
                    request,
                    verdict.reason,
                    verdict.retryable,
                    verdict.status,
                    elapsed_ms,
                )
                .await
            }
        }
    }

    async fn publish_result(
        &self,
        request: &ScrapeRequest,
        page: PageFetch,
        status: u16,
        elapsed_ms: i64,
    ) -> Result<(), AppError> {
        let content_hash = compute_hash(&page.content);
        let content_length = page.content.len() as i64;

        // Redirect hops are stored canonical, like every URL; consecutive
        // hops that canonicalize identically collapse to one.
        let mut redirect_chain: Vec<String> = page
            .redirect_chain
            .iter()
            .map(|u| normalize::canonical(u))
            .collect();
        redirect_chain.dedup();

        let result = ScrapeResult {
            id: request.id,
            url: request.url.clone(),
            success: true,
            content: Some(page.content),
            content_type: Some(
                page.content_type
                    .unwrap_or_else(|| "text/html".to_string()),
            ),
            http_status: Some(status),
            error_message: None,
            final_url: Some(page.final_url),
            redirect_chain,
            content_hash: Some(content_hash),
            content_length: Some(content_length),
            response_time_ms: elapsed_ms,
            user_agent: self.user_agent.clone(),
            fetched_at: Utc::now(),
        };
        publish_message(&self.bus, Queue::Results, &result, PRIORITY_EVENT).await?;

        tracing::info!(
            id = %request.id,
            url = %request.url,
            status,
            bytes = content_length,
            elapsed_ms,
            "Attempt succeeded"
        );
        Ok(())
    }

    async fn publish_failure(
        &self,
        request: &ScrapeRequest,
        message: String,
        retryable: bool,
        http_status: Option<u16>,
        elapsed_ms: i64,
    ) -> Result<(), AppError> {
        let failure = ScrapeFailure {
            id: request.id,
            url: request.url.clone(),
            error_message: message.clone(),
            retryable,
            http_status,
            retry_count: request.retry_count,
            response_time_ms: Some(elapsed_ms),
            user_agent: Some(self.user_agent.clone()),
        };
        publish_message(&self.bus, Queue::Failures, &failure, PRIORITY_EVENT).await?;

        tracing::warn!(
            id = %request.id,
            url = %request.url,
            error = %message,
            retryable,
            "Attempt failed"
        );
        Ok(())
    }
}

/// `scrape.requests` consumer: one attempt per delivery.
#[derive(Clone)]
pub struct RequestHandler<E, B>(pub ScrapeWorker<E, B>);

impl<E: PageEngine, B: QueueBus> MessageHandler for RequestHandler<E, B> {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), AppError> {
        let request: ScrapeRequest = serde_json::from_value(payload)?;
        self.0.handle_request(&request).await
    }
}
