//! Batch submission with redirect-aware deduplication.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::bus::{publish_message, QueueBus};
use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::messages::{Queue, ScrapeRequest, PRIORITY_INITIAL};
use crate::normalize;
use crate::record::{FetchRecord, FetchStatus, NewFetchRecord};
use crate::store::FetchStore;

/// One skipped URL with the reason it was not queued.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedUrl {
    pub url: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_available_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
}

/// Outcome of a batch submission.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmitOutcome {
    /// Raw URLs accepted for scraping, in submission order.
    pub submitted: Vec<String>,
    pub skipped: Vec<SkippedUrl>,
    /// Ids of the newly created records, parallel to `submitted`.
    pub queued: Vec<Uuid>,
}

enum Decision {
    Queued(Uuid),
    Skipped(SkippedUrl),
}

/// Accepts URL batches, deduplicates them against recent scrapes, and
/// queues the remainder.
#[derive(Clone)]
pub struct SubmitService<S, B> {
    store: S,
    bus: B,
    config: PipelineConfig,
}

impl<S, B> SubmitService<S, B>
where
    S: FetchStore,
    B: QueueBus,
{
    pub fn new(store: S, bus: B, config: PipelineConfig) -> Self {
        Self { store, bus, config }
    }

    /// Submit a batch. Per-URL failures land in `skipped` with the error as
    /// the reason; one bad URL never fails the batch.
    pub async fn submit(&self, urls: &[String]) -> SubmitOutcome {
        let mut outcome = SubmitOutcome::default();
        for raw in urls {
            match self.submit_one(raw).await {
                Ok(Decision::Queued(id)) => {
                    outcome.submitted.push(raw.clone());
                    outcome.queued.push(id);
                }
                Ok(Decision::Skipped(skipped)) => outcome.skipped.push(skipped),
                Err(e) => {
                    tracing::warn!(url = %raw, error = %e, "Submission failed for URL");
                    outcome.skipped.push(SkippedUrl {
                        url: raw.clone(),
                        reason: format!("Processing error: {e}"),
                        next_available_at: None,
                        record_id: None,
                    });
                }
            }
        }
        tracing::info!(
            submitted = outcome.submitted.len(),
            skipped = outcome.skipped.len(),
            "Batch processed"
        );
        outcome
    }

    async fn submit_one(&self, raw: &str) -> Result<Decision, AppError> {
        let canonical = normalize::canonical(raw);

        if let Some(recent) = self
            .store
            .get_recent_by_url(raw, self.config.dedup_window())
            .await?
        {
            return Ok(Decision::Skipped(self.skip_for(raw, &recent)));
        }

        let record = self
            .store
            .create(NewFetchRecord::pending(canonical.clone()))
            .await?;

        let request = ScrapeRequest {
            id: record.id,
            url: canonical,
            retry_count: 0,
            priority: PRIORITY_INITIAL,
        };
        publish_message(&self.bus, Queue::Requests, &request, PRIORITY_INITIAL).await?;

        tracing::debug!(id = %record.id, url = %record.url, "Queued scrape request");
        Ok(Decision::Queued(record.id))
    }

    fn skip_for(&self, raw: &str, recent: &FetchRecord) -> SkippedUrl {
        let window = self.config.dedup_window();
        let (reason, next_available_at) = match recent.status {
            FetchStatus::Success if recent.fetched_at.is_some() => {
                let reason = if normalize::equivalent(&recent.url, raw) {
                    format!(
                        "Successfully scraped within {} minutes",
                        self.config.scrape_interval_minutes
                    )
                } else {
                    "Already scraped via redirect".to_string()
                };
                (reason, recent.fetched_at.map(|t| t + window))
            }
            status if status.is_active() => {
                (format!("Already queued (status={status})"), None)
            }
            status => (
                format!("Recent request exists with status: {status}"),
                None,
            ),
        };
        SkippedUrl {
            url: raw.to_string(),
            reason,
            next_available_at,
            record_id: Some(recent.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::testutil::{MemoryBus, MemoryStore};

    fn service(store: MemoryStore, bus: MemoryBus) -> SubmitService<MemoryStore, MemoryBus> {
        SubmitService::new(store, bus, PipelineConfig::default())
    }

    #[tokio::test]
    async fn fresh_url_is_queued_with_canonical_form() {
        let store = MemoryStore::new();
        let bus = MemoryBus::new();
        let svc = service(store.clone(), bus.clone());

        let out = svc.submit(&["  WWW.Example.com/Page  ".to_string()]).await;

        assert_eq!(out.submitted.len(), 1);
        assert_eq!(out.queued.len(), 1);
        assert!(out.skipped.is_empty());

        let record = store.find_by_id(out.queued[0]).await.unwrap().unwrap();
        assert_eq!(record.url, "https://example.com/Page");
        assert_eq!(record.status, FetchStatus::Pending);
        assert_eq!(record.retry_count, 0);

        let published = bus.published(Queue::Requests);
        assert_eq!(published.len(), 1);
        let req: ScrapeRequest = serde_json::from_value(published[0].clone()).unwrap();
        assert_eq!(req.url, "https://example.com/Page");
        assert_eq!(req.retry_count, 0);
        assert_eq!(req.priority, PRIORITY_INITIAL);
    }

    #[tokio::test]
    async fn recent_success_is_skipped_with_next_available_at() {
        let store = MemoryStore::new();
        let bus = MemoryBus::new();
        let svc = service(store.clone(), bus.clone());

        let first = svc.submit(&["https://a.test".to_string()]).await;
        let id = first.queued[0];
        let fetched_at = Utc::now() - TimeDelta::minutes(30);
        store.mark_success(id, "<html>OK</html>", fetched_at).await;

        let out = svc.submit(&["https://a.test".to_string()]).await;
        assert!(out.submitted.is_empty());
        assert_eq!(out.skipped.len(), 1);
        let skip = &out.skipped[0];
        assert_eq!(skip.reason, "Successfully scraped within 60 minutes");
        assert_eq!(skip.next_available_at, Some(fetched_at + TimeDelta::minutes(60)));
        assert_eq!(skip.record_id, Some(id));
    }

    #[tokio::test]
    async fn active_record_is_skipped_as_already_queued() {
        let store = MemoryStore::new();
        let bus = MemoryBus::new();
        let svc = service(store.clone(), bus.clone());

        svc.submit(&["https://a.test".to_string()]).await;
        let out = svc.submit(&["https://a.test".to_string()]).await;

        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].reason, "Already queued (status=pending)");
        assert!(out.skipped[0].next_available_at.is_none());
        // No second request was published.
        assert_eq!(bus.published(Queue::Requests).len(), 1);
    }

    #[tokio::test]
    async fn redirect_match_is_skipped_via_redirect_reason() {
        let store = MemoryStore::new();
        let bus = MemoryBus::new();
        let svc = service(store.clone(), bus.clone());

        // First submission lands under the bare host; the scrape followed a
        // redirect onto the mobile host.
        let first = svc.submit(&["ynet.co.il".to_string()]).await;
        let id = first.queued[0];
        store
            .mark_success_with_redirects(
                id,
                "<html>OK</html>",
                Utc::now(),
                "https://m.ynet.co.il",
                vec!["https://ynet.co.il".into(), "https://m.ynet.co.il".into()],
            )
            .await;

        let out = svc.submit(&["m.ynet.co.il".to_string()]).await;
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].reason, "Already scraped via redirect");
    }

    #[tokio::test]
    async fn equivalence_classes_dedup_against_same_record() {
        let store = MemoryStore::new();
        let bus = MemoryBus::new();
        let svc = service(store.clone(), bus.clone());

        let first = svc.submit(&["ynet.co.il".to_string()]).await;
        store
            .mark_success(first.queued[0], "<html>OK</html>", Utc::now())
            .await;

        // Same host in a different surface form matches directly.
        let out = svc.submit(&["https://www.ynet.co.il/".to_string()]).await;
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].reason, "Successfully scraped within 60 minutes");
    }

    #[tokio::test]
    async fn mixed_batch_processes_every_item() {
        let store = MemoryStore::new();
        let bus = MemoryBus::new();
        let svc = service(store.clone(), bus.clone());

        let first = svc.submit(&["https://seen.test".to_string()]).await;
        store
            .mark_success(first.queued[0], "<html></html>", Utc::now())
            .await;

        let out = svc
            .submit(&[
                "https://seen.test".to_string(),
                "https://new.test".to_string(),
            ])
            .await;

        assert_eq!(out.submitted, vec!["https://new.test".to_string()]);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.queued.len(), 1);
    }

    #[tokio::test]
    async fn store_failure_is_reported_per_item() {
        let store = MemoryStore::new();
        store.fail_next_create("connection lost");
        let bus = MemoryBus::new();
        let svc = service(store, bus);

        let out = svc.submit(&["https://a.test".to_string()]).await;
        assert_eq!(out.skipped.len(), 1);
        assert!(
            out.skipped[0]
                .reason
                .starts_with("Processing error: Database error"),
            "reason: {}",
            out.skipped[0].reason
        );
    }
}
