//! Test utilities: in-memory implementations of the core traits.
//!
//! Handwritten fakes for dependency injection in unit tests. All of them
//! use `Arc<Mutex<_>>` interior mutability so tests can assert on recorded
//! state through clones.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::bus::{Delivery, QueueBus};
use crate::engine::{PageEngine, PageFetch};
use crate::error::AppError;
use crate::messages::Queue;
use crate::normalize;
use crate::record::{FetchRecord, FetchStatus, NewFetchRecord, RecordUpdate};
use crate::store::{FetchStore, RecordFilter};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory [`FetchStore`] with full query semantics, including the URL
/// variant matching and the redirect-chain dedup clause.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<FetchRecord>>>,
    create_error: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create` call fail with a database error.
    pub fn fail_next_create(&self, message: &str) {
        *self.create_error.lock().unwrap() = Some(message.to_string());
    }

    /// Test helper: flip a record to SUCCESS with content at `fetched_at`.
    pub async fn mark_success(&self, id: Uuid, content: &str, fetched_at: DateTime<Utc>) {
        let mut records = self.records.lock().unwrap();
        let record = records.iter_mut().find(|r| r.id == id).expect("record");
        record.status = FetchStatus::Success;
        record.content = Some(content.to_string());
        record.content_type = Some("text/html".into());
        record.content_hash = Some(crate::record::compute_hash(content));
        record.http_status = Some(200);
        record.error_message = None;
        record.fetched_at = Some(fetched_at);
        record.updated_at = Utc::now();
    }

    /// Like [`Self::mark_success`] but with a redirect outcome.
    pub async fn mark_success_with_redirects(
        &self,
        id: Uuid,
        content: &str,
        fetched_at: DateTime<Utc>,
        final_url: &str,
        redirect_chain: Vec<String>,
    ) {
        self.mark_success(id, content, fetched_at).await;
        let mut records = self.records.lock().unwrap();
        let record = records.iter_mut().find(|r| r.id == id).expect("record");
        record.final_url = Some(final_url.to_string());
        record.redirect_chain = redirect_chain;
    }

    /// Test helper: move `created_at` into the past.
    pub async fn backdate_created(&self, id: Uuid, by: TimeDelta) {
        let mut records = self.records.lock().unwrap();
        let record = records.iter_mut().find(|r| r.id == id).expect("record");
        record.created_at -= by;
    }

    /// Test helper: produce an invariant violation (SUCCESS with an error).
    pub async fn corrupt_success_with_error(&self, id: Uuid) {
        let mut records = self.records.lock().unwrap();
        let record = records.iter_mut().find(|r| r.id == id).expect("record");
        record.status = FetchStatus::Success;
        record.content = Some("<html></html>".into());
        record.content_hash = Some(crate::record::compute_hash("<html></html>"));
        record.fetched_at = Some(Utc::now());
        record.error_message = Some("leftover".into());
    }

    fn matches_url(record_url: &str, variants: &[String]) -> bool {
        variants.iter().any(|v| v == record_url)
    }
}

impl FetchStore for MemoryStore {
    async fn create(&self, record: NewFetchRecord) -> Result<FetchRecord, AppError> {
        if let Some(message) = self.create_error.lock().unwrap().take() {
            return Err(AppError::Database(message));
        }
        let now = Utc::now();
        let record = FetchRecord {
            id: Uuid::new_v4(),
            url: record.url,
            status: record.status,
            content: None,
            content_type: None,
            http_status: None,
            error_message: None,
            final_url: None,
            redirect_chain: Vec::new(),
            content_hash: None,
            content_length: None,
            response_time_ms: None,
            user_agent: None,
            retry_count: record.retry_count,
            fetched_at: None,
            last_scraped_at: None,
            created_at: now,
            updated_at: now,
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FetchRecord>, AppError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<FetchRecord>, AppError> {
        let variants = normalize::variants(url);
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| Self::matches_url(&r.url, &variants))
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn find_latest_success_by_url(&self, url: &str) -> Result<Option<FetchRecord>, AppError> {
        let variants = normalize::variants(url);
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| r.status == FetchStatus::Success && Self::matches_url(&r.url, &variants))
            .max_by_key(|r| r.fetched_at)
            .cloned())
    }

    async fn find_all(
        &self,
        filter: RecordFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FetchRecord>, AppError> {
        let mut records: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.url.as_deref().is_none_or(|u| r.url == u))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update(&self, id: Uuid, update: RecordUpdate) -> Result<FetchRecord, AppError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(AppError::NotFound(id))?;

        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(retry_count) = update.retry_count {
            record.retry_count = retry_count;
        }
        if let Some(chain) = update.redirect_chain {
            record.redirect_chain = chain;
        }
        update.content.apply(&mut record.content);
        update.content_type.apply(&mut record.content_type);
        update.http_status.apply(&mut record.http_status);
        update.error_message.apply(&mut record.error_message);
        update.final_url.apply(&mut record.final_url);
        update.content_hash.apply(&mut record.content_hash);
        update.content_length.apply(&mut record.content_length);
        update.response_time_ms.apply(&mut record.response_time_ms);
        update.user_agent.apply(&mut record.user_agent);
        update.fetched_at.apply(&mut record.fetched_at);
        update.last_scraped_at.apply(&mut record.last_scraped_at);
        record.updated_at = Utc::now();

        Ok(record.clone())
    }

    async fn get_recent_by_url(
        &self,
        url: &str,
        window: TimeDelta,
    ) -> Result<Option<FetchRecord>, AppError> {
        let variants = normalize::variants(url);
        let cutoff = Utc::now() - window;
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| {
                let direct = Self::matches_url(&r.url, &variants);
                let fresh_success =
                    r.status == FetchStatus::Success && r.fetched_at.is_some_and(|t| t >= cutoff);
                let fresh_active = r.status.is_active() && r.created_at >= cutoff;
                let via_redirect = fresh_success
                    && r.redirect_chain
                        .iter()
                        .any(|hop| variants.iter().any(|v| v == hop));
                (direct && (fresh_success || fresh_active)) || via_redirect
            })
            .max_by_key(|r| r.updated_at)
            .cloned())
    }

    async fn find_stale_pending(&self, timeout: TimeDelta) -> Result<Vec<FetchRecord>, AppError> {
        let cutoff = Utc::now() - timeout;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == FetchStatus::Pending && r.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn get_history(&self, url: &str) -> Result<Vec<FetchRecord>, AppError> {
        let variants = normalize::variants(url);
        let mut records: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| Self::matches_url(&r.url, &variants))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        Ok(records)
    }

    async fn repair_inconsistencies(&self) -> Result<u64, AppError> {
        let mut fixed = 0u64;
        let mut records = self.records.lock().unwrap();
        for record in records.iter_mut() {
            match record.status {
                FetchStatus::Success if record.error_message.is_some() => {
                    record.error_message = None;
                    record.updated_at = Utc::now();
                    fixed += 1;
                }
                FetchStatus::Failed
                    if record.content.is_some()
                        || record.content_type.is_some()
                        || record.content_hash.is_some() =>
                {
                    record.content = None;
                    record.content_type = None;
                    record.content_hash = None;
                    record.updated_at = Utc::now();
                    fixed += 1;
                }
                _ => {}
            }
        }
        Ok(fixed)
    }
}

// ---------------------------------------------------------------------------
// MemoryBus
// ---------------------------------------------------------------------------

struct QueuedMessage {
    tag: i64,
    payload: serde_json::Value,
    priority: i16,
    claimed: bool,
}

#[derive(Default)]
struct BusInner {
    next_tag: i64,
    queues: HashMap<&'static str, Vec<QueuedMessage>>,
    published: HashMap<&'static str, Vec<serde_json::Value>>,
    publish_error: Option<String>,
}

/// In-memory [`QueueBus`] with priority ordering and a publish log.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<BusInner>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything ever published to `queue`, in publish order.
    pub fn published(&self, queue: Queue) -> Vec<serde_json::Value> {
        self.inner
            .lock()
            .unwrap()
            .published
            .get(queue.name())
            .cloned()
            .unwrap_or_default()
    }

    /// Messages currently sitting in `queue` (claimed or not).
    pub fn depth(&self, queue: Queue) -> usize {
        self.inner
            .lock()
            .unwrap()
            .queues
            .get(queue.name())
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Make the next `publish` call fail.
    pub fn fail_next_publish(&self, message: &str) {
        self.inner.lock().unwrap().publish_error = Some(message.to_string());
    }

    /// Claim-and-ack the next message, for tests that pump queues by hand.
    pub async fn pop(&self, queue: Queue) -> Option<serde_json::Value> {
        let delivery = self.claim(queue, "test-pump").await.ok()??;
        self.ack(queue, delivery.tag).await.ok()?;
        Some(delivery.payload)
    }
}

impl QueueBus for MemoryBus {
    async fn publish(
        &self,
        queue: Queue,
        payload: serde_json::Value,
        priority: i16,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = inner.publish_error.take() {
            return Err(AppError::Queue(message));
        }
        inner.next_tag += 1;
        let tag = inner.next_tag;
        inner.queues.entry(queue.name()).or_default().push(QueuedMessage {
            tag,
            payload: payload.clone(),
            priority,
            claimed: false,
        });
        inner.published.entry(queue.name()).or_default().push(payload);
        Ok(())
    }

    async fn claim(&self, queue: Queue, _consumer: &str) -> Result<Option<Delivery>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(messages) = inner.queues.get_mut(queue.name()) else {
            return Ok(None);
        };
        // Highest priority first, then FIFO.
        let next = messages
            .iter_mut()
            .filter(|m| !m.claimed)
            .max_by_key(|m| (m.priority, -m.tag));
        Ok(next.map(|m| {
            m.claimed = true;
            Delivery {
                tag: m.tag,
                payload: m.payload.clone(),
            }
        }))
    }

    async fn ack(&self, queue: Queue, tag: i64) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(messages) = inner.queues.get_mut(queue.name()) {
            messages.retain(|m| m.tag != tag);
        }
        Ok(())
    }

    async fn reject(&self, queue: Queue, tag: i64) -> Result<(), AppError> {
        // No requeue: rejection drops the message.
        self.ack(queue, tag).await
    }
}

// ---------------------------------------------------------------------------
// MockEngine
// ---------------------------------------------------------------------------

/// Mock page engine with a queue of scripted outcomes.
#[derive(Clone)]
pub struct MockEngine {
    responses: Arc<Mutex<Vec<Result<PageFetch, AppError>>>>,
}

impl MockEngine {
    pub fn with_page(page: PageFetch) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![Ok(page)])),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![Err(error)])),
        }
    }

    pub fn with_outcomes(outcomes: Vec<Result<PageFetch, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(outcomes)),
        }
    }

    /// A plain 200 page.
    pub fn ok_page(content: &str, final_url: &str) -> PageFetch {
        PageFetch {
            http_status: Some(200),
            status_text: Some("OK".into()),
            content: content.to_string(),
            content_type: Some("text/html".into()),
            final_url: final_url.to_string(),
            redirect_chain: Vec::new(),
        }
    }
}

impl PageEngine for MockEngine {
    async fn fetch(&self, _url: &str) -> Result<PageFetch, AppError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Self::ok_page("<html><body>default</body></html>", "https://default.test"))
        } else {
            responses.remove(0)
        }
    }
}
