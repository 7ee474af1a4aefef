//! Queue envelopes — one shape per queue.
//!
//! Consumers must be idempotent: the bus is at-least-once and a message may
//! be redelivered after a claim expires.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four durable queues of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    /// Control plane → workers: fetch this URL.
    Requests,
    /// Worker → control plane: an attempt began.
    Started,
    /// Worker → control plane: an attempt finished with a page outcome.
    Results,
    /// Worker → control plane: an attempt failed with a classified error.
    Failures,
}

impl Queue {
    pub const ALL: [Queue; 4] = [Queue::Requests, Queue::Started, Queue::Results, Queue::Failures];

    pub fn name(&self) -> &'static str {
        match self {
            Queue::Requests => "scrape.requests",
            Queue::Started => "scrape.started",
            Queue::Results => "scrape.results",
            Queue::Failures => "scrape.failures",
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Priority for first-time requests.
pub const PRIORITY_INITIAL: i16 = 1;
/// Priority for retry requests — retries jump the queue.
pub const PRIORITY_RETRY: i16 = 2;
/// Priority for worker-emitted events.
pub const PRIORITY_EVENT: i16 = 1;

/// Messages expire after this long; expired messages are dropped silently so
/// an extended outage cannot build an unbounded backlog.
pub const MESSAGE_TTL_MINUTES: i64 = 60;

/// One unit of work for a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub id: Uuid,
    /// Canonical URL.
    pub url: String,
    /// Attempts already consumed when this request was published.
    pub retry_count: u32,
    pub priority: i16,
}

/// Emitted as the first step of every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeStarted {
    pub id: Uuid,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub user_agent: String,
}

/// Emitted when the attempt produced a page outcome (success or an HTTP
/// error page the classifier rejected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub id: Uuid,
    pub url: String,
    pub success: bool,
    pub content: Option<String>,
    pub content_type: Option<String>,
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
    pub final_url: Option<String>,
    pub redirect_chain: Vec<String>,
    pub content_hash: Option<String>,
    pub content_length: Option<i64>,
    pub response_time_ms: i64,
    pub user_agent: String,
    pub fetched_at: DateTime<Utc>,
}

/// Emitted when the attempt failed. The retry decision is NOT made here —
/// the worker only reports the classification; the control plane owns the
/// authoritative retry count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeFailure {
    pub id: Uuid,
    pub url: String,
    pub error_message: String,
    pub retryable: bool,
    pub http_status: Option<u16>,
    /// Echo of the request's retry count.
    pub retry_count: u32,
    pub response_time_ms: Option<i64>,
    pub user_agent: Option<String>,
}
