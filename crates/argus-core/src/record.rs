use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Status of a fetch record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Pending,
    Processing,
    Success,
    Failed,
    /// Reserved for operator-driven archival. Never set by the pipeline.
    Archived,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Pending => "pending",
            FetchStatus::Processing => "processing",
            FetchStatus::Success => "success",
            FetchStatus::Failed => "failed",
            FetchStatus::Archived => "archived",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FetchStatus::Success | FetchStatus::Failed | FetchStatus::Archived
        )
    }

    /// Pending or Processing — counts against the one-active-record rule.
    pub fn is_active(&self) -> bool {
        matches!(self, FetchStatus::Pending | FetchStatus::Processing)
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FetchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(FetchStatus::Pending),
            "processing" => Ok(FetchStatus::Processing),
            "success" => Ok(FetchStatus::Success),
            "failed" => Ok(FetchStatus::Failed),
            "archived" => Ok(FetchStatus::Archived),
            _ => Err(format!("Unknown fetch status: {s}")),
        }
    }
}

/// One row per submission-attempt-chain; retries reuse the same record.
///
/// Field presence tracks the status invariants: SUCCESS rows carry content
/// and a hash and no error; FAILED rows carry an error and no content;
/// PENDING rows may carry a retry breadcrumb in `error_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRecord {
    pub id: Uuid,
    /// Canonical URL (see `normalize`).
    pub url: String,
    pub status: FetchStatus,
    pub content: Option<String>,
    pub content_type: Option<String>,
    /// Last observed HTTP status, or a synthetic code from the classifier.
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
    /// URL after following redirects.
    pub final_url: Option<String>,
    /// Canonical URLs the browser followed to reach `final_url`, excluding
    /// `final_url` itself.
    pub redirect_chain: Vec<String>,
    /// SHA-256 of the content, 64-char hex.
    pub content_hash: Option<String>,
    pub content_length: Option<i64>,
    pub response_time_ms: Option<i64>,
    pub user_agent: Option<String>,
    /// Attempts already consumed.
    pub retry_count: u32,
    pub fetched_at: Option<DateTime<Utc>>,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied at record creation; everything else starts absent.
#[derive(Debug, Clone)]
pub struct NewFetchRecord {
    pub url: String,
    pub status: FetchStatus,
    pub retry_count: u32,
}

impl NewFetchRecord {
    pub fn pending(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: FetchStatus::Pending,
            retry_count: 0,
        }
    }
}

/// Three-state field patch for partial updates.
///
/// The store writes only `Set`/`Clear` fields, so concurrent updaters cannot
/// clobber fields they did not intend to touch. `Clear` is the single
/// "absent" sentinel — the repository boundary never distinguishes a null
/// written on purpose from a field never set.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// Apply this patch to an optional slot in place.
    pub fn apply(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(v) => *slot = Some(v),
        }
    }

    /// Map the set value, preserving `Keep`/`Clear`.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Keep => Patch::Keep,
            Patch::Clear => Patch::Clear,
            Patch::Set(v) => Patch::Set(f(v)),
        }
    }
}

/// Partial update of a [`FetchRecord`]. Defaults keep every field.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub status: Option<FetchStatus>,
    pub retry_count: Option<u32>,
    pub content: Patch<String>,
    pub content_type: Patch<String>,
    pub http_status: Patch<u16>,
    pub error_message: Patch<String>,
    pub final_url: Patch<String>,
    pub redirect_chain: Option<Vec<String>>,
    pub content_hash: Patch<String>,
    pub content_length: Patch<i64>,
    pub response_time_ms: Patch<i64>,
    pub user_agent: Patch<String>,
    pub fetched_at: Patch<DateTime<Utc>>,
    pub last_scraped_at: Patch<DateTime<Utc>>,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
