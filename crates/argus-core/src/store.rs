use std::future::Future;

use chrono::TimeDelta;
use uuid::Uuid;

use crate::error::AppError;
use crate::record::{FetchRecord, FetchStatus, NewFetchRecord, RecordUpdate};

/// Filter for listing records.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub status: Option<FetchStatus>,
    pub url: Option<String>,
}

/// Persistent store of fetch records.
///
/// Records are created by submission in PENDING state and mutated only by
/// the control plane's result consumers; workers never touch the store.
/// URL lookups match against the full variant set (raw, canonical,
/// bare-host, scheme-prefixed) to tolerate legacy un-normalized rows.
pub trait FetchStore: Send + Sync + Clone {
    /// Create a record with server-generated id and timestamps.
    fn create(
        &self,
        record: NewFetchRecord,
    ) -> impl Future<Output = Result<FetchRecord, AppError>> + Send;

    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<FetchRecord>, AppError>> + Send;

    /// Most recent record whose stored URL matches any variant of `url`.
    fn find_by_url(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Option<FetchRecord>, AppError>> + Send;

    /// Most recently fetched SUCCESS record for `url`.
    fn find_latest_success_by_url(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Option<FetchRecord>, AppError>> + Send;

    /// All records matching `filter`, newest first.
    fn find_all(
        &self,
        filter: RecordFilter,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<Vec<FetchRecord>, AppError>> + Send;

    /// Partial update. Fields set to `Patch::Clear` are nulled; `Keep`
    /// fields are untouched. Errors with [`AppError::NotFound`] when the id
    /// does not exist.
    fn update(
        &self,
        id: Uuid,
        update: RecordUpdate,
    ) -> impl Future<Output = Result<FetchRecord, AppError>> + Send;

    /// Dedup probe: a record matching `url` within `window` either as a
    /// fresh SUCCESS (direct or via redirect chain) or as a still-active
    /// PENDING/PROCESSING row.
    fn get_recent_by_url(
        &self,
        url: &str,
        window: TimeDelta,
    ) -> impl Future<Output = Result<Option<FetchRecord>, AppError>> + Send;

    /// PENDING records older than `timeout` — requests whose worker never
    /// reported back.
    fn find_stale_pending(
        &self,
        timeout: TimeDelta,
    ) -> impl Future<Output = Result<Vec<FetchRecord>, AppError>> + Send;

    /// All records for a URL, most recently fetched first.
    fn get_history(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Vec<FetchRecord>, AppError>> + Send;

    /// Clear fields that violate the status invariants (SUCCESS rows with an
    /// error message, FAILED rows with content), preserving the status.
    /// Returns the number of repaired records.
    fn repair_inconsistencies(&self) -> impl Future<Output = Result<u64, AppError>> + Send;
}
