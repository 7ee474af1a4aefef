//! Operator maintenance: stale-pending sweep and invariant repair.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::record::{FetchStatus, Patch, RecordUpdate};
use crate::store::FetchStore;

/// Terminal message for requests whose worker never reported back.
pub const STALE_MESSAGE: &str = "Request timed out - no response from scraper";

/// Store-level maintenance operations.
#[derive(Clone)]
pub struct Maintenance<S> {
    store: S,
}

impl<S: FetchStore> Maintenance<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Fail PENDING records older than `timeout`. These are requests whose
    /// queue message was dropped (poison reject, TTL expiry) — nothing will
    /// ever report for them. Returns the number of records swept.
    pub async fn sweep_stale_pending(&self, timeout: TimeDelta) -> Result<u64, AppError> {
        let stale = self.store.find_stale_pending(timeout).await?;
        let mut swept = 0u64;
        for record in stale {
            let now = Utc::now();
            let update = RecordUpdate {
                status: Some(FetchStatus::Failed),
                error_message: Patch::Set(STALE_MESSAGE.to_string()),
                content: Patch::Clear,
                content_type: Patch::Clear,
                content_hash: Patch::Clear,
                fetched_at: Patch::Set(now),
                last_scraped_at: Patch::Set(now),
                ..Default::default()
            };
            match self.store.update(record.id, update).await {
                Ok(_) => {
                    tracing::warn!(id = %record.id, url = %record.url, "Swept stale request");
                    swept += 1;
                }
                Err(AppError::NotFound(_)) => {}
                Err(e) => {
                    tracing::error!(id = %record.id, error = %e, "Failed to sweep record");
                }
            }
        }
        Ok(swept)
    }

    /// Clear fields that violate the status invariants, keeping the
    /// authoritative status. Returns the number of repaired records.
    pub async fn repair_inconsistencies(&self) -> Result<u64, AppError> {
        let fixed = self.store.repair_inconsistencies().await?;
        if fixed > 0 {
            tracing::info!(fixed, "Repaired inconsistent records");
        }
        Ok(fixed)
    }
}

/// Periodic sweep loop until cancellation.
pub async fn run_sweeper<S: FetchStore>(
    maintenance: Maintenance<S>,
    timeout: TimeDelta,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(timeout_minutes = timeout.num_minutes(), "Stale sweeper started");
    loop {
        tokio::select! {
            () = tokio::time::sleep(every) => {}
            () = cancel.cancelled() => break,
        }
        match maintenance.sweep_stale_pending(timeout).await {
            Ok(0) => {}
            Ok(swept) => tracing::info!(swept, "Stale sweep complete"),
            Err(e) => tracing::error!(error = %e, "Stale sweep failed"),
        }
    }
    tracing::info!("Stale sweeper stopped");
}
