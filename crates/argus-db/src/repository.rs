use argus_core::error::AppError;
use argus_core::normalize;
use argus_core::record::{FetchRecord, FetchStatus, NewFetchRecord, Patch, RecordUpdate};
use argus_core::store::{FetchStore, RecordFilter};
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{PgPool, Pool, Postgres, QueryBuilder};
use uuid::Uuid;

/// PostgreSQL-backed fetch record store.
///
/// URL lookups match the full variant set so rows written before
/// normalization was enforced keep matching; new rows always store the
/// canonical URL. The redirect-chain clause rides the GIN index on the
/// JSONB column.
#[derive(Clone)]
pub struct FetchRepository {
    pool: Pool<Postgres>,
}

impl FetchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct FetchRecordRow {
    id: Uuid,
    url: String,
    status: String,
    content: Option<String>,
    content_type: Option<String>,
    http_status: Option<i32>,
    error_message: Option<String>,
    final_url: Option<String>,
    redirect_chain: serde_json::Value,
    content_hash: Option<String>,
    content_length: Option<i64>,
    response_time_ms: Option<i64>,
    user_agent: Option<String>,
    retry_count: i32,
    fetched_at: Option<DateTime<Utc>>,
    last_scraped_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FetchRecordRow> for FetchRecord {
    fn from(row: FetchRecordRow) -> Self {
        FetchRecord {
            id: row.id,
            url: row.url,
            status: row.status.parse().unwrap_or(FetchStatus::Pending),
            content: row.content,
            content_type: row.content_type,
            http_status: row.http_status.map(|s| s as u16),
            error_message: row.error_message,
            final_url: row.final_url,
            redirect_chain: serde_json::from_value(row.redirect_chain).unwrap_or_default(),
            content_hash: row.content_hash,
            content_length: row.content_length,
            response_time_ms: row.response_time_ms,
            user_agent: row.user_agent,
            retry_count: row.retry_count.max(0) as u32,
            fetched_at: row.fetched_at,
            last_scraped_at: row.last_scraped_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Append `, <column> = <value|NULL>` for a patched field.
macro_rules! push_patch {
    ($qb:expr, $col:literal, $patch:expr) => {
        match $patch {
            Patch::Keep => {}
            Patch::Clear => {
                $qb.push(concat!(", ", $col, " = NULL"));
            }
            Patch::Set(value) => {
                $qb.push(concat!(", ", $col, " = "));
                $qb.push_bind(value);
            }
        }
    };
}

impl FetchStore for FetchRepository {
    async fn create(&self, record: NewFetchRecord) -> Result<FetchRecord, AppError> {
        let row = sqlx::query_as::<_, FetchRecordRow>(
            r#"
            INSERT INTO fetch_records (url, status, retry_count)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&record.url)
        .bind(record.status.as_str())
        .bind(record.retry_count as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FetchRecord>, AppError> {
        let row = sqlx::query_as::<_, FetchRecordRow>(r#"SELECT * FROM fetch_records WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<FetchRecord>, AppError> {
        let variants = normalize::variants(url);
        let row = sqlx::query_as::<_, FetchRecordRow>(
            r#"
            SELECT * FROM fetch_records
            WHERE url = ANY($1)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(&variants)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn find_latest_success_by_url(&self, url: &str) -> Result<Option<FetchRecord>, AppError> {
        let variants = normalize::variants(url);
        let row = sqlx::query_as::<_, FetchRecordRow>(
            r#"
            SELECT * FROM fetch_records
            WHERE url = ANY($1) AND status = 'success'
            ORDER BY fetched_at DESC NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(&variants)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn find_all(
        &self,
        filter: RecordFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FetchRecord>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM fetch_records WHERE TRUE");
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(url) = filter.url {
            qb.push(" AND url = ");
            qb.push_bind(url);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ");
        qb.push_bind(limit.max(0));
        qb.push(" OFFSET ");
        qb.push_bind(offset.max(0));

        let rows = qb
            .build_query_as::<FetchRecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update(&self, id: Uuid, update: RecordUpdate) -> Result<FetchRecord, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE fetch_records SET updated_at = NOW()");

        if let Some(status) = update.status {
            qb.push(", status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(retry_count) = update.retry_count {
            qb.push(", retry_count = ");
            qb.push_bind(retry_count as i32);
        }
        if let Some(chain) = update.redirect_chain {
            qb.push(", redirect_chain = ");
            qb.push_bind(serde_json::to_value(chain)?);
        }
        push_patch!(qb, "content", update.content);
        push_patch!(qb, "content_type", update.content_type);
        push_patch!(qb, "http_status", update.http_status.map(|s| s as i32));
        push_patch!(qb, "error_message", update.error_message);
        push_patch!(qb, "final_url", update.final_url);
        push_patch!(qb, "content_hash", update.content_hash);
        push_patch!(qb, "content_length", update.content_length);
        push_patch!(qb, "response_time_ms", update.response_time_ms);
        push_patch!(qb, "user_agent", update.user_agent);
        push_patch!(qb, "fetched_at", update.fetched_at);
        push_patch!(qb, "last_scraped_at", update.last_scraped_at);

        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING *");

        let row = qb
            .build_query_as::<FetchRecordRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Into::into).ok_or(AppError::NotFound(id))
    }

    async fn get_recent_by_url(
        &self,
        url: &str,
        window: TimeDelta,
    ) -> Result<Option<FetchRecord>, AppError> {
        let variants = normalize::variants(url);
        let cutoff = Utc::now() - window;
        let row = sqlx::query_as::<_, FetchRecordRow>(
            r#"
            SELECT * FROM fetch_records
            WHERE (url = ANY($1) AND status = 'success' AND fetched_at >= $2)
               OR (url = ANY($1) AND status IN ('pending', 'processing') AND created_at >= $2)
               OR (redirect_chain ?| $1 AND status = 'success' AND fetched_at >= $2)
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(&variants)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn find_stale_pending(&self, timeout: TimeDelta) -> Result<Vec<FetchRecord>, AppError> {
        let cutoff = Utc::now() - timeout;
        let rows = sqlx::query_as::<_, FetchRecordRow>(
            r#"
            SELECT * FROM fetch_records
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_history(&self, url: &str) -> Result<Vec<FetchRecord>, AppError> {
        let variants = normalize::variants(url);
        let rows = sqlx::query_as::<_, FetchRecordRow>(
            r#"
            SELECT * FROM fetch_records
            WHERE url = ANY($1)
            ORDER BY fetched_at DESC NULLS LAST, created_at DESC
            "#,
        )
        .bind(&variants)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn repair_inconsistencies(&self) -> Result<u64, AppError> {
        let success_fixed = sqlx::query(
            r#"
            UPDATE fetch_records
            SET error_message = NULL, updated_at = NOW()
            WHERE status = 'success' AND error_message IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .rows_affected();

        let failed_fixed = sqlx::query(
            r#"
            UPDATE fetch_records
            SET content = NULL, content_type = NULL, content_hash = NULL, updated_at = NOW()
            WHERE status = 'failed'
              AND (content IS NOT NULL OR content_type IS NOT NULL OR content_hash IS NOT NULL)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .rows_affected();

        Ok(success_fixed + failed_fixed)
    }
}
