use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};
use zipline_core::store::Result;
use zipline_core::{ClickEvent, Code, NewShortUrl, ShortUrl, StoreError, UrlMetadata, UrlPage, UrlStore};

/// PostgreSQL implementation of the store contract.
///
/// Soft delete is a monotone `is_deleted` flag. Reads only return
/// non-deleted rows; expiry is observed read-only (the reaper performs
/// the writeback). Codes are never reused, including codes of
/// soft-deleted rows, so click history keeps a single-row-per-code
/// model. Timestamps are stored as unix seconds.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await.map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the tables and indexes this store relies on, if absent.
    ///
    /// The unique index on `code` backs the cross-process collision
    /// guarantee; the partial index on `expire_at` keeps the reaper's
    /// scan bounded; `click_events` and `click_stats` cascade when a
    /// row is physically removed by an operator.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS short_urls (
                id BIGSERIAL PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                long_url TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                expire_at BIGINT,
                is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                custom_alias BOOLEAN NOT NULL DEFAULT FALSE,
                created_by TEXT,
                metadata TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_short_urls_expire_at ON short_urls (expire_at)
                WHERE expire_at IS NOT NULL",
            "CREATE INDEX IF NOT EXISTS idx_short_urls_is_deleted ON short_urls (is_deleted)",
            "CREATE TABLE IF NOT EXISTS click_events (
                id BIGSERIAL PRIMARY KEY,
                code TEXT NOT NULL REFERENCES short_urls (code) ON DELETE CASCADE,
                ts BIGINT NOT NULL,
                user_agent TEXT,
                ip_address TEXT,
                referer TEXT,
                country TEXT,
                device_type TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_click_events_code_ts ON click_events (code, ts)",
            "CREATE TABLE IF NOT EXISTS click_stats (
                code TEXT PRIMARY KEY REFERENCES short_urls (code) ON DELETE CASCADE,
                total_clicks BIGINT NOT NULL DEFAULT 0,
                first_access_at BIGINT,
                last_access_at BIGINT
            )",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }

        debug!("store schema ensured");
        Ok(())
    }
}

fn now_unix_seconds() -> i64 {
    Timestamp::now().as_second()
}

fn parse_timestamp(seconds: i64) -> Result<Timestamp> {
    Timestamp::from_second(seconds)
        .map_err(|e| StoreError::InvalidData(format!("invalid timestamp '{seconds}': {e}")))
}

fn parse_optional_timestamp(seconds: Option<i64>) -> Result<Option<Timestamp>> {
    seconds.map(parse_timestamp).transpose()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StoreError::InvalidData(message),
        _ => StoreError::Query(message),
    }
}

fn short_url_from_row(row: &PgRow) -> Result<ShortUrl> {
    let code: String = row.try_get("code").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let expire_at: Option<i64> = row.try_get("expire_at").map_err(map_sqlx_error)?;

    Ok(ShortUrl {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        code: Code::new_unchecked(code),
        long_url: row.try_get("long_url").map_err(map_sqlx_error)?,
        created_at: parse_timestamp(created_at)?,
        expire_at: parse_optional_timestamp(expire_at)?,
        is_deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
        custom_alias: row.try_get("custom_alias").map_err(map_sqlx_error)?,
        created_by: row.try_get("created_by").map_err(map_sqlx_error)?,
        metadata: row.try_get("metadata").map_err(map_sqlx_error)?,
    })
}

fn metadata_from_row(row: &PgRow) -> Result<UrlMetadata> {
    let code: String = row.try_get("code").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let expire_at: Option<i64> = row.try_get("expire_at").map_err(map_sqlx_error)?;
    let first_access_at: Option<i64> = row.try_get("first_access_at").map_err(map_sqlx_error)?;
    let last_access_at: Option<i64> = row.try_get("last_access_at").map_err(map_sqlx_error)?;

    Ok(UrlMetadata {
        code: Code::new_unchecked(code),
        long_url: row.try_get("long_url").map_err(map_sqlx_error)?,
        created_at: parse_timestamp(created_at)?,
        expire_at: parse_optional_timestamp(expire_at)?,
        total_clicks: row.try_get("total_clicks").map_err(map_sqlx_error)?,
        first_access_at: parse_optional_timestamp(first_access_at)?,
        last_access_at: parse_optional_timestamp(last_access_at)?,
    })
}

#[async_trait]
impl UrlStore for PostgresStore {
    async fn create(&self, new: NewShortUrl) -> Result<ShortUrl> {
        let created_at = now_unix_seconds();

        let result = sqlx::query(
            r#"
            INSERT INTO short_urls
                (code, long_url, created_at, expire_at, custom_alias, created_by, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(new.code.as_str())
        .bind(&new.long_url)
        .bind(created_at)
        .bind(new.expire_at.map(|ts| ts.as_second()))
        .bind(new.custom_alias)
        .bind(&new.created_by)
        .bind(&new.metadata)
        .fetch_one(&self.pool)
        .await;

        let row = match result {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::Conflict(new.code.to_string()));
            }
            Err(err) => return Err(map_sqlx_error(err)),
        };

        Ok(ShortUrl {
            id: row.try_get("id").map_err(map_sqlx_error)?,
            code: new.code,
            long_url: new.long_url,
            created_at: parse_timestamp(created_at)?,
            expire_at: new.expire_at,
            is_deleted: false,
            custom_alias: new.custom_alias,
            created_by: new.created_by,
            metadata: new.metadata,
        })
    }

    async fn get_by_code(&self, code: &Code) -> Result<ShortUrl> {
        let row = sqlx::query(
            r#"
            SELECT id, code, long_url, created_at, expire_at, is_deleted,
                   custom_alias, created_by, metadata
            FROM short_urls
            WHERE code = $1
              AND is_deleted = FALSE
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };

        let record = short_url_from_row(&row)?;

        // Expiry is observed read-only; the reaper flips is_deleted later.
        if let Some(expire_at) = record.expire_at {
            if now_unix_seconds() >= expire_at.as_second() {
                return Err(StoreError::Expired);
            }
        }

        Ok(record)
    }

    async fn get_metadata(&self, code: &Code) -> Result<UrlMetadata> {
        let row = sqlx::query(
            r#"
            SELECT s.code, s.long_url, s.created_at, s.expire_at,
                   COALESCE(cs.total_clicks, 0) AS total_clicks,
                   cs.first_access_at, cs.last_access_at
            FROM short_urls s
            LEFT JOIN click_stats cs ON s.code = cs.code
            WHERE s.code = $1
              AND s.is_deleted = FALSE
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };

        let metadata = metadata_from_row(&row)?;

        if let Some(expire_at) = metadata.expire_at {
            if now_unix_seconds() >= expire_at.as_second() {
                return Err(StoreError::Expired);
            }
        }

        Ok(metadata)
    }

    async fn exists(&self, code: &Code) -> Result<bool> {
        let exists = sqlx::query(
            r#"
            SELECT 1
            FROM short_urls
            WHERE code = $1
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .is_some();

        Ok(exists)
    }

    async fn soft_delete(&self, code: &Code) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE short_urls
            SET is_deleted = TRUE
            WHERE code = $1
              AND is_deleted = FALSE
            "#,
        )
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn record_click(&self, code: &Code, event: ClickEvent) -> Result<()> {
        let now = now_unix_seconds();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Non-live codes reject new events.
        let row = sqlx::query(
            r#"
            SELECT expire_at
            FROM short_urls
            WHERE code = $1
              AND is_deleted = FALSE
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };
        let expire_at: Option<i64> = row.try_get("expire_at").map_err(map_sqlx_error)?;
        if expire_at.is_some_and(|expire_at| now >= expire_at) {
            return Err(StoreError::Expired);
        }

        sqlx::query(
            r#"
            INSERT INTO click_events
                (code, ts, user_agent, ip_address, referer, country, device_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(code.as_str())
        .bind(now)
        .bind(&event.user_agent)
        .bind(&event.ip_address)
        .bind(&event.referer)
        .bind(&event.country)
        .bind(&event.device_type)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO click_stats (code, total_clicks, first_access_at, last_access_at)
            VALUES ($1, 1, $2, $2)
            ON CONFLICT (code) DO UPDATE
            SET total_clicks = click_stats.total_clicks + 1,
                last_access_at = EXCLUDED.last_access_at
            "#,
        )
        .bind(code.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn select_expired(&self, limit: i64) -> Result<Vec<Code>> {
        let rows = sqlx::query(
            r#"
            SELECT code
            FROM short_urls
            WHERE expire_at IS NOT NULL
              AND expire_at < $1
              AND is_deleted = FALSE
            ORDER BY code
            LIMIT $2
            "#,
        )
        .bind(now_unix_seconds())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let code: String = row.try_get("code").map_err(map_sqlx_error)?;
                Ok(Code::new_unchecked(code))
            })
            .collect()
    }

    async fn bulk_soft_delete(&self, codes: &[Code]) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }

        let codes: Vec<String> = codes.iter().map(|code| code.as_str().to_string()).collect();

        let result = sqlx::query(
            r#"
            UPDATE short_urls
            SET is_deleted = TRUE
            WHERE code = ANY($1)
            "#,
        )
        .bind(&codes)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() < codes.len() as u64 {
            warn!(
                requested = codes.len(),
                affected = result.rows_affected(),
                "bulk soft delete touched fewer rows than requested"
            );
        }

        Ok(())
    }

    async fn list_by_owner(&self, owner: &str, page: u32, page_size: u32) -> Result<UrlPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = i64::from(page - 1) * i64::from(page_size);

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM short_urls
            WHERE created_by = $1
              AND is_deleted = FALSE
            "#,
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .try_get("total")
        .map_err(map_sqlx_error)?;

        let rows = sqlx::query(
            r#"
            SELECT s.code, s.long_url, s.created_at, s.expire_at,
                   COALESCE(cs.total_clicks, 0) AS total_clicks,
                   cs.first_access_at, cs.last_access_at
            FROM short_urls s
            LEFT JOIN click_stats cs ON s.code = cs.code
            WHERE s.created_by = $1
              AND s.is_deleted = FALSE
            ORDER BY s.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls = rows
            .iter()
            .map(metadata_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(UrlPage {
            urls,
            page,
            page_size,
            total,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
