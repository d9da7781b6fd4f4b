//! Postgres-backed request store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` (duplicate `video_key`) |
//! | Database (other) | any other | `Storage` |
//! | RowNotFound on update | N/A | `NotFound` |
//! | PoolClosed / IO / other | N/A | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use frameshot_core::RequestId;
use frameshot_requests::{NewRequest, Request, RequestStatus};

use super::{RequestStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_requests.sql");

const COLUMNS: &str =
    "id, user_id, user_email, video_size, video_key, zip_output_key, status, created_at, finished_at";

/// Request store over a `requests` table (see `migrations/0001_requests.sql`).
///
/// `video_key` carries a UNIQUE constraint, which is what turns a duplicate
/// derived key into a conflict.
#[derive(Debug, Clone)]
pub struct PostgresRequestStore {
    pool: Arc<PgPool>,
}

impl PostgresRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the table and index if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch_one_by(
        &self,
        operation: &str,
        column: &str,
        bind: QueryKey<'_>,
    ) -> Result<Option<Request>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM requests WHERE {column} = $1");
        let query = sqlx::query(&sql);
        let query = match bind {
            QueryKey::Id(id) => query.bind(id),
            QueryKey::Text(text) => query.bind(text),
        };

        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        row.map(|r| RequestRow::from_pg_row(&r).and_then(Request::try_from))
            .transpose()
    }
}

enum QueryKey<'a> {
    Id(i64),
    Text(&'a str),
}

fn to_db_id(id: RequestId) -> Result<i64, StoreError> {
    i64::try_from(id.get())
        .map_err(|_| StoreError::Storage(format!("request id out of range: {id}")))
}

#[async_trait]
impl RequestStore for PostgresRequestStore {
    #[instrument(skip(self, request), fields(video_key = %request.video_key), err)]
    async fn create(&self, request: NewRequest) -> Result<Request, StoreError> {
        let sql = format!(
            "INSERT INTO requests (user_id, user_email, video_size, video_key, zip_output_key, status, created_at) \
             VALUES ($1, $2, $3, $4, NULL, $5, $6) RETURNING {COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(&request.user_id)
            .bind(&request.user_email)
            .bind(request.video_size)
            .bind(&request.video_key)
            .bind(RequestStatus::Pending.as_str())
            .bind(request.created_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("create", e))?;

        RequestRow::from_pg_row(&row).and_then(Request::try_from)
    }

    async fn get_by_id(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        self.fetch_one_by("get_by_id", "id", QueryKey::Id(to_db_id(id)?))
            .await
    }

    async fn get_by_video_key(&self, video_key: &str) -> Result<Option<Request>, StoreError> {
        self.fetch_one_by("get_by_video_key", "video_key", QueryKey::Text(video_key))
            .await
    }

    #[instrument(skip(self, request), fields(request_id = %request.id, status = %request.status), err)]
    async fn update(&self, request: &Request) -> Result<Request, StoreError> {
        request
            .check_invariants()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let sql = format!(
            "UPDATE requests SET user_email = $2, zip_output_key = $3, status = $4, finished_at = $5 \
             WHERE id = $1 RETURNING {COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(to_db_id(request.id)?)
            .bind(&request.user_email)
            .bind(request.zip_output_key.as_deref())
            .bind(request.status.as_str())
            .bind(request.finished_at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update", e))?
            .ok_or(StoreError::NotFound(request.id))?;

        RequestRow::from_pg_row(&row).and_then(Request::try_from)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Request>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM requests WHERE user_id = $1 ORDER BY created_at ASC, id ASC"
        );

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter()
            .map(|r| RequestRow::from_pg_row(r).and_then(Request::try_from))
            .collect()
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Storage(msg),
            }
        }
        other => StoreError::Storage(format!("{operation}: {other}")),
    }
}

/// Raw `requests` row.
#[derive(Debug)]
struct RequestRow {
    id: i64,
    user_id: String,
    user_email: String,
    video_size: i64,
    video_key: String,
    zip_output_key: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RequestRow {
    fn from_pg_row(row: &sqlx::postgres::PgRow) -> Result<Self, StoreError> {
        let read = |e: sqlx::Error| StoreError::Storage(format!("failed to read request row: {e}"));
        Ok(Self {
            id: row.try_get("id").map_err(read)?,
            user_id: row.try_get("user_id").map_err(read)?,
            user_email: row.try_get("user_email").map_err(read)?,
            video_size: row.try_get("video_size").map_err(read)?,
            video_key: row.try_get("video_key").map_err(read)?,
            zip_output_key: row.try_get("zip_output_key").map_err(read)?,
            status: row.try_get("status").map_err(read)?,
            created_at: row.try_get("created_at").map_err(read)?,
            finished_at: row.try_get("finished_at").map_err(read)?,
        })
    }
}

impl TryFrom<RequestRow> for Request {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let id = u64::try_from(row.id)
            .map_err(|_| StoreError::Storage(format!("negative request id: {}", row.id)))?;
        let status = row
            .status
            .parse::<RequestStatus>()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(Request {
            id: RequestId::new(id),
            user_id: row.user_id,
            user_email: row.user_email,
            video_size: row.video_size,
            video_key: row.video_key,
            zip_output_key: row.zip_output_key,
            status,
            created_at: row.created_at,
            finished_at: row.finished_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> RequestRow {
        RequestRow {
            id: 5,
            user_id: "u1".into(),
            user_email: "u1@x.io".into(),
            video_size: 100,
            video_key: "videos_input/u1_2024-01-01-00-00-00.mp4".into(),
            zip_output_key: None,
            status: status.into(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    #[test]
    fn row_maps_to_domain_request() {
        let request = Request::try_from(row("IN_PROGRESS")).unwrap();
        assert_eq!(request.id, RequestId::new(5));
        assert_eq!(request.status, RequestStatus::InProgress);
    }

    #[test]
    fn unknown_status_text_is_a_storage_error() {
        assert!(matches!(
            Request::try_from(row("DONE")),
            Err(StoreError::Storage(_))
        ));
    }

    #[test]
    fn negative_ids_are_rejected() {
        let mut bad = row("PENDING");
        bad.id = -1;
        assert!(Request::try_from(bad).is_err());
    }

    #[test]
    fn ids_beyond_bigint_are_rejected() {
        assert!(to_db_id(RequestId::new(u64::MAX)).is_err());
        assert_eq!(to_db_id(RequestId::new(7)).unwrap(), 7);
    }

    #[test]
    fn schema_declares_unique_video_key() {
        assert!(SCHEMA.contains("video_key      TEXT        NOT NULL UNIQUE"));
    }
}
