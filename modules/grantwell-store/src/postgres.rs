//! Postgres-backed [`GrantStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grantwell_common::{GrantRecord, ScrapingSession, SessionStatus};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::{GrantFilter, GrantStore, SessionFilter, SessionTerminal};

#[derive(Clone)]
pub struct PgGrantStore {
    pool: PgPool,
}

impl PgGrantStore {
    /// Connect to Postgres and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Connected to grant store");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct GrantRow {
    grant_id: String,
    title: String,
    funder: String,
    description: String,
    deadline: String,
    amount: String,
    url: String,
    source: String,
    scraped_at: DateTime<Utc>,
    is_active: bool,
}

impl From<GrantRow> for GrantRecord {
    fn from(row: GrantRow) -> Self {
        GrantRecord {
            grant_id: row.grant_id,
            title: row.title,
            funder: row.funder,
            description: row.description,
            deadline: row.deadline,
            amount: row.amount,
            url: row.url,
            source: row.source,
            scraped_at: row.scraped_at,
            is_active: row.is_active,
        }
    }
}

#[derive(FromRow)]
struct SessionRow {
    session_id: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    grants_scraped: i64,
    categories: Vec<String>,
    error: Option<String>,
}

impl TryFrom<SessionRow> for ScrapingSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self> {
        let status = row
            .status
            .parse::<SessionStatus>()
            .map_err(|_| StoreError::Decode(format!("unknown session status '{}'", row.status)))?;

        Ok(ScrapingSession {
            session_id: row.session_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status,
            grants_scraped: row.grants_scraped,
            categories: row.categories,
            error: row.error,
        })
    }
}

#[async_trait]
impl GrantStore for PgGrantStore {
    async fn upsert_grant(&self, record: &GrantRecord) -> Result<bool> {
        // xmax = 0 only holds for freshly inserted rows, which is how we
        // tell a new grant from a refresh of one we already had.
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO grants
                (grant_id, title, funder, description, deadline, amount,
                 url, source, scraped_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (grant_id) DO UPDATE SET
                title = EXCLUDED.title,
                funder = EXCLUDED.funder,
                description = EXCLUDED.description,
                deadline = EXCLUDED.deadline,
                amount = EXCLUDED.amount,
                url = EXCLUDED.url,
                source = EXCLUDED.source,
                scraped_at = EXCLUDED.scraped_at,
                is_active = EXCLUDED.is_active
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&record.grant_id)
        .bind(&record.title)
        .bind(&record.funder)
        .bind(&record.description)
        .bind(&record.deadline)
        .bind(&record.amount)
        .bind(&record.url)
        .bind(&record.source)
        .bind(record.scraped_at)
        .bind(record.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn record_session_start(&self, session: &ScrapingSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scraping_sessions
                (session_id, start_time, end_time, status, grants_scraped, categories, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.status.to_string())
        .bind(session.grants_scraped)
        .bind(&session.categories)
        .bind(&session.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_session_end(&self, session_id: &str, terminal: SessionTerminal) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scraping_sessions SET
                end_time = $2,
                status = $3,
                grants_scraped = $4,
                categories = $5,
                error = $6
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(terminal.end_time)
        .bind(terminal.status.to_string())
        .bind(terminal.grants_scraped)
        .bind(&terminal.categories)
        .bind(&terminal.error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }

        Ok(())
    }

    async fn count_grants(&self, filter: GrantFilter) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM grants
            WHERE ($1::timestamptz IS NULL OR scraped_at >= $1)
              AND ($2::timestamptz IS NULL OR scraped_at < $2)
              AND (NOT $3 OR is_active)
            "#,
        )
        .bind(filter.scraped_after)
        .bind(filter.scraped_before)
        .bind(filter.active_only)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_sessions(&self, filter: SessionFilter) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM scraping_sessions
            WHERE ($1::timestamptz IS NULL OR start_time >= $1)
              AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(filter.started_after)
        .bind(filter.status.map(|s| s.to_string()))
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn search_grants(&self, query: &str, limit: i64) -> Result<Vec<GrantRecord>> {
        let rows: Vec<GrantRow> = sqlx::query_as(
            r#"
            SELECT grant_id, title, funder, description, deadline, amount,
                   url, source, scraped_at, is_active
            FROM grants
            WHERE is_active
              AND to_tsvector('english', title || ' ' || description)
                  @@ plainto_tsquery('english', $1)
            ORDER BY ts_rank(
                to_tsvector('english', title || ' ' || description),
                plainto_tsquery('english', $1)
            ) DESC
            LIMIT $2
            "#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(GrantRecord::from).collect())
    }

    async fn recent_sessions(&self, limit: i64) -> Result<Vec<ScrapingSession>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, start_time, end_time, status,
                   grants_scraped, categories, error
            FROM scraping_sessions
            ORDER BY start_time DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ScrapingSession::try_from).collect()
    }
}
