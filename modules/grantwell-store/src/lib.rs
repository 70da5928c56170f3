//! Persistence layer for harvested grants and session history.
//!
//! Everything above this crate talks to the [`GrantStore`] trait. The
//! Postgres implementation backs production; the in-memory one backs tests
//! and local runs without a database.

pub mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grantwell_common::{GrantRecord, ScrapingSession, SessionStatus};

pub use error::{Result, StoreError};
pub use memory::MemoryGrantStore;
pub use postgres::PgGrantStore;

/// Filter for counting grants. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct GrantFilter {
    pub scraped_after: Option<DateTime<Utc>>,
    pub scraped_before: Option<DateTime<Utc>>,
    pub active_only: bool,
}

impl GrantFilter {
    /// Grants scraped at or after `since`.
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            scraped_after: Some(since),
            ..Self::default()
        }
    }
}

/// Filter for counting sessions. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub started_after: Option<DateTime<Utc>>,
    pub status: Option<SessionStatus>,
}

/// Terminal fields written exactly once when a session ends.
#[derive(Debug, Clone)]
pub struct SessionTerminal {
    pub status: SessionStatus,
    pub end_time: DateTime<Utc>,
    pub grants_scraped: i64,
    pub categories: Vec<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Insert or refresh a grant. Returns `true` only when the grant was
    /// not previously known, so callers can count genuinely new records.
    async fn upsert_grant(&self, record: &GrantRecord) -> Result<bool>;

    /// Record a session the moment it starts, before any scraping happens.
    async fn record_session_start(&self, session: &ScrapingSession) -> Result<()>;

    /// Finalize a session. Fails if the session was never started.
    async fn record_session_end(&self, session_id: &str, terminal: SessionTerminal) -> Result<()>;

    async fn count_grants(&self, filter: GrantFilter) -> Result<i64>;

    async fn count_sessions(&self, filter: SessionFilter) -> Result<i64>;

    /// Full-text search over active grants, most relevant first.
    async fn search_grants(&self, query: &str, limit: i64) -> Result<Vec<GrantRecord>>;

    /// Most recently started sessions, newest first.
    async fn recent_sessions(&self, limit: i64) -> Result<Vec<ScrapingSession>>;
}
