//! In-memory [`GrantStore`] for tests and database-free local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use grantwell_common::{GrantRecord, ScrapingSession};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::{GrantFilter, GrantStore, SessionFilter, SessionTerminal};

#[derive(Default)]
pub struct MemoryGrantStore {
    grants: RwLock<HashMap<String, GrantRecord>>,
    sessions: RwLock<Vec<ScrapingSession>>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn upsert_grant(&self, record: &GrantRecord) -> Result<bool> {
        let mut grants = self.grants.write().await;
        let inserted = !grants.contains_key(&record.grant_id);
        grants.insert(record.grant_id.clone(), record.clone());
        Ok(inserted)
    }

    async fn record_session_start(&self, session: &ScrapingSession) -> Result<()> {
        self.sessions.write().await.push(session.clone());
        Ok(())
    }

    async fn record_session_end(&self, session_id: &str, terminal: SessionTerminal) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;

        session.end_time = Some(terminal.end_time);
        session.status = terminal.status;
        session.grants_scraped = terminal.grants_scraped;
        session.categories = terminal.categories;
        session.error = terminal.error;
        Ok(())
    }

    async fn count_grants(&self, filter: GrantFilter) -> Result<i64> {
        let grants = self.grants.read().await;
        let count = grants
            .values()
            .filter(|g| filter.scraped_after.map_or(true, |t| g.scraped_at >= t))
            .filter(|g| filter.scraped_before.map_or(true, |t| g.scraped_at < t))
            .filter(|g| !filter.active_only || g.is_active)
            .count();
        Ok(count as i64)
    }

    async fn count_sessions(&self, filter: SessionFilter) -> Result<i64> {
        let sessions = self.sessions.read().await;
        let count = sessions
            .iter()
            .filter(|s| filter.started_after.map_or(true, |t| s.start_time >= t))
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .count();
        Ok(count as i64)
    }

    async fn search_grants(&self, query: &str, limit: i64) -> Result<Vec<GrantRecord>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        let grants = self.grants.read().await;
        let mut hits: Vec<(usize, GrantRecord)> = grants
            .values()
            .filter(|g| g.is_active)
            .filter_map(|g| {
                let haystack = format!("{} {}", g.title, g.description).to_lowercase();
                let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                (score > 0).then(|| (score, g.clone()))
            })
            .collect();

        hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.title.cmp(&b.1.title)));
        Ok(hits
            .into_iter()
            .take(limit as usize)
            .map(|(_, g)| g)
            .collect())
    }

    async fn recent_sessions(&self, limit: i64) -> Result<Vec<ScrapingSession>> {
        let sessions = self.sessions.read().await;
        let mut recent: Vec<ScrapingSession> = sessions.clone();
        recent.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        recent.truncate(limit as usize);
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use grantwell_common::{fingerprint, SessionStatus};

    fn grant(title: &str, funder: &str) -> GrantRecord {
        GrantRecord {
            grant_id: fingerprint(title, funder),
            title: title.to_string(),
            funder: funder.to_string(),
            description: format!("{title} support for local organizations"),
            deadline: "Rolling".to_string(),
            amount: "Varies".to_string(),
            url: "https://example.org/grant".to_string(),
            source: "test".to_string(),
            scraped_at: Utc::now(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn upsert_reports_newness_once() {
        let store = MemoryGrantStore::new();
        let record = grant("Youth Arts Fund", "ACME Foundation");

        assert!(store.upsert_grant(&record).await.unwrap());
        assert!(!store.upsert_grant(&record).await.unwrap());
        assert_eq!(store.count_grants(GrantFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reupsert_refreshes_scraped_at() {
        let store = MemoryGrantStore::new();
        let mut record = grant("Community Health Grant", "Wellness Trust");
        record.scraped_at = Utc::now() - Duration::days(3);
        store.upsert_grant(&record).await.unwrap();

        let cutoff = Utc::now() - Duration::days(1);
        assert_eq!(store.count_grants(GrantFilter::since(cutoff)).await.unwrap(), 0);

        record.scraped_at = Utc::now();
        store.upsert_grant(&record).await.unwrap();
        assert_eq!(store.count_grants(GrantFilter::since(cutoff)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn session_lifecycle_round_trips() {
        let store = MemoryGrantStore::new();
        let session = ScrapingSession::started("abcd1234abcd1234".to_string(), Utc::now());
        store.record_session_start(&session).await.unwrap();

        let running = store.recent_sessions(10).await.unwrap();
        assert_eq!(running[0].status, SessionStatus::Running);

        store
            .record_session_end(
                &session.session_id,
                SessionTerminal {
                    status: SessionStatus::Completed,
                    end_time: Utc::now(),
                    grants_scraped: 12,
                    categories: vec!["grants-for-youth".to_string()],
                    error: None,
                },
            )
            .await
            .unwrap();

        let done = store.recent_sessions(10).await.unwrap();
        assert_eq!(done[0].status, SessionStatus::Completed);
        assert_eq!(done[0].grants_scraped, 12);
        assert!(done[0].end_time.is_some());
    }

    #[tokio::test]
    async fn ending_unknown_session_fails() {
        let store = MemoryGrantStore::new();
        let err = store
            .record_session_end(
                "missing",
                SessionTerminal {
                    status: SessionStatus::Failed,
                    end_time: Utc::now(),
                    grants_scraped: 0,
                    categories: vec![],
                    error: Some("boom".to_string()),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn count_sessions_filters_by_status_and_time() {
        let store = MemoryGrantStore::new();
        let old = ScrapingSession::started("a".repeat(16), Utc::now() - Duration::days(10));
        let recent = ScrapingSession::started("b".repeat(16), Utc::now());
        store.record_session_start(&old).await.unwrap();
        store.record_session_start(&recent).await.unwrap();
        store
            .record_session_end(
                &recent.session_id,
                SessionTerminal {
                    status: SessionStatus::Completed,
                    end_time: Utc::now(),
                    grants_scraped: 3,
                    categories: vec![],
                    error: None,
                },
            )
            .await
            .unwrap();

        let week_ago = Utc::now() - Duration::days(7);
        let filter = SessionFilter {
            started_after: Some(week_ago),
            status: Some(SessionStatus::Completed),
        };
        assert_eq!(store.count_sessions(filter).await.unwrap(), 1);

        let all = SessionFilter::default();
        assert_eq!(store.count_sessions(all).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn search_ranks_by_term_hits_and_skips_inactive() {
        let store = MemoryGrantStore::new();
        let mut arts = grant("Youth Arts Fund", "ACME Foundation");
        arts.description = "Arts education for youth programs".to_string();
        let mut inactive = grant("Youth Sports Fund", "Old Trust");
        inactive.is_active = false;
        let health = grant("Rural Health Grant", "Wellness Trust");

        store.upsert_grant(&arts).await.unwrap();
        store.upsert_grant(&inactive).await.unwrap();
        store.upsert_grant(&health).await.unwrap();

        let hits = store.search_grants("youth arts", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Youth Arts Fund");

        let capped = store.search_grants("grant fund health", 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }
}
