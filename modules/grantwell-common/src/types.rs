use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// --- Grants ---

/// A normalized grant listing from any source.
///
/// `grant_id` is the sole dedup key: re-scraping the same listing must
/// upsert the existing row, never create a second one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub grant_id: String,
    pub title: String,
    pub funder: String,
    pub description: String,
    /// Free-form deadline text; `"Rolling"` when the listing shows none.
    pub deadline: String,
    /// Free-form amount text; `"Varies"` when the listing shows none.
    pub amount: String,
    pub url: String,
    /// Which aggregation source produced the record (e.g. the portal name).
    pub source: String,
    pub scraped_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Stable fingerprint for a listing, derived from title and funder only.
/// 16 lowercase hex chars of sha256("{title}_{funder}") — identical inputs
/// always produce the identical id, so re-scrapes land on the same row.
pub fn fingerprint(title: &str, funder: &str) -> String {
    let digest = Sha256::digest(format!("{title}_{funder}").as_bytes());
    hex::encode(&digest[..8])
}

// --- Scraping sessions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// One scraping session's persisted record. Created in `Running` state the
/// moment the session starts, then moved to exactly one terminal state.
/// The history is append-only; day counters and success rates derive from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapingSession {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Count of records newly inserted by this session — re-seen listings
    /// that only got their timestamps refreshed do not count.
    pub grants_scraped: i64,
    /// Categories actually visited, in visit order.
    pub categories: Vec<String>,
    /// Present iff `status == Failed`.
    pub error: Option<String>,
}

impl ScrapingSession {
    /// A fresh session record in `Running` state.
    pub fn started(session_id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            session_id,
            start_time,
            end_time: None,
            status: SessionStatus::Running,
            grants_scraped: 0,
            categories: Vec::new(),
            error: None,
        }
    }
}

/// Opaque per-run session token: 16 hex chars drawn from a v4 uuid.
pub fn new_session_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_pure() {
        let a = fingerprint("Youth Grant", "ACME Fund");
        let b = fingerprint("Youth Grant", "ACME Fund");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_changes_with_either_input() {
        let base = fingerprint("Youth Grant", "ACME Fund");
        assert_ne!(base, fingerprint("Youth Grants", "ACME Fund"));
        assert_ne!(base, fingerprint("Youth Grant", "ACME Trust"));
    }

    #[test]
    fn session_ids_are_opaque_hex() {
        let id = new_session_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_session_id());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            let text = status.to_string();
            assert_eq!(text.parse::<SessionStatus>().unwrap(), status);
        }
    }
}
