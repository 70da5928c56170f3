//! REST handlers. Every failure maps to a status code and an
//! `{ "error": ... }` body; nothing panics across this boundary.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{Duration, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::json;

use grantwell_common::SessionStatus;
use grantwell_harvester::{HarvestError, SchedulerAction, SessionOptions};
use grantwell_store::{GrantFilter, SessionFilter, StoreError};

use crate::AppState;

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<HarvestError> for ApiError {
    fn from(e: HarvestError) -> Self {
        let status = match e {
            HarvestError::SessionActive => StatusCode::CONFLICT,
            HarvestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

// --- Grant matching ---

#[derive(Deserialize)]
pub struct MatchRequest {
    pub project_summary: String,
    #[serde(default)]
    pub focus_area: String,
    #[serde(default)]
    pub org_type: String,
}

pub async fn api_match(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MatchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.project_summary.trim().is_empty() {
        return Err(ApiError::bad_request("project_summary is required"));
    }

    let grants = state
        .matcher
        .match_grants(&request.project_summary, &request.focus_area, &request.org_type)
        .await;

    Ok(Json(json!({
        "count": grants.len(),
        "grants": grants,
    })))
}

// --- Scraping control surface ---

pub async fn scraping_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state.service.status().await;
    let progress = state.service.progress().await?;
    let recent = state.store.recent_sessions(5).await?;

    let success_rate = if recent.is_empty() {
        0.0
    } else {
        let completed = recent
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .count();
        completed as f64 / recent.len() as f64 * 100.0
    };

    Ok(Json(json!({
        "system_status": {
            "scheduler_running": status.scheduler_running,
            "session_active": status.session_active,
            "mode": if status.scheduler_running { "automatic" } else { "manual" },
            "last_session": status.last_session_time,
        },
        "progress": {
            "total_grants": progress.total_grants,
            "grants_today": progress.grants_today,
            "sessions_today": progress.sessions_today,
            "estimated_days_to_2000": progress.estimated_days_to_2000,
            "estimated_days_to_5000": progress.estimated_days_to_5000,
            "success_rate": success_rate,
        },
        "recent_sessions": recent.iter().map(|s| json!({
            "session_id": s.session_id,
            "start_time": s.start_time,
            "status": s.status,
            "grants_scraped": s.grants_scraped,
        })).collect::<Vec<_>>(),
    })))
}

pub async fn scraping_progress(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let progress = state.service.progress().await?;
    Ok(Json(serde_json::to_value(progress).unwrap_or_default()))
}

#[derive(Deserialize, Default)]
pub struct SessionStartRequest {
    /// Per-session cap on collected records; the engine draws its own
    /// target when absent.
    pub grants_limit: Option<usize>,
}

pub async fn session_start(
    State(state): State<Arc<AppState>>,
    body: Option<Json<SessionStartRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let options = SessionOptions {
        grant_target: request.grants_limit,
    };
    let session_id = state.service.start_session(options)?;
    Ok(Json(json!({
        "status": "session_started",
        "session_id": session_id,
    })))
}

pub async fn session_stop(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    if state.service.stop_session() {
        Json(json!({
            "status": "session_stopped",
            "message": "Stop signal sent; inserts made so far are kept",
        }))
    } else {
        Json(json!({
            "status": "no_session",
            "message": "No active session to stop",
        }))
    }
}

#[derive(Deserialize)]
pub struct SchedulerControlRequest {
    pub action: String,
}

pub async fn scheduler_control(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SchedulerControlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let action: SchedulerAction = request
        .action
        .parse()
        .map_err(ApiError::bad_request)?;
    let outcome = state.service.control_scheduler(action).await;
    Ok(Json(json!({ "status": outcome })))
}

#[derive(Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_stats_days")]
    pub days: i64,
}

fn default_stats_days() -> i64 {
    7
}

pub async fn scraping_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let days = query.days.clamp(1, 90);
    let today = Utc::now().date_naive();

    let mut grants_by_day = Vec::with_capacity(days as usize);
    for offset in 0..days {
        let date = today - Duration::days(offset);
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = start + Duration::days(1);
        let count = state
            .store
            .count_grants(GrantFilter {
                scraped_after: Some(start),
                scraped_before: Some(end),
                active_only: false,
            })
            .await?;
        grants_by_day.push(json!({ "date": date, "grants": count }));
    }

    let week_ago = Utc::now() - Duration::days(7);
    let completed = state
        .store
        .count_sessions(SessionFilter {
            started_after: Some(week_ago),
            status: Some(SessionStatus::Completed),
        })
        .await?;
    let failed = state
        .store
        .count_sessions(SessionFilter {
            started_after: Some(week_ago),
            status: Some(SessionStatus::Failed),
        })
        .await?;

    let recent = state.store.recent_sessions(100).await?;
    let counts: Vec<i64> = recent
        .iter()
        .filter(|s| s.start_time >= week_ago && s.status == SessionStatus::Completed)
        .map(|s| s.grants_scraped)
        .collect();
    let avg_grants_per_session = if counts.is_empty() {
        0.0
    } else {
        counts.iter().sum::<i64>() as f64 / counts.len() as f64
    };

    Ok(Json(json!({
        "grants_by_day": grants_by_day,
        "sessions": {
            "completed_last_7_days": completed,
            "failed_last_7_days": failed,
            "avg_grants_per_session": avg_grants_per_session,
        },
    })))
}
