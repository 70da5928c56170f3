//! Control facade shared by the API server and the headless runner.
//!
//! The service owns the one-session-at-a-time claim, the cancel flag, the
//! scheduler task, and the day state (category rotation + pacing counters).
//! Nothing here faults across the boundary: callers get typed errors or
//! status structs, never a panic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveTime, Timelike, Utc};
use grantwell_common::new_session_id;
use grantwell_store::{GrantFilter, GrantStore, SessionFilter, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::behavior::PacingSimulator;
use crate::portal::GrantPortal;
use crate::schedule::run_scheduler;
use crate::session::{CategoryRotation, EngineConfig, SessionEngine, SessionOptions};

/// Milestones the progress report projects toward.
pub const MILESTONES: (i64, i64) = (2000, 5000);

/// Fallback daily rate used for projections before any history exists.
const DEFAULT_DAILY_RATE: i64 = 100;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("a scraping session is already active")]
    SessionActive,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerAction {
    Start,
    Stop,
    Pause,
    Resume,
}

impl std::str::FromStr for SchedulerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(SchedulerAction::Start),
            "stop" => Ok(SchedulerAction::Stop),
            "pause" => Ok(SchedulerAction::Pause),
            "resume" => Ok(SchedulerAction::Resume),
            other => Err(format!("unknown scheduler action: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestStatus {
    pub scheduler_running: bool,
    pub session_active: bool,
    pub last_session_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub total_grants: i64,
    pub grants_today: i64,
    pub sessions_today: i64,
    pub estimated_days_to_2000: i64,
    pub estimated_days_to_5000: i64,
}

/// Linear projection: days until `milestone` at `rate` new grants per day.
fn eta_days(total: i64, milestone: i64, rate: i64) -> i64 {
    ((milestone - total) / rate.max(1)).max(0)
}

pub struct HarvesterService {
    portal: Arc<dyn GrantPortal>,
    store: Arc<dyn GrantStore>,
    simulator: Arc<Mutex<PacingSimulator>>,
    rotation: Arc<Mutex<CategoryRotation>>,
    engine_config: EngineConfig,
    session_active: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    scheduler_running: Arc<AtomicBool>,
    scheduler_paused: Arc<AtomicBool>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    last_session_time: Mutex<Option<DateTime<Utc>>>,
}

impl HarvesterService {
    pub fn new(
        portal: Arc<dyn GrantPortal>,
        store: Arc<dyn GrantStore>,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            portal,
            store,
            simulator: Arc::new(Mutex::new(PacingSimulator::new())),
            rotation: Arc::new(Mutex::new(CategoryRotation::new())),
            engine_config,
            session_active: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            scheduler_running: Arc::new(AtomicBool::new(false)),
            scheduler_paused: Arc::new(AtomicBool::new(false)),
            scheduler_task: Mutex::new(None),
            last_session_time: Mutex::new(None),
        }
    }

    pub fn store(&self) -> Arc<dyn GrantStore> {
        self.store.clone()
    }

    /// Start a session in the background. Rejects when one is already in
    /// flight; the active claim is released on every exit path.
    pub fn start_session(self: &Arc<Self>, options: SessionOptions) -> Result<String, HarvestError> {
        self.claim_session()?;
        let session_id = new_session_id();
        let service = self.clone();
        let id = session_id.clone();
        tokio::spawn(async move {
            service.drive_session(id, options).await;
        });
        Ok(session_id)
    }

    /// Best-effort stop: sets the cancel flag the session checks at page
    /// boundaries. Inserts made before the stop are kept. Returns whether a
    /// session was active to receive the signal.
    pub fn stop_session(&self) -> bool {
        let active = self.session_active.load(Ordering::SeqCst);
        if active {
            info!("Stop requested for active session");
            self.cancel.store(true, Ordering::SeqCst);
        }
        active
    }

    pub async fn status(&self) -> HarvestStatus {
        HarvestStatus {
            scheduler_running: self.scheduler_running.load(Ordering::SeqCst),
            session_active: self.session_active.load(Ordering::SeqCst),
            last_session_time: *self.last_session_time.lock().await,
        }
    }

    /// Progress derived from the store, not the in-memory day counters, so
    /// a process restart never under-reports what was already harvested.
    pub async fn progress(&self) -> Result<Progress, HarvestError> {
        let now = Utc::now();
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let week_ago = now - chrono::Duration::days(7);

        let total_grants = self.store.count_grants(GrantFilter::default()).await?;
        let grants_today = self.store.count_grants(GrantFilter::since(day_start)).await?;
        let sessions_today = self
            .store
            .count_sessions(SessionFilter {
                started_after: Some(day_start),
                status: None,
            })
            .await?;

        let week_grants = self.store.count_grants(GrantFilter::since(week_ago)).await?;
        let rate = if week_grants > 0 {
            (week_grants / 7).max(1)
        } else {
            DEFAULT_DAILY_RATE
        };

        Ok(Progress {
            total_grants,
            grants_today,
            sessions_today,
            estimated_days_to_2000: eta_days(total_grants, MILESTONES.0, rate),
            estimated_days_to_5000: eta_days(total_grants, MILESTONES.1, rate),
        })
    }

    /// Start, stop, pause, or resume the daily scheduler. Returns a short
    /// human-readable outcome for the control API.
    pub async fn control_scheduler(self: &Arc<Self>, action: SchedulerAction) -> &'static str {
        match action {
            SchedulerAction::Start => {
                if self.scheduler_running.swap(true, Ordering::SeqCst) {
                    return "scheduler already running";
                }
                self.scheduler_paused.store(false, Ordering::SeqCst);
                let service = self.clone();
                let running = self.scheduler_running.clone();
                let paused = self.scheduler_paused.clone();
                let task = tokio::spawn(async move {
                    run_scheduler(service, running, paused).await;
                });
                *self.scheduler_task.lock().await = Some(task);
                info!("Scheduler started");
                "scheduler started"
            }
            SchedulerAction::Stop => {
                if !self.scheduler_running.swap(false, Ordering::SeqCst) {
                    return "scheduler not running";
                }
                if let Some(task) = self.scheduler_task.lock().await.take() {
                    task.abort();
                }
                info!("Scheduler stopped");
                "scheduler stopped"
            }
            SchedulerAction::Pause => {
                self.scheduler_paused.store(true, Ordering::SeqCst);
                info!("Scheduler paused");
                "scheduler paused"
            }
            SchedulerAction::Resume => {
                self.scheduler_paused.store(false, Ordering::SeqCst);
                info!("Scheduler resumed");
                "scheduler resumed"
            }
        }
    }

    /// Run one session now, on the scheduler's behalf. The good-time check
    /// is advisory; the scheduler honors it as one more bit of human noise.
    pub async fn run_scheduled_session(self: &Arc<Self>) {
        let hour = Local::now().hour();
        let good_time = self.simulator.lock().await.is_good_time(hour);
        if !good_time {
            info!(hour, "Not a good time to browse, letting this slot pass");
            return;
        }
        if self.claim_session().is_err() {
            warn!("Scheduled session skipped: one is already active");
            return;
        }
        self.drive_session(new_session_id(), SessionOptions::default()).await;
    }

    /// Reset the day-scoped state at the midnight rollover: the category
    /// rotation and the pacing page counter.
    pub async fn reset_day(&self) {
        self.rotation.lock().await.reset();
        self.simulator.lock().await.reset_day();
        info!("Day state reset");
    }

    /// Structured end-of-day summary. Observability only.
    pub async fn emit_daily_summary(&self) {
        match self.progress().await {
            Ok(p) => info!(
                total_grants = p.total_grants,
                grants_today = p.grants_today,
                sessions_today = p.sessions_today,
                days_to_2000 = p.estimated_days_to_2000,
                days_to_5000 = p.estimated_days_to_5000,
                "Daily harvest summary"
            ),
            Err(e) => warn!(error = %e, "Failed to build daily summary"),
        }
    }

    fn claim_session(&self) -> Result<(), HarvestError> {
        self.session_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| HarvestError::SessionActive)?;
        self.cancel.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Run the engine under an already-held session claim and release the
    /// claim when it returns, whatever happened inside.
    async fn drive_session(&self, session_id: String, options: SessionOptions) {
        let mut engine = SessionEngine::new(
            self.portal.clone(),
            self.store.clone(),
            self.simulator.clone(),
            self.rotation.clone(),
            self.engine_config.clone(),
        );
        match engine.run(session_id.clone(), options, self.cancel.clone()).await {
            Ok(stats) => info!(session_id = %session_id, "{stats}"),
            Err(e) => error!(session_id = %session_id, error = %format!("{e:#}"), "Session failed"),
        }
        *self.last_session_time.lock().await = Some(Utc::now());
        self.session_active.store(false, Ordering::SeqCst);
    }
}
