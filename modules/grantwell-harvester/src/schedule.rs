//! Day planning and the long-running scheduler loop.
//!
//! Planning is pure and seeded so it can be unit tested; the loop is a
//! 60-second tick that fires each planned time once, handles the day
//! rollover, and reports progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::service::HarvesterService;

/// A window of the day sessions can land in, weighted by how likely a
/// person is to be browsing then.
#[derive(Debug, Clone, Copy)]
pub struct SessionWindow {
    pub start_minute: u32,
    pub end_minute: u32,
    pub weight: f64,
}

/// Morning, lunch, afternoon, evening, late evening.
pub const SESSION_WINDOWS: &[SessionWindow] = &[
    SessionWindow { start_minute: 8 * 60, end_minute: 11 * 60, weight: 0.25 },
    SessionWindow { start_minute: 11 * 60, end_minute: 14 * 60, weight: 0.20 },
    SessionWindow { start_minute: 14 * 60, end_minute: 17 * 60, weight: 0.25 },
    SessionWindow { start_minute: 19 * 60, end_minute: 22 * 60, weight: 0.20 },
    SessionWindow { start_minute: 22 * 60, end_minute: 23 * 60 + 30, weight: 0.10 },
];

/// Minimum spacing between two sessions in a day.
pub const MIN_SESSION_GAP_MINUTES: i64 = 120;

const MINUTES_PER_DAY: i64 = 24 * 60;
const TICK: Duration = Duration::from_secs(60);
const HOURLY: Duration = Duration::from_secs(3600);

/// Session start times for one day, as minutes after local midnight.
#[derive(Debug, Clone, PartialEq)]
pub struct DayPlan {
    pub session_minutes: Vec<u32>,
}

impl DayPlan {
    pub fn pretty(&self) -> String {
        self.session_minutes
            .iter()
            .map(|m| format!("{:02}:{:02}", m / 60, m % 60))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Draw 2-3 session times from the weighted windows, sorted, then spread
/// them at least two hours apart. A time that cannot be pushed without
/// crossing midnight keeps its original (close) slot.
pub fn plan_day(rng: &mut StdRng) -> DayPlan {
    let count = rng.random_range(2..=3);
    let mut minutes: Vec<i64> = (0..count)
        .map(|_| {
            let window = pick_window(rng);
            rng.random_range(window.start_minute..=window.end_minute) as i64
        })
        .collect();
    minutes.sort_unstable();

    for i in 1..minutes.len() {
        if minutes[i] - minutes[i - 1] < MIN_SESSION_GAP_MINUTES {
            let pushed = minutes[i - 1] + rng.random_range(120..=180);
            if pushed < MINUTES_PER_DAY {
                minutes[i] = pushed;
            }
        }
    }

    DayPlan {
        session_minutes: minutes.into_iter().map(|m| m as u32).collect(),
    }
}

fn pick_window(rng: &mut StdRng) -> &'static SessionWindow {
    let total: f64 = SESSION_WINDOWS.iter().map(|w| w.weight).sum();
    let mut roll = rng.random_range(0.0..total);
    for window in SESSION_WINDOWS {
        if roll < window.weight {
            return window;
        }
        roll -= window.weight;
    }
    &SESSION_WINDOWS[SESSION_WINDOWS.len() - 1]
}

/// Per-fire randomness: a start jitter, an occasional skipped session,
/// and the rare rest-of-day off.
#[derive(Debug, Clone, PartialEq)]
pub enum FireDecision {
    Run { jitter: Duration },
    Skip,
    DayOff,
}

pub fn fire_decision(rng: &mut StdRng) -> FireDecision {
    let jitter_minutes: i64 = rng.random_range(-15..=15);
    if rng.random_bool(0.05) {
        return FireDecision::Skip;
    }
    if rng.random_bool(0.02) {
        return FireDecision::DayOff;
    }
    FireDecision::Run {
        jitter: Duration::from_secs(jitter_minutes.max(0) as u64 * 60),
    }
}

fn minute_of_day(now: &chrono::DateTime<Local>) -> u32 {
    now.time().hour() * 60 + now.time().minute()
}

/// The scheduler loop. Runs until `running` is cleared; `paused` keeps
/// the loop ticking (rollover still happens) without firing sessions.
pub async fn run_scheduler(
    service: Arc<HarvesterService>,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
) {
    let mut rng = StdRng::from_os_rng();
    let now = Local::now();
    let mut today = now.date_naive();
    let mut plan = plan_day(&mut rng);
    // Times already behind us at startup stay unfired
    let mut fired: Vec<bool> = plan
        .session_minutes
        .iter()
        .map(|&m| m <= minute_of_day(&now))
        .collect();
    info!(times = %plan.pretty(), "Scheduled harvest sessions for today");

    let mut last_observation = Instant::now();

    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(TICK).await;

        let now = Local::now();
        if now.date_naive() != today {
            service.emit_daily_summary().await;
            service.reset_day().await;
            today = now.date_naive();
            plan = plan_day(&mut rng);
            fired = vec![false; plan.session_minutes.len()];
            info!(times = %plan.pretty(), "Scheduled harvest sessions for today");
        }

        if !paused.load(Ordering::SeqCst) {
            let minute_now = minute_of_day(&now);
            for i in 0..plan.session_minutes.len() {
                if fired[i] || plan.session_minutes[i] > minute_now {
                    continue;
                }
                fired[i] = true;
                match fire_decision(&mut rng) {
                    FireDecision::Skip => {
                        info!("Randomly skipping this session");
                    }
                    FireDecision::DayOff => {
                        info!("Taking the rest of the day off");
                        for f in fired.iter_mut() {
                            *f = true;
                        }
                        break;
                    }
                    FireDecision::Run { jitter } => {
                        if !jitter.is_zero() {
                            info!(minutes = jitter.as_secs() / 60, "Delaying session start");
                            tokio::time::sleep(jitter).await;
                        }
                        service.run_scheduled_session().await;
                    }
                }
            }
        }

        if last_observation.elapsed() >= HOURLY {
            last_observation = Instant::now();
            match service.progress().await {
                Ok(p) => info!(
                    total_grants = p.total_grants,
                    grants_today = p.grants_today,
                    sessions_today = p.sessions_today,
                    "Hourly progress"
                ),
                Err(e) => warn!(error = %e, "Failed to read progress"),
            }
        }
    }

    info!("Scheduler stopped");
}
