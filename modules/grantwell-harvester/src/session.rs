//! One scraping session, from start record to terminal status.
//!
//! A session opens a browser profile, walks a few category pages at a
//! human pace, collects listings, then upserts the batch and finalizes its
//! own history row. Page-level failures are survivable; the portal session
//! is closed on every exit path; the history row always reaches exactly
//! one terminal state once it exists.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use grantwell_common::{Config, GrantRecord, ScrapingSession, SessionStatus};
use grantwell_store::{GrantStore, SessionTerminal};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::behavior::PacingSimulator;
use crate::extract::ListingExtractor;
use crate::portal::{GrantPortal, PortalSession};

/// Source tag stamped on every scraped record.
pub const SOURCE_TAG: &str = "GrantSphere";

/// Category slugs in the portal's URL scheme.
pub const CATEGORIES: [&str; 12] = [
    "grants-for-small-business",
    "grants-for-nonprofits",
    "grants-for-women",
    "grants-for-minorities",
    "grants-for-veterans",
    "grants-for-education",
    "grants-for-arts",
    "grants-for-health",
    "grants-for-environment",
    "grants-for-technology",
    "grants-for-community",
    "grants-for-youth",
];

/// Pages walked per category, starting from a randomized page number.
const PAGES_PER_CATEGORY: u32 = 2;

/// Tracks which categories have been visited today so sessions rotate
/// through the whole pool before repeating any of it.
#[derive(Default)]
pub struct CategoryRotation {
    visited: HashSet<String>,
}

impl CategoryRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick up to `want` categories not yet visited today, in random
    /// order. An exhausted rotation resets and picks from the full pool.
    pub fn pick(&mut self, rng: &mut StdRng, want: usize) -> Vec<String> {
        let mut available: Vec<&str> = CATEGORIES
            .iter()
            .copied()
            .filter(|c| !self.visited.contains(*c))
            .collect();
        if available.is_empty() {
            self.visited.clear();
            available = CATEGORIES.to_vec();
        }
        available.shuffle(rng);
        available.truncate(want.min(available.len()));
        available.into_iter().map(String::from).collect()
    }

    /// Record a category as visited once it has actually been scraped.
    pub fn mark_visited(&mut self, category: &str) {
        self.visited.insert(category.to_string());
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn reset(&mut self) {
        self.visited.clear();
    }
}

#[derive(Debug, Clone)]
pub struct PortalCredentials {
    pub username: String,
    pub password: String,
}

/// Per-session overrides from the control surface. Defaults leave every
/// decision to the engine's own randomness.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Stop collecting once this many records are gathered, instead of the
    /// randomized 20-30 target.
    pub grant_target: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub source_tag: String,
    pub credentials: Option<PortalCredentials>,
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        let credentials = match (&config.portal_username, &config.portal_password) {
            (Some(username), Some(password)) => Some(PortalCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        Self {
            base_url: config.portal_base_url.trim_end_matches('/').to_string(),
            source_tag: SOURCE_TAG.to_string(),
            credentials,
        }
    }
}

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionStats {
    pub session_id: String,
    pub status: SessionStatus,
    pub categories: Vec<String>,
    pub pages_viewed: u32,
    pub listings_seen: usize,
    pub records_collected: usize,
    pub grants_new: i64,
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Harvest Session Complete ===")?;
        writeln!(f, "Session:        {}", self.session_id)?;
        writeln!(f, "Status:         {}", self.status)?;
        writeln!(f, "Categories:     {}", self.categories.join(", "))?;
        writeln!(f, "Pages viewed:   {}", self.pages_viewed)?;
        writeln!(f, "Listings seen:  {}", self.listings_seen)?;
        writeln!(f, "Collected:      {}", self.records_collected)?;
        writeln!(f, "New grants:     {}", self.grants_new)?;
        Ok(())
    }
}

/// What the page walk gathered before dedup and storage.
#[derive(Default)]
struct Harvest {
    records: Vec<GrantRecord>,
    categories: Vec<String>,
    pages_viewed: u32,
    listings_seen: usize,
}

pub struct SessionEngine {
    portal: Arc<dyn GrantPortal>,
    store: Arc<dyn GrantStore>,
    simulator: Arc<Mutex<PacingSimulator>>,
    rotation: Arc<Mutex<CategoryRotation>>,
    extractor: ListingExtractor,
    config: EngineConfig,
    rng: StdRng,
}

impl SessionEngine {
    pub fn new(
        portal: Arc<dyn GrantPortal>,
        store: Arc<dyn GrantStore>,
        simulator: Arc<Mutex<PacingSimulator>>,
        rotation: Arc<Mutex<CategoryRotation>>,
        config: EngineConfig,
    ) -> Self {
        Self::with_rng(portal, store, simulator, rotation, config, StdRng::from_os_rng())
    }

    /// Seeded constructor for deterministic tests.
    pub fn with_rng(
        portal: Arc<dyn GrantPortal>,
        store: Arc<dyn GrantStore>,
        simulator: Arc<Mutex<PacingSimulator>>,
        rotation: Arc<Mutex<CategoryRotation>>,
        config: EngineConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            portal,
            store,
            simulator,
            rotation,
            extractor: ListingExtractor::new(),
            config,
            rng,
        }
    }

    /// Run one full session under `session_id`. The history row is written
    /// in `Running` state before anything else happens, and moved to
    /// exactly one terminal state before this returns.
    pub async fn run(
        &mut self,
        session_id: String,
        options: SessionOptions,
        cancel: Arc<AtomicBool>,
    ) -> Result<SessionStats> {
        let start_time = Utc::now();
        self.store
            .record_session_start(&ScrapingSession::started(session_id.clone(), start_time))
            .await
            .context("Failed to record session start")?;
        info!(session_id = %session_id, "Harvest session started");

        let profile = {
            let mut sim = self.simulator.lock().await;
            sim.profile()
        };
        let viewport = (profile.viewport_width, profile.viewport_height);

        let mut portal_session = match self.portal.open(profile).await {
            Ok(session) => session,
            Err(e) => {
                self.finish_failed(&session_id, &e).await;
                return Err(e.context("Failed to open portal session"));
            }
        };

        let harvest = self.walk(&mut *portal_session, viewport, &options, &cancel).await;

        // The browser session goes back to the pool on every path
        if let Err(e) = portal_session.close().await {
            warn!(session_id = %session_id, error = %e, "Failed to close portal session");
        }

        // Dedup within the batch: the same listing can show up on more
        // than one page. First occurrence wins.
        let mut seen = HashSet::new();
        let mut batch = Vec::new();
        for record in harvest.records {
            if seen.insert(record.grant_id.clone()) {
                batch.push(record);
            }
        }

        let mut grants_new = 0i64;
        for record in &batch {
            match self.store.upsert_grant(record).await {
                Ok(true) => grants_new += 1,
                Ok(false) => {}
                Err(e) => warn!(grant_id = %record.grant_id, error = %e, "Failed to store grant"),
            }
        }

        self.store
            .record_session_end(
                &session_id,
                SessionTerminal {
                    status: SessionStatus::Completed,
                    end_time: Utc::now(),
                    grants_scraped: grants_new,
                    categories: harvest.categories.clone(),
                    error: None,
                },
            )
            .await
            .context("Failed to record session end")?;

        Ok(SessionStats {
            session_id,
            status: SessionStatus::Completed,
            categories: harvest.categories,
            pages_viewed: harvest.pages_viewed,
            listings_seen: harvest.listings_seen,
            records_collected: batch.len(),
            grants_new,
        })
    }

    /// Walk the planned categories page by page, collecting listings.
    /// Individual page failures are logged and skipped; cancellation and
    /// the daily page ceiling stop the walk early without failing it.
    async fn walk(
        &mut self,
        session: &mut dyn PortalSession,
        viewport: (u32, u32),
        options: &SessionOptions,
        cancel: &AtomicBool,
    ) -> Harvest {
        let target = options
            .grant_target
            .unwrap_or_else(|| self.rng.random_range(20..=30));
        let want = self.rng.random_range(2..=3);
        let categories = {
            let mut rotation = self.rotation.lock().await;
            rotation.pick(&mut self.rng, want)
        };
        info!(?categories, target, "Session plan");

        if let Some(credentials) = self.config.credentials.clone() {
            if let Err(e) = self.login(session, &credentials).await {
                warn!(error = %e, "Portal login failed, continuing without login");
            }
        }

        let mut harvest = Harvest::default();

        'categories: for (index, category) in categories.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                info!("Stop requested, ending session early");
                break;
            }
            info!(category = %category, "Scraping category");

            let start_page = self.rng.random_range(1..=3);
            for page in start_page..start_page + PAGES_PER_CATEGORY {
                if cancel.load(Ordering::SeqCst) {
                    info!("Stop requested, ending session early");
                    break 'categories;
                }
                let under_ceiling = self.simulator.lock().await.should_continue_today();
                if !under_ceiling {
                    info!("Daily page ceiling reached, ending session early");
                    break 'categories;
                }

                let url = format!("{}/{}/{}", self.config.base_url, category, page);
                match self.scrape_page(session, &url, viewport).await {
                    Ok(page_records) => {
                        harvest.pages_viewed += 1;
                        harvest.listings_seen += page_records.records.len() + page_records.skipped;
                        debug!(url = %url, listings = page_records.records.len(), "Page scraped");
                        for record in page_records.records {
                            harvest.records.push(record);
                            // Micro-pause between listings, like skimming
                            self.simulator.lock().await.delay(0.5, 1.5).await;
                        }
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Failed to scrape page, moving on");
                    }
                }

                self.simulator.lock().await.delay(5.0, 15.0).await;
                if self.rng.random_bool(0.3) {
                    self.simulator.lock().await.delay(30.0, 60.0).await;
                }
            }

            self.rotation.lock().await.mark_visited(category);
            harvest.categories.push(category.clone());

            if harvest.records.len() >= target {
                info!(collected = harvest.records.len(), target, "Session target reached");
                break;
            }
            if index + 1 < categories.len() {
                self.simulator.lock().await.delay(30.0, 60.0).await;
                self.simulator.lock().await.maybe_break().await;
            }
        }

        harvest
    }

    async fn scrape_page(
        &mut self,
        session: &mut dyn PortalSession,
        url: &str,
        viewport: (u32, u32),
    ) -> Result<crate::extract::PageRecords> {
        session.navigate(url).await?;
        self.simulator.lock().await.delay(2.0, 4.0).await;

        let steps = {
            let mut sim = self.simulator.lock().await;
            sim.gesture_plan(viewport.0, viewport.1)
        };
        if let Err(e) = session.perform(&steps).await {
            debug!(error = %e, "Gesture playback failed (non-critical)");
        }

        self.simulator.lock().await.read_page().await;

        let html = session.dom().await?;
        Ok(self.extractor.extract_page(&html, url, &self.config.source_tag))
    }

    /// Best-effort login. Failures are the caller's to log; the session
    /// proceeds unauthenticated.
    async fn login(
        &mut self,
        session: &mut dyn PortalSession,
        credentials: &PortalCredentials,
    ) -> Result<()> {
        let login_url = format!("{}/login", self.config.base_url);
        session.navigate(&login_url).await?;
        self.simulator.lock().await.delay(3.0, 5.0).await;

        let delays = {
            let mut sim = self.simulator.lock().await;
            sim.typing_delays(credentials.username.len())
        };
        session
            .type_text("input[name='username']", &credentials.username, &delays)
            .await?;
        self.simulator.lock().await.delay(1.0, 2.0).await;

        let delays = {
            let mut sim = self.simulator.lock().await;
            sim.typing_delays(credentials.password.len())
        };
        session
            .type_text("input[name='password']", &credentials.password, &delays)
            .await?;
        self.simulator.lock().await.delay(1.0, 3.0).await;

        session.click("button[type='submit']").await?;
        self.simulator.lock().await.delay(3.0, 5.0).await;

        info!("Logged in to portal");
        Ok(())
    }

    async fn finish_failed(&self, session_id: &str, err: &anyhow::Error) {
        let terminal = SessionTerminal {
            status: SessionStatus::Failed,
            end_time: Utc::now(),
            grants_scraped: 0,
            categories: Vec::new(),
            error: Some(format!("{err:#}")),
        };
        if let Err(e) = self.store.record_session_end(session_id, terminal).await {
            error!(session_id = %session_id, error = %e, "Failed to record session failure");
        }
    }
}
