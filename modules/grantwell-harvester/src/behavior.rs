//! Human-pace browsing decisions.
//!
//! Every randomized choice the harvester makes flows through
//! [`PacingSimulator`], which owns a single `StdRng` so tests can seed it
//! and replay decisions. The decision methods are synchronous; only the
//! thin `async` wrappers actually sleep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use browserpool_client::{GestureStep, SessionProfile};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;
use tracing::{debug, info};

/// Desktop user agents rotated across sessions.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-US,en;q=0.8,es;q=0.6",
];

/// Simulates one person's browsing rhythm for the lifetime of the process.
pub struct PacingSimulator {
    rng: StdRng,
    /// Daily page budget, drawn once. Never redrawn, so the limit cannot
    /// creep upward over repeated checks.
    page_ceiling: u32,
    pages_viewed: u32,
    last_break: Instant,
}

impl PacingSimulator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Seeded constructor for deterministic tests.
    pub fn with_rng(mut rng: StdRng) -> Self {
        let page_ceiling = rng.random_range(50..=100);
        Self {
            rng,
            page_ceiling,
            pages_viewed: 0,
            last_break: Instant::now(),
        }
    }

    /// Uniform pause in `[min_s, max_s]` seconds.
    pub fn draw_delay(&mut self, min_s: f64, max_s: f64) -> Duration {
        Duration::from_secs_f64(self.rng.random_range(min_s..=max_s))
    }

    pub async fn delay(&mut self, min_s: f64, max_s: f64) {
        let pause = self.draw_delay(min_s, max_s);
        debug!(seconds = format_args!("{:.2}", pause.as_secs_f64()), "Pausing");
        sleep(pause).await;
    }

    /// Dwell on the current page for 10-30s, then count it against the
    /// daily ceiling.
    pub async fn read_page(&mut self) {
        let dwell = self.draw_delay(10.0, 30.0);
        debug!(seconds = format_args!("{:.1}", dwell.as_secs_f64()), "Reading page");
        sleep(dwell).await;
        self.note_page_view();
    }

    /// Count one page view against the daily ceiling.
    pub fn note_page_view(&mut self) {
        self.pages_viewed += 1;
    }

    pub fn pages_viewed(&self) -> u32 {
        self.pages_viewed
    }

    pub fn page_ceiling(&self) -> u32 {
        self.page_ceiling
    }

    /// Whether today's page budget still has room.
    pub fn should_continue_today(&self) -> bool {
        self.pages_viewed < self.page_ceiling
    }

    /// Clear the daily page counter at day rollover.
    pub fn reset_day(&mut self) {
        self.pages_viewed = 0;
    }

    /// Advisory check that `hour` (local, 0-23) looks like a time a person
    /// would browse. Always false during 02:00-06:00; otherwise a biased
    /// coin: 0.8 during business hours, 0.6 in the evening, 0.4 elsewhere.
    pub fn is_good_time(&mut self, hour: u32) -> bool {
        if (2..=6).contains(&hour) {
            return false;
        }
        let odds = if (9..=17).contains(&hour) {
            0.8
        } else if (18..=23).contains(&hour) {
            0.6
        } else {
            0.4
        };
        self.rng.random_bool(odds)
    }

    /// A break is due when `since_last_break` exceeds a 20-40 minute
    /// threshold redrawn per check; the break itself lasts 5-30 minutes.
    pub fn break_duration(&mut self, since_last_break: Duration) -> Option<Duration> {
        let threshold = Duration::from_secs_f64(self.rng.random_range(1200.0..=2400.0));
        if since_last_break < threshold {
            return None;
        }
        Some(Duration::from_secs_f64(self.rng.random_range(300.0..=1800.0)))
    }

    /// Take the break if one is due, then reset the break clock.
    pub async fn maybe_break(&mut self) {
        let elapsed = self.last_break.elapsed();
        if let Some(pause) = self.break_duration(elapsed) {
            info!(minutes = format_args!("{:.1}", pause.as_secs_f64() / 60.0), "Taking a break");
            sleep(pause).await;
            self.last_break = Instant::now();
        }
    }

    /// Randomized browser headers, User-Agent included.
    pub fn headers(&mut self) -> HashMap<String, String> {
        let ua = USER_AGENTS[self.rng.random_range(0..USER_AGENTS.len())];
        let lang = ACCEPT_LANGUAGES[self.rng.random_range(0..ACCEPT_LANGUAGES.len())];

        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), ua.to_string());
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string(),
        );
        headers.insert("Accept-Language".to_string(), lang.to_string());
        headers.insert("Accept-Encoding".to_string(), "gzip, deflate, br".to_string());
        headers.insert("Connection".to_string(), "keep-alive".to_string());
        headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());
        // Some browsers send DNT, some do not
        if self.rng.random_bool(0.5) {
            headers.insert("DNT".to_string(), "1".to_string());
        }
        headers
    }

    /// Randomized window size, desktop-shaped.
    pub fn viewport(&mut self) -> (u32, u32) {
        (
            self.rng.random_range(1200..=1920),
            self.rng.random_range(800..=1080),
        )
    }

    /// Full browser profile for opening a portal session.
    pub fn profile(&mut self) -> SessionProfile {
        let (width, height) = self.viewport();
        let mut headers = self.headers();
        let user_agent = headers
            .remove("User-Agent")
            .unwrap_or_else(|| USER_AGENTS[0].to_string());
        SessionProfile {
            viewport_width: width,
            viewport_height: height,
            user_agent,
            headers,
        }
    }

    /// Pointer and scroll noise for one page view: a few cursor drifts,
    /// then paragraph-sized scroll steps with reading pauses and the
    /// occasional scroll back up, ending in a dwell.
    pub fn gesture_plan(&mut self, viewport_width: u32, viewport_height: u32) -> Vec<GestureStep> {
        let max_x = viewport_width.saturating_sub(100).clamp(101, 1200);
        let max_y = viewport_height.saturating_sub(100).clamp(101, 700);

        let mut steps = Vec::new();
        for _ in 0..self.rng.random_range(2..=4) {
            steps.push(GestureStep::MoveTo {
                x: self.rng.random_range(100..=max_x),
                y: self.rng.random_range(100..=max_y),
                duration_ms: self.rng.random_range(500..=2000),
            });
        }
        for _ in 0..self.rng.random_range(3..=6) {
            steps.push(GestureStep::ScrollBy {
                y: self.rng.random_range(200..=500),
                pause_ms: self.rng.random_range(500..=2000),
            });
            if self.rng.random_bool(0.2) {
                let back: i32 = self.rng.random_range(50..=150);
                steps.push(GestureStep::ScrollBy {
                    y: -back,
                    pause_ms: self.rng.random_range(300..=1000),
                });
            }
        }
        steps.push(GestureStep::Dwell {
            ms: self.rng.random_range(1000..=3000),
        });
        steps
    }

    /// Per-keystroke delays for typing `len` characters.
    pub fn typing_delays(&mut self, len: usize) -> Vec<u64> {
        (0..len).map(|_| self.rng.random_range(50..=200)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(seed: u64) -> PacingSimulator {
        PacingSimulator::with_rng(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn page_ceiling_drawn_once_within_bounds() {
        for seed in 0..50 {
            let s = sim(seed);
            assert!((50..=100).contains(&s.page_ceiling()), "seed {seed}");
        }
    }

    #[test]
    fn continue_today_flips_exactly_at_ceiling() {
        let mut s = sim(7);
        let ceiling = s.page_ceiling();
        for _ in 0..ceiling {
            assert!(s.should_continue_today());
            s.note_page_view();
        }
        assert!(!s.should_continue_today());
        // Ceiling stays put no matter how often it is consulted
        assert_eq!(s.page_ceiling(), ceiling);

        s.reset_day();
        assert_eq!(s.pages_viewed(), 0);
        assert!(s.should_continue_today());
    }

    #[test]
    fn quiet_hours_are_deterministically_bad() {
        for seed in 0..20 {
            let mut s = sim(seed);
            for hour in 2..=6 {
                assert!(!s.is_good_time(hour), "hour {hour} seed {seed}");
            }
        }
    }

    #[test]
    fn business_hours_are_usually_good() {
        let mut s = sim(11);
        let good = (0..1000).filter(|_| s.is_good_time(10)).count();
        // p = 0.8, so well away from both 0 and 1000
        assert!((700..900).contains(&good), "got {good}");
    }

    #[test]
    fn delays_respect_their_bounds() {
        let mut s = sim(3);
        for _ in 0..200 {
            let d = s.draw_delay(3.0, 10.0).as_secs_f64();
            assert!((3.0..=10.0).contains(&d));
        }
    }

    #[test]
    fn breaks_only_fire_after_threshold() {
        let mut s = sim(5);
        for _ in 0..100 {
            // 10 minutes is always below the 20-40 minute threshold
            assert!(s.break_duration(Duration::from_secs(600)).is_none());
        }
        for _ in 0..100 {
            // 45 minutes is always above it
            let pause = s
                .break_duration(Duration::from_secs(45 * 60))
                .expect("break due");
            let minutes = pause.as_secs_f64() / 60.0;
            assert!((5.0..=30.0).contains(&minutes));
        }
    }

    #[test]
    fn headers_look_like_a_browser() {
        let mut s = sim(9);
        let headers = s.headers();
        let ua = headers.get("User-Agent").expect("user agent");
        assert!(USER_AGENTS.contains(&ua.as_str()));
        assert!(headers.contains_key("Accept-Language"));
        assert!(headers.contains_key("Accept-Encoding"));
    }

    #[test]
    fn profile_moves_user_agent_out_of_headers() {
        let mut s = sim(13);
        let profile = s.profile();
        assert!(USER_AGENTS.contains(&profile.user_agent.as_str()));
        assert!(!profile.headers.contains_key("User-Agent"));
        assert!((1200..=1920).contains(&profile.viewport_width));
        assert!((800..=1080).contains(&profile.viewport_height));
    }

    #[test]
    fn gesture_plan_stays_inside_viewport_and_ends_with_dwell() {
        let mut s = sim(17);
        for _ in 0..50 {
            let steps = s.gesture_plan(1280, 800);
            assert!(steps.len() >= 6);
            let mut moves = 0;
            for step in &steps {
                match step {
                    GestureStep::MoveTo { x, y, duration_ms } => {
                        moves += 1;
                        assert!((100..=1180).contains(x));
                        assert!((100..=700).contains(y));
                        assert!((500..=2000).contains(duration_ms));
                    }
                    GestureStep::ScrollBy { y, pause_ms } => {
                        assert!((-150..=500).contains(y));
                        assert_ne!(*y, 0);
                        assert!(*pause_ms >= 300);
                    }
                    GestureStep::Dwell { ms } => assert!((1000..=3000).contains(ms)),
                }
            }
            assert!((2..=4).contains(&moves));
            assert!(matches!(steps.last(), Some(GestureStep::Dwell { .. })));
        }
    }

    #[test]
    fn typing_delays_cover_every_keystroke() {
        let mut s = sim(21);
        let delays = s.typing_delays(12);
        assert_eq!(delays.len(), 12);
        assert!(delays.iter().all(|ms| (50..=200).contains(ms)));
    }
}
