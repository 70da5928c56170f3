use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Browser fingerprint for a new session: window size, user agent, and the
/// extra request headers the pool applies to every navigation.
#[derive(Debug, Clone, Serialize)]
pub struct SessionProfile {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    pub headers: HashMap<String, String>,
}

/// One step of an input gesture executed inside the remote browser.
/// Pauses run pool-side so the page sees naturally spaced events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GestureStep {
    /// Move the pointer to viewport coordinates over `duration_ms`.
    MoveTo { x: u32, y: u32, duration_ms: u64 },
    /// Scroll vertically by `y` pixels (negative scrolls up), then pause.
    ScrollBy { y: i32, pause_ms: u64 },
    /// Do nothing for `ms`.
    Dwell { ms: u64 },
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct NavigateRequest<'a> {
    pub url: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct GestureRequest<'a> {
    pub steps: &'a [GestureStep],
}

#[derive(Debug, Serialize)]
pub(crate) struct TypeRequest<'a> {
    pub selector: &'a str,
    pub text: &'a str,
    /// Per-keystroke delays; the pool pauses before each character.
    pub delays_ms: &'a [u64],
}

#[derive(Debug, Serialize)]
pub(crate) struct ClickRequest<'a> {
    pub selector: &'a str,
}
