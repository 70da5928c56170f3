pub mod error;
pub mod types;

pub use error::{BrowserPoolError, Result};
pub use types::{GestureStep, SessionProfile};

use std::time::Duration;

use types::{ClickRequest, GestureRequest, NavigateRequest, OpenSessionResponse, TypeRequest};

/// Client for a headless-Chrome pool sidecar. The pool owns the actual
/// browser processes; this client opens sessions and drives them over HTTP.
#[derive(Clone)]
pub struct BrowserPoolClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserPoolClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            // Gesture steps pause pool-side, so calls can be slow by design.
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}{}", self.base_url, path);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Open a fresh browser session with the given fingerprint profile.
    /// Fails with [`BrowserPoolError::PoolExhausted`] when every browser in
    /// the pool is taken.
    pub async fn open(&self, profile: &SessionProfile) -> Result<BrowserSession> {
        let resp = self
            .client
            .post(self.endpoint("/session"))
            .json(profile)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserPoolError::from_response(status.as_u16(), message, None));
        }

        let opened: OpenSessionResponse = resp.json().await?;
        Ok(BrowserSession {
            client: self.clone(),
            session_id: opened.session_id,
        })
    }
}

/// A live browser session in the pool. Hold it for the duration of a scrape
/// and call [`BrowserSession::close`] on every exit path — the pool reclaims
/// abandoned sessions eventually, but an open session pins a real Chrome.
pub struct BrowserSession {
    client: BrowserPoolClient,
    session_id: String,
}

impl BrowserSession {
    pub fn id(&self) -> &str {
        &self.session_id
    }

    async fn post_json<T: serde::Serialize>(&self, action: &str, body: &T) -> Result<()> {
        let path = format!("/session/{}/{}", self.session_id, action);
        let resp = self
            .client
            .client
            .post(self.client.endpoint(&path))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserPoolError::from_response(
                status.as_u16(),
                message,
                Some(&self.session_id),
            ));
        }
        Ok(())
    }

    /// Navigate to a URL and wait for the load event.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.post_json("navigate", &NavigateRequest { url }).await
    }

    /// Execute a gesture plan (pointer moves, scrolls, dwells) in order.
    pub async fn perform(&self, steps: &[GestureStep]) -> Result<()> {
        self.post_json("gesture", &GestureRequest { steps }).await
    }

    /// Type text into the element matching `selector`, pausing `delays_ms[i]`
    /// before the i-th character.
    pub async fn type_text(&self, selector: &str, text: &str, delays_ms: &[u64]) -> Result<()> {
        self.post_json(
            "type",
            &TypeRequest {
                selector,
                text,
                delays_ms,
            },
        )
        .await
    }

    /// Click the first element matching `selector`.
    pub async fn click(&self, selector: &str) -> Result<()> {
        self.post_json("click", &ClickRequest { selector }).await
    }

    /// Current serialized DOM of the page.
    pub async fn dom(&self) -> Result<String> {
        let path = format!("/session/{}/dom", self.session_id);
        let resp = self
            .client
            .client
            .get(self.client.endpoint(&path))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserPoolError::from_response(
                status.as_u16(),
                message,
                Some(&self.session_id),
            ));
        }

        Ok(resp.text().await?)
    }

    /// Release the session's browser back to the pool.
    pub async fn close(self) -> Result<()> {
        let path = format!("/session/{}", self.session_id);
        let resp = self
            .client
            .client
            .delete(self.client.endpoint(&path))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            // A gone session is already released; closing it twice is fine
            return Err(BrowserPoolError::from_response(
                status.as_u16(),
                message,
                Some(&self.session_id),
            ));
        }
        Ok(())
    }
}
