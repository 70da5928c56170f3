//! Portal access behind traits so the session engine can run against a
//! real browser pool in production and a scripted fake in tests.

use anyhow::Result;
use async_trait::async_trait;
use browserpool_client::{BrowserPoolClient, BrowserSession, GestureStep, SessionProfile};

/// Opens browser-backed portal sessions.
#[async_trait]
pub trait GrantPortal: Send + Sync {
    async fn open(&self, profile: SessionProfile) -> Result<Box<dyn PortalSession>>;
}

/// One live browser session against the portal.
#[async_trait]
pub trait PortalSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;
    async fn perform(&mut self, steps: &[GestureStep]) -> Result<()>;
    async fn type_text(&mut self, selector: &str, text: &str, delays_ms: &[u64]) -> Result<()>;
    async fn click(&mut self, selector: &str) -> Result<()>;
    async fn dom(&mut self) -> Result<String>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Browser-pool-backed portal.
pub struct BrowserPoolPortal {
    client: BrowserPoolClient,
}

impl BrowserPoolPortal {
    pub fn new(client: BrowserPoolClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GrantPortal for BrowserPoolPortal {
    async fn open(&self, profile: SessionProfile) -> Result<Box<dyn PortalSession>> {
        let session = self.client.open(&profile).await?;
        Ok(Box::new(PooledSession { session }))
    }
}

struct PooledSession {
    session: BrowserSession,
}

#[async_trait]
impl PortalSession for PooledSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        Ok(self.session.navigate(url).await?)
    }

    async fn perform(&mut self, steps: &[GestureStep]) -> Result<()> {
        Ok(self.session.perform(steps).await?)
    }

    async fn type_text(&mut self, selector: &str, text: &str, delays_ms: &[u64]) -> Result<()> {
        Ok(self.session.type_text(selector, text, delays_ms).await?)
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        Ok(self.session.click(selector).await?)
    }

    async fn dom(&mut self) -> Result<String> {
        Ok(self.session.dom().await?)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(self.session.close().await?)
    }
}
