//! HTTP API server: grant matching plus the scraping control surface.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use browserpool_client::BrowserPoolClient;
use grantwell_common::Config;
use grantwell_harvester::portal::BrowserPoolPortal;
use grantwell_harvester::{EngineConfig, HarvesterService, SchedulerAction};
use grantwell_matcher::GrantMatcher;
use grantwell_store::{GrantStore, PgGrantStore};

mod rest;

pub struct AppState {
    pub service: Arc<HarvesterService>,
    pub matcher: GrantMatcher,
    pub store: Arc<dyn GrantStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("grantwell=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let store: Arc<dyn GrantStore> = Arc::new(PgGrantStore::connect(&config.database_url).await?);
    let client = BrowserPoolClient::new(&config.browserpool_url, config.browserpool_token.as_deref());
    let portal = Arc::new(BrowserPoolPortal::new(client));

    let service = Arc::new(HarvesterService::new(
        portal,
        store.clone(),
        EngineConfig::from_config(&config),
    ));

    if config.scheduler_autostart {
        service.control_scheduler(SchedulerAction::Start).await;
    }

    let state = Arc::new(AppState {
        service,
        matcher: GrantMatcher::new(store.clone()),
        store,
    });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Grant matching
        .route("/api/match", post(rest::api_match))
        // Scraping control surface
        .route("/api/scraping/status", get(rest::scraping_status))
        .route("/api/scraping/progress", get(rest::scraping_progress))
        .route("/api/scraping/stats", get(rest::scraping_stats))
        .route("/api/scraping/session/start", post(rest::session_start))
        .route("/api/scraping/session/stop", post(rest::session_stop))
        .route("/api/scraping/scheduler/control", post(rest::scheduler_control))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!(addr = %addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
