//! Headless harvester runner: connects the store and the browser pool,
//! starts the daily scheduler, and runs until interrupted.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use browserpool_client::BrowserPoolClient;
use grantwell_common::Config;
use grantwell_harvester::portal::BrowserPoolPortal;
use grantwell_harvester::{EngineConfig, HarvesterService, SchedulerAction};
use grantwell_store::PgGrantStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("grantwell=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let store = Arc::new(PgGrantStore::connect(&config.database_url).await?);
    let client = BrowserPoolClient::new(&config.browserpool_url, config.browserpool_token.as_deref());
    let portal = Arc::new(BrowserPoolPortal::new(client));

    let service = Arc::new(HarvesterService::new(
        portal,
        store,
        EngineConfig::from_config(&config),
    ));

    service.control_scheduler(SchedulerAction::Start).await;
    info!("Harvester running; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    service.stop_session();
    service.control_scheduler(SchedulerAction::Stop).await;
    Ok(())
}
