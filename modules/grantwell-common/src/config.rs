use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Headless browser pool sidecar
    pub browserpool_url: String,
    pub browserpool_token: Option<String>,

    // Grants portal being harvested
    pub portal_base_url: String,
    pub portal_username: Option<String>,
    pub portal_password: Option<String>,

    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Start the daily scheduler with the API server
    pub scheduler_autostart: bool,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            browserpool_url: env::var("BROWSERPOOL_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            browserpool_token: env::var("BROWSERPOOL_TOKEN").ok(),
            portal_base_url: env::var("PORTAL_BASE_URL")
                .unwrap_or_else(|_| "https://www.grantsphere.com".to_string()),
            portal_username: env::var("PORTAL_USERNAME").ok(),
            portal_password: env::var("PORTAL_PASSWORD").ok(),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("API_PORT must be a number"),
            scheduler_autostart: env::var("SCHEDULER_AUTOSTART")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            browserpool_url = self.browserpool_url.as_str(),
            browserpool_token = mask(self.browserpool_token.as_deref()),
            portal_base_url = self.portal_base_url.as_str(),
            portal_username = mask(self.portal_username.as_deref()),
            api_host = self.api_host.as_str(),
            api_port = self.api_port,
            scheduler_autostart = self.scheduler_autostart,
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn mask(value: Option<&str>) -> &'static str {
    match value {
        Some(_) => "set",
        None => "unset",
    }
}
