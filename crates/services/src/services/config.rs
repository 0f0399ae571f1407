//! Environment-driven configuration shared by the workspace binaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted row store (also serves the auth endpoint).
    pub store_url: String,
    /// Service-role key; bypasses row-level security, server side only.
    pub store_service_key: String,
    /// Public URL of the dashboard, used to build invitation links.
    pub app_base_url: String,
    /// Email provider key; when absent, invitation sends are simulated.
    pub resend_api_key: Option<String>,
    /// Sender address for invitation emails.
    pub from_email: String,
    /// Listen address of the API server.
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            store_url: require("SUPABASE_URL")?,
            store_service_key: require("SUPABASE_SERVICE_ROLE_KEY")?,
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            from_email: std::env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@resend.dev".to_string()),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string()),
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}
