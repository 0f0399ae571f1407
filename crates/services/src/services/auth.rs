//! Resolution of bearer tokens to user profiles and tenant scope.

use std::time::Duration;

use dashmap::DashMap;
use db::models::user::UserProfile;
use db::postgrest::{PostgrestClient, StoreError};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::config::Config;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("no profile for authenticated user")]
    UnknownUser,
    #[error("user is deactivated")]
    Inactive,
}

/// Identity payload returned by the auth provider.
#[derive(Debug, Clone, Deserialize)]
struct AuthUser {
    id: Uuid,
}

/// Verifies bearer tokens against the hosted auth endpoint and loads the
/// matching profile row.
///
/// Resolved profiles are memoized per token; entries are evicted on
/// sign-out, so a role change takes effect on the next login.
pub struct AuthService {
    http: Client,
    base_url: String,
    api_key: String,
    store: PostgrestClient,
    profiles: DashMap<String, UserProfile>,
}

impl AuthService {
    pub fn new(config: &Config, store: PostgrestClient) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(AUTH_TIMEOUT)
            .user_agent(concat!("infra360/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.store_url.trim_end_matches('/').to_string(),
            api_key: config.store_service_key.clone(),
            store,
            profiles: DashMap::new(),
        })
    }

    /// Resolve a bearer token to an active user profile.
    pub async fn resolve(&self, token: &str) -> Result<UserProfile, AuthError> {
        if let Some(cached) = self.profiles.get(token) {
            return Ok(cached.clone());
        }

        let user = self.verify_token(token).await?;
        let profile = UserProfile::find_by_id(&self.store, user.id)
            .await?
            .ok_or(AuthError::UnknownUser)?;
        if !profile.is_active {
            return Err(AuthError::Inactive);
        }

        debug!(user_id = %profile.id, role = %profile.role, "token resolved");
        self.profiles.insert(token.to_string(), profile.clone());
        Ok(profile)
    }

    /// Drop the memoized profile for a token (sign-out).
    pub fn forget(&self, token: &str) {
        self.profiles.remove(token);
    }

    async fn verify_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match response.status() {
            s if s.is_success() => response
                .json::<AuthUser>()
                .await
                .map_err(|e| AuthError::Store(StoreError::Serde(e.to_string()))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidToken),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(AuthError::Store(StoreError::Http {
                    status: s.as_u16(),
                    body,
                }))
            }
        }
    }
}
