pub mod error;
pub mod routes;

use std::sync::Arc;

use dashmap::DashMap;
use db::models::user::UserProfile;
use db::postgrest::PostgrestClient;
use db::store::TableStore;
use services::services::auth::AuthService;
use services::services::config::Config;
use services::services::data_cache::DataCache;
use services::services::invitation::{InvitationService, ResendMailer};
use uuid::Uuid;

/// Per-user dataset caches, created on first use and dropped on sign-out.
pub struct SessionCaches {
    store: Arc<dyn TableStore>,
    caches: DashMap<Uuid, Arc<DataCache>>,
}

impl SessionCaches {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            caches: DashMap::new(),
        }
    }

    /// The cache of this user's session, scoped to their tenant visibility.
    pub fn cache_for(&self, profile: &UserProfile) -> Arc<DataCache> {
        self.caches
            .entry(profile.id)
            .or_insert_with(|| Arc::new(DataCache::new(self.store.clone(), profile.scope())))
            .value()
            .clone()
    }

    pub fn drop_session(&self, user_id: Uuid) {
        self.caches.remove(&user_id);
    }
}

/// Shared state of the API server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: PostgrestClient,
    pub auth: Arc<AuthService>,
    pub invitations: Arc<InvitationService>,
    pub sessions: Arc<SessionCaches>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = PostgrestClient::new(&config.store_url, &config.store_service_key)?;
        let auth = Arc::new(AuthService::new(&config, store.clone())?);
        let mailer = Arc::new(ResendMailer::new(
            config.resend_api_key.clone(),
            config.from_email.clone(),
        ));
        let invitations = Arc::new(InvitationService::new(
            store.clone(),
            mailer,
            config.app_base_url.clone(),
        ));
        let sessions = Arc::new(SessionCaches::new(Arc::new(store.clone())));

        Ok(Self {
            config: Arc::new(config),
            store,
            auth,
            invitations,
            sessions,
        })
    }
}
