//! User invitation issuing, acceptance, and expiry sweeping.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::invitation::{CreateInvitation, InviteStatus, UserInvitation};
use db::models::user::{UserProfile, UserRole};
use db::postgrest::{PostgrestClient, StoreError};
use reqwest::Client;
use thiserror::Error;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Invitations lapse a week after being issued.
pub const INVITE_TTL_DAYS: i64 = 7;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invitation not found")]
    NotFound,
    #[error("invitation expired")]
    Expired,
    #[error("invitation already {0}")]
    AlreadySettled(InviteStatus),
    #[error("mail error: {0}")]
    Mail(String),
}

/// Capability for delivering invitation emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invitation(
        &self,
        email: &str,
        role: UserRole,
        invite_url: &str,
    ) -> Result<(), String>;
}

/// Mailer backed by the hosted email provider.
///
/// Without an API key the send is logged instead of delivered, which keeps
/// local development working.
pub struct ResendMailer {
    http: Client,
    api_key: Option<String>,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: Option<String>, from: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send_invitation(
        &self,
        email: &str,
        role: UserRole,
        invite_url: &str,
    ) -> Result<(), String> {
        let Some(api_key) = &self.api_key else {
            info!(email, %invite_url, "email provider key not set, simulating invitation send");
            return Ok(());
        };

        let html = invitation_email_html(role, invite_url);
        let response = self
            .http
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": email,
                "subject": "You have been invited to the infrastructure dashboard",
                "html": html,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("provider returned {status}: {body}"));
        }
        Ok(())
    }
}

/// Issues and settles invitations for new dashboard users.
pub struct InvitationService {
    store: PostgrestClient,
    mailer: Arc<dyn Mailer>,
    app_base_url: String,
}

impl InvitationService {
    pub fn new(store: PostgrestClient, mailer: Arc<dyn Mailer>, app_base_url: String) -> Self {
        Self {
            store,
            mailer,
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create an invitation and email its completion link.
    pub async fn invite(
        &self,
        data: &CreateInvitation,
        invited_by: Uuid,
    ) -> Result<UserInvitation, InvitationError> {
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + chrono::Duration::days(INVITE_TTL_DAYS);
        let invitation =
            UserInvitation::insert(&self.store, data, &token, invited_by, expires_at).await?;

        let url = invite_url(&self.app_base_url, &token);
        self.mailer
            .send_invitation(&data.email, data.role, &url)
            .await
            .map_err(InvitationError::Mail)?;

        info!(email = %data.email, role = %data.role, "invitation sent");
        Ok(invitation)
    }

    /// Settle an invitation: the invitee has completed sign-up with the auth
    /// provider and `user_id` is their new auth identity.
    pub async fn accept(&self, token: &str, user_id: Uuid) -> Result<UserProfile, InvitationError> {
        let invitation = UserInvitation::find_by_token(&self.store, token)
            .await?
            .ok_or(InvitationError::NotFound)?;
        validate_pending(&invitation, Utc::now())?;

        UserInvitation::mark_accepted(&self.store, invitation.id).await?;
        let profile = UserProfile::insert(
            &self.store,
            user_id,
            &invitation.email,
            invitation.role,
            invitation.company_id,
        )
        .await?;

        info!(email = %profile.email, "invitation accepted");
        Ok(profile)
    }

    /// Spawn the background sweep that marks lapsed invitations as expired.
    pub fn spawn_expiry_sweeper(store: PostgrestClient) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("starting invitation expiry sweeper with interval {SWEEP_INTERVAL:?}");
            let mut interval = interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                match UserInvitation::expire_stale(&store).await {
                    Ok(0) => {}
                    Ok(expired) => info!(expired, "marked stale invitations as expired"),
                    Err(e) => error!("invitation expiry sweep failed: {e}"),
                }
            }
        })
    }
}

/// An invitation can only be accepted while pending and before its deadline.
fn validate_pending(
    invitation: &UserInvitation,
    now: DateTime<Utc>,
) -> Result<(), InvitationError> {
    match invitation.status {
        InviteStatus::Pending => {}
        settled => return Err(InvitationError::AlreadySettled(settled)),
    }
    if invitation.expires_at < now {
        warn!(email = %invitation.email, "attempt to accept an expired invitation");
        return Err(InvitationError::Expired);
    }
    Ok(())
}

fn invite_url(app_base_url: &str, token: &str) -> String {
    format!("{app_base_url}/auth/complete-invitation?token={token}")
}

fn invitation_email_html(role: UserRole, invite_url: &str) -> String {
    let role_label = match role {
        UserRole::Admin => "Administrator",
        UserRole::Manager => "Manager",
    };
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Infrastructure dashboard invitation</h2>
  <p>You have been invited to the hospital infrastructure dashboard
     with the <strong>{role_label}</strong> profile.</p>
  <p><a href="{invite_url}">Complete your registration</a></p>
  <p>This invitation expires in {INVITE_TTL_DAYS} days.</p>
  <p style="color: #666; font-size: 12px;">This is an automated message, do not reply.</p>
</div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation(status: InviteStatus, expires_at: DateTime<Utc>) -> UserInvitation {
        UserInvitation {
            id: Uuid::new_v4(),
            email: "new.user@example.com".to_string(),
            role: UserRole::Manager,
            company_id: None,
            invited_by: Some(Uuid::new_v4()),
            token: "token".to_string(),
            status,
            expires_at,
            created_at: Utc::now(),
            accepted_at: None,
        }
    }

    #[test]
    fn pending_unexpired_invitation_is_acceptable() {
        let invitation = invitation(InviteStatus::Pending, Utc::now() + chrono::Duration::days(1));
        assert!(validate_pending(&invitation, Utc::now()).is_ok());
    }

    #[test]
    fn expired_invitation_is_rejected() {
        let invitation =
            invitation(InviteStatus::Pending, Utc::now() - chrono::Duration::hours(1));
        assert!(matches!(
            validate_pending(&invitation, Utc::now()),
            Err(InvitationError::Expired)
        ));
    }

    #[test]
    fn settled_invitation_is_rejected() {
        let invitation = invitation(InviteStatus::Accepted, Utc::now() + chrono::Duration::days(1));
        assert!(matches!(
            validate_pending(&invitation, Utc::now()),
            Err(InvitationError::AlreadySettled(InviteStatus::Accepted))
        ));
    }

    #[test]
    fn invite_links_point_at_the_completion_page() {
        assert_eq!(
            invite_url("https://dashboard.example.com", "abc123"),
            "https://dashboard.example.com/auth/complete-invitation?token=abc123"
        );
    }
}
