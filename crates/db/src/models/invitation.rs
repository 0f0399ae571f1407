use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::user::UserRole;
use crate::postgrest::{PostgrestClient, StoreError};

/// Lifecycle of an invitation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InviteStatus {
    #[default]
    Pending,
    Accepted,
    Expired,
}

/// An outstanding or settled invitation to join the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UserInvitation {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
    pub invited_by: Option<Uuid>,
    pub token: String,
    pub status: InviteStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Request body for issuing an invitation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateInvitation {
    pub email: String,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
}

impl UserInvitation {
    pub async fn insert(
        client: &PostgrestClient,
        data: &CreateInvitation,
        token: &str,
        invited_by: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<UserInvitation, StoreError> {
        client
            .from("user_invitations")
            .insert_returning(&json!({
                "email": data.email,
                "role": data.role,
                "company_id": data.company_id,
                "invited_by": invited_by,
                "token": token,
                "status": InviteStatus::Pending,
                "expires_at": expires_at,
            }))
            .await
    }

    pub async fn find_by_token(
        client: &PostgrestClient,
        token: &str,
    ) -> Result<Option<UserInvitation>, StoreError> {
        let rows: Vec<UserInvitation> = client
            .from("user_invitations")
            .select("*")
            .eq("token", token)
            .limit(1)
            .fetch()
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn mark_accepted(client: &PostgrestClient, id: Uuid) -> Result<(), StoreError> {
        client
            .from("user_invitations")
            .eq("id", id)
            .update(&json!({
                "status": InviteStatus::Accepted,
                "accepted_at": Utc::now(),
            }))
            .await
    }

    /// Mark every pending invitation past its deadline as expired.
    /// Returns the number of rows transitioned.
    pub async fn expire_stale(client: &PostgrestClient) -> Result<usize, StoreError> {
        let rows: Vec<serde_json::Value> = client
            .from("user_invitations")
            .eq("status", InviteStatus::Pending)
            .lt("expires_at", Utc::now().to_rfc3339())
            .update_returning(&json!({ "status": InviteStatus::Expired }))
            .await?;
        Ok(rows.len())
    }
}
