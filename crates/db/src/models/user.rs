use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use crate::postgrest::{PostgrestClient, StoreError};

/// Access level of a dashboard user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    Manager,
}

/// Tenant visibility derived from a user's role and company assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyScope {
    /// Privileged sessions see rows from every company.
    AllCompanies,
    /// Non-privileged sessions only see rows of one company.
    Company(Uuid),
}

impl CompanyScope {
    /// The tenant filter to apply, if any.
    pub fn company_id(&self) -> Option<Uuid> {
        match self {
            CompanyScope::AllCompanies => None,
            CompanyScope::Company(id) => Some(*id),
        }
    }
}

/// Profile row for an authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Derive the tenant scope used when querying work orders.
    ///
    /// Admins see everything; so does a manager that has no company
    /// assigned yet (the filter predicate only applies when both the role
    /// and the assignment say so).
    pub fn scope(&self) -> CompanyScope {
        match (self.role, self.company_id) {
            (UserRole::Manager, Some(company_id)) => CompanyScope::Company(company_id),
            _ => CompanyScope::AllCompanies,
        }
    }

    pub async fn find_by_id(
        client: &PostgrestClient,
        id: Uuid,
    ) -> Result<Option<UserProfile>, StoreError> {
        let rows: Vec<UserProfile> = client
            .from("users")
            .select("*")
            .eq("id", id)
            .limit(1)
            .fetch()
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn find_all(client: &PostgrestClient) -> Result<Vec<UserProfile>, StoreError> {
        client
            .from("users")
            .select("*")
            .order("created_at", true)
            .fetch()
            .await
    }

    /// Create the profile row for a freshly signed-up auth user.
    pub async fn insert(
        client: &PostgrestClient,
        id: Uuid,
        email: &str,
        role: UserRole,
        company_id: Option<Uuid>,
    ) -> Result<UserProfile, StoreError> {
        client
            .from("users")
            .insert_returning(&json!({
                "id": id,
                "email": email,
                "role": role,
                "company_id": company_id,
                "is_active": true,
            }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: UserRole, company_id: Option<Uuid>) -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            role,
            company_id,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn admins_see_all_companies() {
        let admin = profile(UserRole::Admin, Some(Uuid::new_v4()));
        assert_eq!(admin.scope(), CompanyScope::AllCompanies);
    }

    #[test]
    fn managers_are_scoped_to_their_company() {
        let company_id = Uuid::new_v4();
        let manager = profile(UserRole::Manager, Some(company_id));
        assert_eq!(manager.scope(), CompanyScope::Company(company_id));
        assert_eq!(manager.scope().company_id(), Some(company_id));
    }

    #[test]
    fn managers_without_a_company_are_unscoped() {
        let manager = profile(UserRole::Manager, None);
        assert_eq!(manager.scope(), CompanyScope::AllCompanies);
    }
}
