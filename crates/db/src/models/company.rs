use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::postgrest::{PostgrestClient, StoreError};

/// A hospital company; the tenant boundary for row visibility.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    pub async fn find_all_active(client: &PostgrestClient) -> Result<Vec<Company>, StoreError> {
        client
            .from("companies")
            .select("*")
            .eq("is_active", true)
            .order("name", false)
            .fetch()
            .await
    }

    pub async fn find_by_id(
        client: &PostgrestClient,
        id: Uuid,
    ) -> Result<Option<Company>, StoreError> {
        let rows: Vec<Company> = client
            .from("companies")
            .select("*")
            .eq("id", id)
            .limit(1)
            .fetch()
            .await?;
        Ok(rows.into_iter().next())
    }
}
