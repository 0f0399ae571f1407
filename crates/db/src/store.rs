//! Capability boundary between the application and the remote row store.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::work_order::{Dataset, WorkOrder};
use crate::postgrest::{PostgrestClient, QueryBuilder, StoreError};

/// Filter applied identically to the count and every page of one dataset
/// fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowFilter {
    pub dataset: Dataset,
    /// Tenant scoping; `None` means the caller is privileged and sees all
    /// companies.
    pub company_id: Option<Uuid>,
    /// Inclusive bounds on the opening date.
    pub opened_between: Option<(NaiveDate, NaiveDate)>,
}

/// Read access to the work-order tables, plus the SQL escape hatch used by
/// the maintenance fixes.
///
/// Implemented by [`PostgrestClient`] for the hosted store and by in-memory
/// stores in tests.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Exact row count for the filter.
    async fn count_rows(&self, filter: &RowFilter) -> Result<u64, StoreError>;

    /// One page of rows ordered by opening timestamp descending.
    async fn fetch_page(
        &self,
        filter: &RowFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<WorkOrder>, StoreError>;

    /// Run a raw SQL statement through the store's RPC endpoint.
    async fn execute_sql(&self, sql: &str) -> Result<serde_json::Value, StoreError>;
}

impl PostgrestClient {
    fn filtered(&self, filter: &RowFilter) -> QueryBuilder {
        let mut query = self.from(filter.dataset.table()).select("*");
        if let Some(company_id) = filter.company_id {
            query = query.eq("company_id", company_id);
        }
        if let Some((start, end)) = filter.opened_between {
            query = query.gte("abertura", start).lte("abertura", end);
        }
        query
    }
}

#[async_trait]
impl TableStore for PostgrestClient {
    async fn count_rows(&self, filter: &RowFilter) -> Result<u64, StoreError> {
        self.filtered(filter).count().await
    }

    async fn fetch_page(
        &self,
        filter: &RowFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<WorkOrder>, StoreError> {
        self.filtered(filter)
            .order("abertura", true)
            .range(offset, offset + limit - 1)
            .fetch()
            .await
    }

    async fn execute_sql(&self, sql: &str) -> Result<serde_json::Value, StoreError> {
        self.rpc("exec_sql", serde_json::json!({ "query": sql })).await
    }
}
