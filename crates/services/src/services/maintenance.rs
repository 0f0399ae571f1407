//! One-shot data fixes for the remote work-order tables.
//!
//! The timestamp columns historically received empty strings instead of
//! NULL from upstream imports; these fixes null them out through the
//! store's SQL RPC. Statements run independently: a failure is logged and
//! counted, the remaining statements still run.

use std::sync::Arc;

use db::models::work_order::Dataset;
use db::postgrest::StoreError;
use db::store::TableStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

/// Timestamp columns that have historically received empty strings.
const TIMESTAMP_COLUMNS: [&str; 7] = [
    "abertura",
    "fechamento",
    "parada",
    "funcionamento",
    "data_chamado",
    "data_atendimento",
    "data_solucao",
];

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("malformed check response: {0}")]
    MalformedCheck(String),
}

/// Outcome of a fix run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FixSummary {
    pub applied: usize,
    pub failed: usize,
}

/// Empty-string counts for the two columns the dashboard reads most.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EmptyTimestampReport {
    pub total_rows: u64,
    pub empty_abertura: u64,
    pub empty_fechamento: u64,
}

/// Nulls out empty-string timestamp values in the work-order tables.
pub struct TimestampFixService {
    store: Arc<dyn TableStore>,
}

impl TimestampFixService {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    /// Report how many rows of a table still carry empty-string timestamps.
    pub async fn check(&self, dataset: Dataset) -> Result<EmptyTimestampReport, MaintenanceError> {
        let sql = format!(
            "SELECT COUNT(*) AS total_rows, \
             COUNT(*) FILTER (WHERE abertura::text = '') AS empty_abertura, \
             COUNT(*) FILTER (WHERE fechamento::text = '') AS empty_fechamento \
             FROM {}",
            dataset.table()
        );
        let value = self.store.execute_sql(&sql).await?;
        let row = value
            .as_array()
            .and_then(|rows| rows.first())
            .cloned()
            .ok_or_else(|| MaintenanceError::MalformedCheck(value.to_string()))?;
        serde_json::from_value(row).map_err(|e| MaintenanceError::MalformedCheck(e.to_string()))
    }

    /// Null out empty-string values in every known timestamp column of both
    /// tables.
    pub async fn fix_all(&self) -> FixSummary {
        let mut summary = FixSummary::default();
        for dataset in Dataset::ALL {
            for column in TIMESTAMP_COLUMNS {
                let sql = format!(
                    "UPDATE {table} SET {column} = NULL WHERE {column}::text = ''",
                    table = dataset.table(),
                );
                match self.store.execute_sql(&sql).await {
                    Ok(_) => {
                        info!(table = dataset.table(), column, "nulled empty-string values");
                        summary.applied += 1;
                    }
                    Err(e) => {
                        error!(
                            table = dataset.table(),
                            column,
                            error = %e,
                            "fix statement failed"
                        );
                        summary.failed += 1;
                    }
                }
            }
        }
        summary
    }
}
