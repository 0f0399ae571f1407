//! One-shot maintenance runner that nulls out empty-string timestamp values
//! in the remote work-order tables.

use std::sync::Arc;

use db::models::work_order::Dataset;
use db::postgrest::PostgrestClient;
use services::services::maintenance::TimestampFixService;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::logging::init();
    dotenvy::dotenv().ok();

    let store = PostgrestClient::from_env()?;
    let service = TimestampFixService::new(Arc::new(store));

    for dataset in Dataset::ALL {
        match service.check(dataset).await {
            Ok(report) => info!(
                table = dataset.table(),
                total_rows = report.total_rows,
                empty_abertura = report.empty_abertura,
                empty_fechamento = report.empty_fechamento,
                "current state"
            ),
            Err(e) => warn!(
                table = dataset.table(),
                error = %e,
                "state check failed, applying fixes anyway"
            ),
        }
    }

    let summary = service.fix_all().await;
    info!(
        applied = summary.applied,
        failed = summary.failed,
        "timestamp fix complete"
    );

    if summary.failed > 0 {
        anyhow::bail!("{} fix statements failed", summary.failed);
    }
    Ok(())
}
