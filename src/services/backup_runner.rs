use crate::config::BackupConfig;
use crate::models::{MediaCategory, RunSummary};
use crate::services::backup_driver::{BatchBackupDriver, CategoryLocks};
use crate::services::backup_operation::BackupOperation;
use std::sync::Arc;
use tokio::sync::watch;

/// Runs one driver per category concurrently and returns their summaries in
/// the order the categories were given. Categories select disjoint objects,
/// so their runs never compete for the same record; runs of one category
/// started elsewhere with the same `locks` are waited for.
pub async fn run_categories(
    operation: Arc<dyn BackupOperation>,
    config: &BackupConfig,
    categories: &[MediaCategory],
    locks: &CategoryLocks,
    shutdown: Option<watch::Receiver<bool>>,
) -> Vec<RunSummary> {
    let mut handles = Vec::with_capacity(categories.len());
    for &category in categories {
        let mut driver =
            BatchBackupDriver::new(operation.clone(), category, config.policy(category).clone())
                .with_locks(locks.clone());
        if let Some(rx) = shutdown.clone() {
            driver = driver.with_shutdown(rx);
        }
        handles.push((category, tokio::spawn(async move { driver.run().await })));
    }

    let mut summaries = Vec::with_capacity(handles.len());
    for (category, handle) in handles {
        match handle.await {
            Ok(summary) => summaries.push(summary),
            Err(e) => tracing::error!("{} backup run aborted: {}", category, e),
        }
    }
    summaries
}
