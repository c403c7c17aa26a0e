use crate::config::BackupConfig;
use crate::models::MediaCategory;
use crate::services::backup_driver::CategoryLocks;
use crate::services::backup_operation::BackupOperation;
use crate::services::backup_runner::run_categories;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;

/// Periodically drains the backup backlog of every configured category.
pub struct BackupWorker {
    operation: Arc<dyn BackupOperation>,
    config: BackupConfig,
    categories: Vec<MediaCategory>,
    locks: CategoryLocks,
    shutdown: watch::Receiver<bool>,
}

impl BackupWorker {
    pub fn new(
        operation: Arc<dyn BackupOperation>,
        config: BackupConfig,
        categories: Vec<MediaCategory>,
        locks: CategoryLocks,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            operation,
            config,
            categories,
            locks,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Backup worker started (every {:?})",
            self.config.schedule_interval
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            self.perform_backup().await;

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = sleep(self.config.schedule_interval) => {}
            }
        }

        tracing::info!("🛑 Backup worker shutting down");
    }

    async fn perform_backup(&self) {
        tracing::info!("🗄️  Running scheduled backup...");
        let summaries = run_categories(
            self.operation.clone(),
            &self.config,
            &self.categories,
            &self.locks,
            Some(self.shutdown.clone()),
        )
        .await;

        let backed_up: u64 = summaries.iter().map(|s| s.total_backed_up).sum();
        let failed: u64 = summaries.iter().map(|s| s.total_failed).sum();
        tracing::info!(
            "✅ Scheduled backup completed: {} backed up, {} failed",
            backed_up,
            failed
        );
    }
}
