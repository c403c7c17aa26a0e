use crate::config::CategoryPolicy;
use crate::models::{
    BackupItemDetail, BatchRunResult, MediaCategory, RunSummary, StopReason, format_bytes,
};
use crate::services::backup_operation::BackupOperation;
use crate::utils::keyed_mutex::KeyedMutex;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;

/// Running totals of one driver run. Dropped when the run ends.
#[derive(Debug, Default)]
struct RunAccumulator {
    total_backed_up: u64,
    total_failed: u64,
    consecutive_empty: u32,
    batches_executed: u32,
    bytes_transferred: u64,
    failed_items: Vec<BackupItemDetail>,
}

impl RunAccumulator {
    fn record(&mut self, result: BatchRunResult) {
        self.total_backed_up += result.succeeded as u64;
        self.total_failed += result.failed as u64;

        if result.is_empty() {
            self.consecutive_empty += 1;
        } else {
            self.consecutive_empty = 0;
        }

        for detail in result.details {
            if detail.success {
                self.bytes_transferred += detail.actual_file_size.unwrap_or(0).max(0) as u64;
            } else {
                self.failed_items.push(detail);
            }
        }
    }

    /// The per-item outcome is unknown, so the whole batch counts as failed.
    fn record_invocation_failure(&mut self, batch_index: u32, batch_size: u32, error: String) {
        self.total_failed += batch_size as u64;
        self.consecutive_empty += 1;
        self.failed_items.push(BackupItemDetail {
            id: None,
            file_name: format!("batch {}", batch_index + 1),
            success: false,
            error: Some(error),
            actual_file_size: None,
        });
    }
}

/// One lock per category. Whoever holds it is the only one issuing batches
/// for that category.
pub type CategoryLocks = KeyedMutex<MediaCategory>;

/// Drives repeated BackupOperation calls for one category until its backlog
/// is exhausted, the batch bound is hit, or the run is cancelled.
///
/// Batches run strictly one after another; each completes before the next
/// starts. Cancellation is observed at batch boundaries and during the
/// inter-batch pause.
pub struct BatchBackupDriver {
    operation: Arc<dyn BackupOperation>,
    category: MediaCategory,
    policy: CategoryPolicy,
    shutdown: Option<watch::Receiver<bool>>,
    locks: Option<CategoryLocks>,
}

impl BatchBackupDriver {
    pub fn new(
        operation: Arc<dyn BackupOperation>,
        category: MediaCategory,
        policy: CategoryPolicy,
    ) -> Self {
        Self {
            operation,
            category,
            policy,
            shutdown: None,
            locks: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Holds the category lock for the whole run, so runs of the same
    /// category sharing these locks take turns.
    pub fn with_locks(mut self, locks: CategoryLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Runs to termination. Never fails; every outcome ends in a summary.
    pub async fn run(&self) -> RunSummary {
        let _guard = match &self.locks {
            Some(locks) => {
                tracing::debug!("Waiting for the {} backup lock", self.category);
                Some(locks.lock(self.category).await)
            }
            None => None,
        };

        let started_at = Utc::now();
        let mut shutdown = self.shutdown.clone();
        let mut acc = RunAccumulator::default();
        let mut stop_reason = StopReason::MaxBatchesReached;

        tracing::info!(
            "🚀 Starting {} backup run: batch size {}, max {} batches, delay {:?}",
            self.category,
            self.policy.batch_size,
            self.policy.max_batches,
            self.policy.inter_batch_delay
        );

        for batch_index in 0..self.policy.max_batches {
            if is_cancelled(&shutdown) {
                stop_reason = StopReason::Cancelled;
                break;
            }

            acc.batches_executed += 1;
            match self
                .operation
                .backup_batch(self.category, self.policy.batch_size)
                .await
            {
                Ok(result) => {
                    tracing::info!(
                        "📦 [{}] batch {}: {} backed up, {} failed",
                        self.category,
                        batch_index + 1,
                        result.succeeded,
                        result.failed
                    );
                    acc.record(result);
                }
                Err(e) => {
                    tracing::error!(
                        "❌ [{}] batch {} invocation failed, counting {} as failed: {}",
                        self.category,
                        batch_index + 1,
                        self.policy.batch_size,
                        e
                    );
                    acc.record_invocation_failure(
                        batch_index,
                        self.policy.batch_size,
                        e.to_string(),
                    );
                }
            }

            if acc.consecutive_empty >= self.policy.consecutive_empty_threshold {
                tracing::info!(
                    "[{}] {} consecutive empty batches, backlog exhausted",
                    self.category,
                    acc.consecutive_empty
                );
                stop_reason = StopReason::BacklogExhausted;
                break;
            }

            if batch_index + 1 < self.policy.max_batches && !self.pause(&mut shutdown).await {
                stop_reason = StopReason::Cancelled;
                break;
            }
        }

        let summary = self.summarize(acc, stop_reason, started_at);
        tracing::info!(
            "✅ {} backup run finished ({:?}) after {} batches: {} backed up, {} failed. {}",
            self.category,
            summary.stop_reason,
            summary.batches_executed,
            summary.total_backed_up,
            summary.total_failed,
            summary.capacity
        );
        for item in &summary.failed_items {
            tracing::warn!(
                "[{}] failed: {} ({})",
                self.category,
                item.file_name,
                item.error.as_deref().unwrap_or("unknown error")
            );
        }
        summary
    }

    /// Waits out the inter-batch delay. Returns false if cancelled meanwhile.
    async fn pause(&self, shutdown: &mut Option<watch::Receiver<bool>>) -> bool {
        let delay = self.policy.inter_batch_delay;
        if is_cancelled(shutdown) {
            return false;
        }
        if delay.is_zero() {
            return true;
        }

        let Some(rx) = shutdown.as_mut() else {
            sleep(delay).await;
            return true;
        };

        let timer = sleep(delay);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer => return true,
                changed = rx.changed() => match changed {
                    Ok(()) if *rx.borrow() => return false,
                    Ok(()) => continue,
                    Err(_) => {
                        // Sender gone; nobody can cancel any more.
                        (&mut timer).await;
                        return true;
                    }
                },
            }
        }
    }

    fn summarize(
        &self,
        acc: RunAccumulator,
        stop_reason: StopReason,
        started_at: chrono::DateTime<Utc>,
    ) -> RunSummary {
        let estimated_bytes = acc
            .total_backed_up
            .saturating_mul(self.policy.average_object_bytes);
        let capacity = format!(
            "{} {} objects backed up, {} transferred (~{} estimated at {} per object)",
            acc.total_backed_up,
            self.category,
            format_bytes(acc.bytes_transferred),
            format_bytes(estimated_bytes),
            format_bytes(self.policy.average_object_bytes)
        );

        RunSummary {
            category: self.category,
            total_backed_up: acc.total_backed_up,
            total_failed: acc.total_failed,
            batches_executed: acc.batches_executed,
            stop_reason,
            failed_items: acc.failed_items,
            bytes_transferred: acc.bytes_transferred,
            estimated_bytes,
            capacity,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

fn is_cancelled(shutdown: &Option<watch::Receiver<bool>>) -> bool {
    shutdown.as_ref().is_some_and(|rx| *rx.borrow())
}
