use crate::entities::media_objects;
use crate::models::{
    BackupItemDetail, BackupRequest, BackupResponse, BatchRunResult, MediaCategory,
};
use crate::services::media_repository::MediaRepository;
use crate::services::source_fetcher::SourceFetcher;
use crate::services::storage::StorageService;
use crate::utils::hash::{checksum, sanitize_key_segment};
use crate::utils::keyed_mutex::KeyedMutex;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Copies up to `limit` not-yet-backed-up objects of a category to the
/// backup provider.
///
/// Implementations must exclude `completed` objects from selection and must
/// leave every attempted object `completed` or `failed` when they return.
#[async_trait]
pub trait BackupOperation: Send + Sync {
    async fn backup_batch(&self, category: MediaCategory, limit: u32) -> Result<BatchRunResult>;
}

struct CopiedObject {
    backup_url: String,
    size: i64,
    checksum: String,
}

/// In-process backup: primary download, backup upload, size verification
/// and record update. Batches of one category never overlap, whichever
/// caller issues them.
pub struct StorageBackupOperation {
    repository: MediaRepository,
    fetcher: Arc<dyn SourceFetcher>,
    storage: Arc<dyn StorageService>,
    retry_cooldown: Duration,
    batch_locks: KeyedMutex<MediaCategory>,
}

impl StorageBackupOperation {
    pub fn new(
        repository: MediaRepository,
        fetcher: Arc<dyn SourceFetcher>,
        storage: Arc<dyn StorageService>,
        retry_cooldown: Duration,
    ) -> Self {
        Self {
            repository,
            fetcher,
            storage,
            retry_cooldown,
            batch_locks: KeyedMutex::new(),
        }
    }

    pub fn backup_key(category: MediaCategory, object: &media_objects::Model) -> String {
        let name = sanitize_key_segment(&object.file_name);
        let name = if name.is_empty() {
            sanitize_key_segment(&object.id)
        } else {
            name
        };
        format!(
            "{}/{}/{}",
            category.as_db(),
            sanitize_key_segment(&object.id),
            name
        )
    }

    async fn copy_object(
        &self,
        category: MediaCategory,
        object: &media_objects::Model,
    ) -> Result<CopiedObject> {
        let primary_url = object
            .primary_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("Media object {} has no primary URL", object.id))?;

        let fetched = self.fetcher.fetch(primary_url).await?;
        let size = fetched.data.len() as i64;
        let checksum = checksum(&fetched.data);
        let key = Self::backup_key(category, object);

        self.storage
            .upload_file(&key, fetched.data, fetched.content_type.as_deref())
            .await
            .map_err(|e| anyhow!("Upload to backup failed: {}", e))?;

        let stored = self
            .storage
            .get_object_metadata(&key)
            .await
            .map_err(|e| anyhow!("Backup verification failed: {}", e))?;

        if stored.size != size {
            if let Err(e) = self.storage.delete_file(&key).await {
                tracing::warn!("Failed to remove mismatched backup {}: {}", key, e);
            }
            return Err(anyhow!(
                "Backup size mismatch: expected {} bytes, stored {}",
                size,
                stored.size
            ));
        }

        Ok(CopiedObject {
            backup_url: self.storage.public_url(&key),
            size,
            checksum,
        })
    }

    async fn record_failure(&self, object: &media_objects::Model, error: &str) {
        if let Err(e) = self.repository.mark_failed(&object.id, error).await {
            tracing::error!(
                "Failed to record backup failure for {}: {}",
                object.id,
                e
            );
        }
    }
}

#[async_trait]
impl BackupOperation for StorageBackupOperation {
    async fn backup_batch(&self, category: MediaCategory, limit: u32) -> Result<BatchRunResult> {
        let _guard = self.batch_locks.lock(category).await;

        let now = Utc::now();
        let retry_before = now
            - chrono::Duration::from_std(self.retry_cooldown)
                .unwrap_or_else(|_| chrono::Duration::zero());

        let candidates = self
            .repository
            .select_eligible(category, limit as u64, retry_before)
            .await?;

        tracing::debug!(
            "Selected {} {} objects for backup (limit {})",
            candidates.len(),
            category,
            limit
        );

        let mut details = Vec::with_capacity(candidates.len());
        for object in candidates {
            match self
                .repository
                .claim(&object.id, retry_before, Utc::now())
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("Media object {} was claimed elsewhere, skipping", object.id);
                    continue;
                }
                Err(e) => {
                    // Left untouched, so it stays eligible for the next batch
                    tracing::warn!("Failed to claim {}: {}", object.id, e);
                    details.push(BackupItemDetail::failed(
                        &object.id,
                        &object.file_name,
                        format!("Claim failed: {}", e),
                    ));
                    continue;
                }
            }

            match self.copy_object(category, &object).await {
                Ok(copied) => {
                    let completed = self
                        .repository
                        .mark_completed(
                            &object.id,
                            &copied.backup_url,
                            copied.size,
                            &copied.checksum,
                            Utc::now(),
                        )
                        .await;

                    match completed {
                        Ok(()) => {
                            tracing::info!(
                                "Backed up {} ({} bytes) to {}",
                                object.id,
                                copied.size,
                                copied.backup_url
                            );
                            details.push(BackupItemDetail::succeeded(
                                &object.id,
                                &object.file_name,
                                copied.size,
                            ));
                        }
                        Err(e) => {
                            let message = e.to_string();
                            self.record_failure(&object, &message).await;
                            details.push(BackupItemDetail::failed(
                                &object.id,
                                &object.file_name,
                                message,
                            ));
                        }
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!("Backup of {} failed: {}", object.id, message);
                    self.record_failure(&object, &message).await;
                    details.push(BackupItemDetail::failed(
                        &object.id,
                        &object.file_name,
                        message,
                    ));
                }
            }
        }

        Ok(BatchRunResult::from_details(details))
    }
}

/// Invokes a backup endpoint over HTTP using the `BackupRequest` /
/// `BackupResponse` wire shape.
pub struct RemoteBackupOperation {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteBackupOperation {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build backup client: {}", e))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl BackupOperation for RemoteBackupOperation {
    async fn backup_batch(&self, category: MediaCategory, limit: u32) -> Result<BatchRunResult> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&BackupRequest { category, limit })
            .send()
            .await
            .map_err(|e| anyhow!("Backup endpoint unreachable: {}", e))?;

        let status = response.status();
        let body: BackupResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Malformed backup response (status {}): {}", status, e))?;

        if !status.is_success() && body.success {
            return Err(anyhow!("Backup endpoint returned status {}", status));
        }

        let reported = body.backed_up.checked_add(body.failed);
        if reported.is_none_or(|reported| reported > limit) {
            return Err(anyhow!(
                "Malformed backup response: {} backed up and {} failed for a limit of {}",
                body.backed_up,
                body.failed,
                limit
            ));
        }

        BatchRunResult::try_from(body)
    }
}
