mod common;

use common::*;
use media_backup::config::CategoryPolicy;
use media_backup::models::{BackupStatus, MediaCategory, StopReason};
use media_backup::services::backup_driver::BatchBackupDriver;
use media_backup::services::backup_operation::{BackupOperation, StorageBackupOperation};
use media_backup::services::media_repository::MediaRepository;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

fn operation(
    db: &DatabaseConnection,
    fetcher: &Arc<MockFetcher>,
    storage: &Arc<MockStorageService>,
    retry_cooldown: Duration,
) -> StorageBackupOperation {
    StorageBackupOperation::new(
        MediaRepository::new(db.clone()),
        fetcher.clone(),
        storage.clone(),
        retry_cooldown,
    )
}

async fn status_of(db: &DatabaseConnection, id: &str) -> BackupStatus {
    let media = MediaRepository::new(db.clone())
        .find_by_id(id)
        .await
        .unwrap()
        .unwrap();
    BackupStatus::from_db(media.backup_status.as_deref())
}

#[tokio::test]
async fn test_copies_eligible_objects_and_marks_completed() {
    init_tracing();
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());

    fetcher.serve(&primary_url("img-1"), b"first image");
    fetcher.serve(&primary_url("img-2"), b"second");
    insert_media(&db, "img-1", "image", Some(&primary_url("img-1")), None, 1).await;
    insert_media(&db, "img-2", "image", Some(&primary_url("img-2")), Some("none"), 2).await;
    insert_media(&db, "img-done", "image", Some(&primary_url("img-done")), Some("completed"), 0).await;
    insert_media(&db, "img-no-primary", "image", None, None, 0).await;

    let result = operation(&db, &fetcher, &storage, HOUR)
        .backup_batch(MediaCategory::Image, 10)
        .await
        .unwrap();

    assert_eq!(result.attempted, 2);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed, 0);
    assert_eq!(result.details[0].file_name, "img-1.bin");
    assert_eq!(result.details[0].actual_file_size, Some(11));

    let repo = MediaRepository::new(db.clone());
    let media = repo.find_by_id("img-1").await.unwrap().unwrap();
    assert_eq!(media.backup_status.as_deref(), Some("completed"));
    assert_eq!(
        media.backup_url.as_deref(),
        Some("https://backup.test/image/img-1/img-1.bin")
    );
    assert_eq!(media.file_size, Some(11));
    assert_eq!(
        media.backup_checksum.as_deref(),
        Some(media_backup::utils::hash::checksum(b"first image").as_str())
    );
    assert!(media.backed_up_at.is_some());
    assert!(storage.contains("image/img-1/img-1.bin"));

    // untouched: already completed, and nothing to copy
    assert_eq!(status_of(&db, "img-done").await, BackupStatus::Completed);
    assert_eq!(status_of(&db, "img-no-primary").await, BackupStatus::None);
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_limit_takes_oldest_first() {
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());

    for rank in 0..6 {
        let id = format!("img-{}", rank);
        fetcher.serve(&primary_url(&id), b"payload");
        // inserted newest first
        insert_media(&db, &id, "image", Some(&primary_url(&id)), None, 10 - rank).await;
    }

    let result = operation(&db, &fetcher, &storage, HOUR)
        .backup_batch(MediaCategory::Image, 3)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 3);
    let ids: Vec<_> = result.details.iter().filter_map(|d| d.id.clone()).collect();
    assert_eq!(ids, vec!["img-5", "img-4", "img-3"]);
}

#[tokio::test]
async fn test_copy_failure_marks_failed_and_waits_for_cooldown() {
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());

    insert_media(&db, "vid-1", "video", Some(&primary_url("vid-1")), None, 0).await;

    let op = operation(&db, &fetcher, &storage, HOUR);
    let result = op.backup_batch(MediaCategory::Video, 5).await.unwrap();

    assert_eq!(result.succeeded, 0);
    assert_eq!(result.failed, 1);
    assert!(result.details[0].error.as_deref().unwrap().contains("404"));

    let media = MediaRepository::new(db.clone())
        .find_by_id("vid-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(media.backup_status.as_deref(), Some("failed"));
    assert!(media.backup_url.is_none());
    assert!(media.backup_error.unwrap().contains("404"));

    // Still cooling down: not selected again within the hour
    let again = op.backup_batch(MediaCategory::Video, 5).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_failed_object_is_retried_after_cooldown() {
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());

    insert_media(&db, "up-1", "upscaled_video", Some(&primary_url("up-1")), None, 0).await;

    storage.fail_uploads.store(true, Ordering::SeqCst);
    let op = operation(&db, &fetcher, &storage, Duration::ZERO);
    fetcher.serve(&primary_url("up-1"), b"huge video");

    let first = op.backup_batch(MediaCategory::UpscaledVideo, 2).await.unwrap();
    assert_eq!(first.failed, 1);
    assert!(first.details[0].error.as_deref().unwrap().contains("rate limit"));
    assert_eq!(status_of(&db, "up-1").await, BackupStatus::Failed);

    storage.fail_uploads.store(false, Ordering::SeqCst);
    let second = op.backup_batch(MediaCategory::UpscaledVideo, 2).await.unwrap();
    assert_eq!(second.succeeded, 1);
    assert_eq!(status_of(&db, "up-1").await, BackupStatus::Completed);

    let third = op.backup_batch(MediaCategory::UpscaledVideo, 2).await.unwrap();
    assert!(third.is_empty());
}

#[tokio::test]
async fn test_size_mismatch_fails_and_removes_copy() {
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());
    storage.truncate_uploads.store(true, Ordering::SeqCst);

    fetcher.serve(&primary_url("img-1"), b"abcdef");
    insert_media(&db, "img-1", "image", Some(&primary_url("img-1")), None, 0).await;

    let result = operation(&db, &fetcher, &storage, HOUR)
        .backup_batch(MediaCategory::Image, 10)
        .await
        .unwrap();

    assert_eq!(result.failed, 1);
    assert!(result.details[0].error.as_deref().unwrap().contains("size mismatch"));
    assert_eq!(status_of(&db, "img-1").await, BackupStatus::Failed);
    assert!(!storage.contains("image/img-1/img-1.bin"));
}

#[tokio::test]
async fn test_categories_select_disjoint_objects() {
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());

    fetcher.serve(&primary_url("img-1"), b"image");
    fetcher.serve(&primary_url("vid-1"), b"video");
    insert_media(&db, "img-1", "image", Some(&primary_url("img-1")), None, 0).await;
    insert_media(&db, "vid-1", "video", Some(&primary_url("vid-1")), None, 0).await;

    let result = operation(&db, &fetcher, &storage, HOUR)
        .backup_batch(MediaCategory::Video, 5)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 1);
    assert_eq!(result.details[0].id.as_deref(), Some("vid-1"));
    assert_eq!(status_of(&db, "img-1").await, BackupStatus::None);
}

#[tokio::test]
async fn test_driver_drains_backlog_and_second_run_is_idle() {
    init_tracing();
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());

    for rank in 0..25 {
        let id = format!("img-{:02}", rank);
        fetcher.serve(&primary_url(&id), b"png bytes");
        insert_media(&db, &id, "image", Some(&primary_url(&id)), None, rank).await;
    }
    // never served by the primary
    insert_media(&db, "img-broken", "image", Some(&primary_url("img-broken")), None, 100).await;

    let op: Arc<dyn BackupOperation> = Arc::new(operation(&db, &fetcher, &storage, HOUR));
    let driver = BatchBackupDriver::new(
        op,
        MediaCategory::Image,
        CategoryPolicy::new(10, 100, Duration::ZERO),
    );

    let first = driver.run().await;
    assert_eq!(first.total_backed_up, 25);
    assert_eq!(first.total_failed, 1);
    assert_eq!(first.stop_reason, StopReason::BacklogExhausted);
    assert_eq!(first.failed_items.len(), 1);
    assert_eq!(first.failed_items[0].id.as_deref(), Some("img-broken"));
    // 10, 10, 5 + 1 failed, then three empty
    assert_eq!(first.batches_executed, 6);
    assert_eq!(first.bytes_transferred, 25 * 9);
    assert_eq!(storage.uploads(), 25);

    let second = driver.run().await;
    assert_eq!(second.total_backed_up, 0);
    assert_eq!(second.total_failed, 0);
    assert_eq!(second.batches_executed, 3);
    assert_eq!(storage.uploads(), 25);
}

#[tokio::test]
async fn test_category_stats() {
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());

    fetcher.serve(&primary_url("vid-1"), b"0123456789");
    insert_media(&db, "vid-1", "video", Some(&primary_url("vid-1")), None, 0).await;
    insert_media(&db, "vid-2", "video", Some(&primary_url("vid-2")), None, 1).await;
    insert_media(&db, "vid-3", "video", None, None, 2).await;
    insert_media(&db, "img-1", "image", None, None, 0).await;

    operation(&db, &fetcher, &storage, HOUR)
        .backup_batch(MediaCategory::Video, 5)
        .await
        .unwrap();

    let stats = MediaRepository::new(db.clone())
        .category_stats(MediaCategory::Video)
        .await
        .unwrap();

    assert_eq!(stats.category, "regular");
    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.not_backed_up, 1);
    assert_eq!(stats.backed_up_bytes, 10);
}

#[tokio::test]
async fn test_blank_primary_url_is_never_selected() {
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());

    insert_media(&db, "img-blank", "image", Some("   "), None, 0).await;
    insert_media(&db, "img-empty", "image", Some(""), Some("failed"), 1).await;

    let op: Arc<dyn BackupOperation> = Arc::new(operation(&db, &fetcher, &storage, Duration::ZERO));
    let batch = op.backup_batch(MediaCategory::Image, 10).await.unwrap();
    assert!(batch.is_empty());

    let summary = BatchBackupDriver::new(
        op,
        MediaCategory::Image,
        CategoryPolicy::new(10, 20, Duration::ZERO),
    )
    .run()
    .await;

    assert_eq!(summary.stop_reason, StopReason::BacklogExhausted);
    assert_eq!(summary.batches_executed, 3);
    assert_eq!(summary.total_failed, 0);
    assert_eq!(status_of(&db, "img-blank").await, BackupStatus::None);
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_overlapping_runs_copy_each_object_once() {
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());
    fetcher.delay_ms.store(100, Ordering::SeqCst);

    fetcher.serve(&primary_url("img-1"), b"slow image");
    insert_media(&db, "img-1", "image", Some(&primary_url("img-1")), None, 0).await;

    // No cooldown: an in-flight pending object would be claimable again
    let op: Arc<dyn BackupOperation> = Arc::new(operation(&db, &fetcher, &storage, Duration::ZERO));
    let policy = CategoryPolicy::new(5, 10, Duration::ZERO);
    let first = BatchBackupDriver::new(op.clone(), MediaCategory::Image, policy.clone());
    let second = BatchBackupDriver::new(op.clone(), MediaCategory::Image, policy);

    let (a, b) = tokio::join!(first.run(), second.run());

    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(storage.uploads(), 1);
    assert_eq!(a.total_backed_up + b.total_backed_up, 1);
    assert_eq!(a.total_failed + b.total_failed, 0);
    assert_eq!(status_of(&db, "img-1").await, BackupStatus::Completed);
}

#[tokio::test]
async fn test_claim_error_fails_only_that_object() {
    let db = setup_test_db().await;
    let fetcher = Arc::new(MockFetcher::new());
    let storage = Arc::new(MockStorageService::new());

    fetcher.serve(&primary_url("img-1"), b"one");
    fetcher.serve(&primary_url("img-2"), b"two");
    insert_media(&db, "img-1", "image", Some(&primary_url("img-1")), None, 0).await;
    insert_media(&db, "img-2", "image", Some(&primary_url("img-2")), None, 1).await;

    db.execute_unprepared(
        "CREATE TRIGGER reject_claim BEFORE UPDATE OF backup_status ON media_objects \
         WHEN NEW.id = 'img-2' AND NEW.backup_status = 'pending' \
         BEGIN SELECT RAISE(ABORT, 'claim rejected'); END;",
    )
    .await
    .unwrap();

    let result = operation(&db, &fetcher, &storage, HOUR)
        .backup_batch(MediaCategory::Image, 10)
        .await
        .unwrap();

    assert_eq!(result.attempted, 2);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.details[1].id.as_deref(), Some("img-2"));
    assert!(result.details[1].error.as_deref().unwrap().contains("claim rejected"));
    assert_eq!(status_of(&db, "img-1").await, BackupStatus::Completed);
    assert_eq!(status_of(&db, "img-2").await, BackupStatus::None);
}
