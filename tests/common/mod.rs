#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use media_backup::entities::media_objects;
use media_backup::infrastructure::database;
use media_backup::services::source_fetcher::{FetchedObject, SourceFetcher};
use media_backup::services::storage::{FileMetadata, StorageService};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("media_backup=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

pub async fn setup_test_db() -> DatabaseConnection {
    // One connection, so every query sees the same in-memory database
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

pub async fn insert_media(
    db: &DatabaseConnection,
    id: &str,
    category: &str,
    primary_url: Option<&str>,
    backup_status: Option<&str>,
    age_rank: i64,
) -> media_objects::Model {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    media_objects::ActiveModel {
        id: Set(id.to_string()),
        category: Set(category.to_string()),
        file_name: Set(format!("{}.bin", id)),
        primary_url: Set(primary_url.map(str::to_string)),
        backup_status: Set(backup_status.map(str::to_string)),
        created_at: Set(Some(base + ChronoDuration::seconds(age_rank))),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub fn primary_url(id: &str) -> String {
    format!("https://primary.test/{}", id)
}

/// In-memory backup provider.
pub struct MockStorageService {
    pub files: Mutex<HashMap<String, Bytes>>,
    pub uploads: AtomicU32,
    pub fail_uploads: AtomicBool,
    /// Stores one byte less than uploaded, to exercise verification.
    pub truncate_uploads: AtomicBool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            uploads: AtomicU32::new(0),
            fail_uploads: AtomicBool::new(false),
            truncate_uploads: AtomicBool::new(false),
        }
    }

    pub fn uploads(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        _content_type: Option<&str>,
    ) -> anyhow::Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("SlowDown: rate limit exceeded"));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let stored = if self.truncate_uploads.load(Ordering::SeqCst) {
            data.slice(..data.len().saturating_sub(1))
        } else {
            data
        };
        self.files.lock().unwrap().insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> anyhow::Result<()> {
        self.files.lock().unwrap().remove(key);
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(key))
    }

    async fn get_object_metadata(&self, key: &str) -> anyhow::Result<FileMetadata> {
        let files = self.files.lock().unwrap();
        let data = files
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("Key not found"))?;
        Ok(FileMetadata {
            size: data.len() as i64,
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://backup.test/{}", key)
    }
}

/// Primary provider serving a fixed set of objects.
pub struct MockFetcher {
    pub objects: Mutex<HashMap<String, Bytes>>,
    pub fetches: AtomicU32,
    /// Per-fetch latency in milliseconds.
    pub delay_ms: AtomicU64,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fetches: AtomicU32::new(0),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn serve(&self, url: &str, data: &'static [u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::from_static(data));
    }
}

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<FetchedObject> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Primary returned status 404 Not Found"))?;
        Ok(FetchedObject {
            data,
            content_type: Some("application/octet-stream".to_string()),
        })
    }
}
