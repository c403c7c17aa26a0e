use crate::services::storage::S3StorageService;
use anyhow::Context;
use aws_sdk_s3::config::Region;
use std::env;
use std::sync::Arc;
use tracing::info;

/// Connects to the S3-compatible backup provider.
pub async fn setup_storage() -> anyhow::Result<Arc<S3StorageService>> {
    let endpoint_url = env::var("BACKUP_S3_ENDPOINT").context("BACKUP_S3_ENDPOINT must be set")?;
    let access_key =
        env::var("BACKUP_S3_ACCESS_KEY").context("BACKUP_S3_ACCESS_KEY must be set")?;
    let secret_key =
        env::var("BACKUP_S3_SECRET_KEY").context("BACKUP_S3_SECRET_KEY must be set")?;
    let bucket = env::var("BACKUP_S3_BUCKET").context("BACKUP_S3_BUCKET must be set")?;
    let region = env::var("BACKUP_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let public_base_url = env::var("BACKUP_PUBLIC_BASE_URL").unwrap_or_else(|_| {
        format!("{}/{}", endpoint_url.trim_end_matches('/'), bucket)
    });

    info!("☁️  Backup storage: {} (Bucket: {})", endpoint_url, bucket);

    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new(region))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(&bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", bucket);
            if let Err(e) = s3_client.create_bucket().bucket(&bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", bucket);
            }
        }
    }

    Ok(Arc::new(S3StorageService::new(
        s3_client,
        bucket,
        public_base_url,
    )))
}
