use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

pub struct FetchedObject {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// Downloads an object from the primary storage provider.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedObject>;
}

pub struct HttpSourceFetcher {
    client: reqwest::Client,
}

impl HttpSourceFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build download client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedObject> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("Download from primary failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Primary returned status {}", status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let data = response
            .bytes()
            .await
            .map_err(|e| anyhow!("Reading primary body failed: {}", e))?;

        if data.is_empty() {
            return Err(anyhow!("Primary returned an empty body"));
        }

        Ok(FetchedObject { data, content_type })
    }
}
