use crate::entities::media_objects;
use crate::models::{ResolvedUrl, UnavailableReason};
use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProbeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Request(String),

    #[error("status {0}")]
    Status(u16),
}

/// Cheap reachability check against a URL. Must not download the payload.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), ProbeError>;
}

/// HEAD probe with a bounded timeout. Providers that reject HEAD get a
/// single-byte ranged GET instead.
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build probe client: {}", e))?;
        Ok(Self { client, timeout })
    }

    fn map_error(&self, e: reqwest::Error) -> ProbeError {
        if e.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else {
            ProbeError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;

        let response = self
            .client
            .head(parsed.clone())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = match response.status() {
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => self
                .client
                .get(parsed)
                .header(reqwest::header::RANGE, "bytes=0-0")
                .send()
                .await
                .map_err(|e| self.map_error(e))?
                .status(),
            status => status,
        };

        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("neither a primary nor a backup URL is configured")]
    NeitherConfigured,
}

impl From<ResolveError> for ResolvedUrl {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NeitherConfigured => ResolvedUrl::unavailable(
                UnavailableReason::NeitherConfigured,
                "primary: not configured; backup: not configured".to_string(),
            ),
        }
    }
}

/// Picks the location a client should fetch a media object from right now.
/// The primary is always preferred; the backup is probed only when the
/// primary is missing or unreachable.
pub struct UrlResolver {
    prober: Arc<dyn Prober>,
}

impl UrlResolver {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self { prober }
    }

    pub async fn resolve(
        &self,
        primary_url: Option<&str>,
        backup_url: Option<&str>,
    ) -> Result<ResolvedUrl, ResolveError> {
        let primary_url = configured(primary_url);
        let backup_url = configured(backup_url);

        if primary_url.is_none() && backup_url.is_none() {
            return Err(ResolveError::NeitherConfigured);
        }

        let mut primary_error = None;
        if let Some(url) = primary_url {
            match self.prober.probe(url).await {
                Ok(()) => return Ok(ResolvedUrl::primary(url)),
                Err(e) => {
                    tracing::warn!("Primary probe failed for {}: {}", url, e);
                    primary_error = Some(format!("primary: {}", e));
                }
            }
        }

        let Some(url) = backup_url else {
            let primary_error = primary_error.unwrap_or_default();
            return Ok(ResolvedUrl::unavailable(
                UnavailableReason::PrimaryUnreachable,
                format!("{}; backup: not configured", primary_error),
            ));
        };

        match self.prober.probe(url).await {
            Ok(()) => {
                if primary_error.is_some() {
                    tracing::info!("Serving backup location {}", url);
                }
                Ok(ResolvedUrl::backup(url, primary_error))
            }
            Err(e) => {
                tracing::warn!("Backup probe failed for {}: {}", url, e);
                let resolved = match primary_error {
                    Some(primary_error) => ResolvedUrl::unavailable(
                        UnavailableReason::BothFailed,
                        format!("{}; backup: {}", primary_error, e),
                    ),
                    None => ResolvedUrl::unavailable(
                        UnavailableReason::BackupUnreachable,
                        format!("primary: not configured; backup: {}", e),
                    ),
                };
                Ok(resolved)
            }
        }
    }

    pub async fn resolve_media(
        &self,
        media: &media_objects::Model,
    ) -> Result<ResolvedUrl, ResolveError> {
        self.resolve(media.primary_url.as_deref(), media.backup_url.as_deref())
            .await
    }
}

fn configured(url: Option<&str>) -> Option<&str> {
    url.map(str::trim).filter(|u| !u.is_empty())
}
