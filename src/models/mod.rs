use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Class of generated media. Serialized with the names the backup
/// endpoint speaks (`image`, `regular`, `upscale`); stored in the database
/// as `image`, `video`, `upscaled_video`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum MediaCategory {
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "regular")]
    Video,
    #[serde(rename = "upscale")]
    UpscaledVideo,
}

impl MediaCategory {
    pub const ALL: [MediaCategory; 3] = [
        MediaCategory::Image,
        MediaCategory::Video,
        MediaCategory::UpscaledVideo,
    ];

    pub fn as_wire(&self) -> &'static str {
        match self {
            MediaCategory::Image => "image",
            MediaCategory::Video => "regular",
            MediaCategory::UpscaledVideo => "upscale",
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            MediaCategory::Image => "image",
            MediaCategory::Video => "video",
            MediaCategory::UpscaledVideo => "upscaled_video",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaCategory::Image),
            "video" => Some(MediaCategory::Video),
            "upscaled_video" => Some(MediaCategory::UpscaledVideo),
            _ => None,
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for MediaCategory {
    type Err = anyhow::Error;

    /// Accepts both the wire names and the stored names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" => Ok(MediaCategory::Image),
            "regular" | "video" => Ok(MediaCategory::Video),
            "upscale" | "upscaled_video" => Ok(MediaCategory::UpscaledVideo),
            other => Err(anyhow::anyhow!("Unknown media category: {}", other)),
        }
    }
}

/// Backup lifecycle of a single media object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    None,
    Pending,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::None => "none",
            BackupStatus::Pending => "pending",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }

    /// Absent and unknown values are both treated as `None`.
    pub fn from_db(value: Option<&str>) -> Self {
        match value {
            Some("pending") => BackupStatus::Pending,
            Some("completed") => BackupStatus::Completed,
            Some("failed") => BackupStatus::Failed,
            _ => BackupStatus::None,
        }
    }
}

/// Outcome of one object inside a backup batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupItemDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub file_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_file_size: Option<i64>,
}

impl BackupItemDetail {
    pub fn succeeded(id: &str, file_name: &str, size: i64) -> Self {
        Self {
            id: Some(id.to_string()),
            file_name: file_name.to_string(),
            success: true,
            error: None,
            actual_file_size: Some(size),
        }
    }

    pub fn failed(id: &str, file_name: &str, error: impl Into<String>) -> Self {
        Self {
            id: Some(id.to_string()),
            file_name: file_name.to_string(),
            success: false,
            error: Some(error.into()),
            actual_file_size: None,
        }
    }
}

/// Result of a single BackupOperation invocation. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchRunResult {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub details: Vec<BackupItemDetail>,
}

impl BatchRunResult {
    pub fn from_details(details: Vec<BackupItemDetail>) -> Self {
        let succeeded = details.iter().filter(|d| d.success).count() as u32;
        let failed = details.len() as u32 - succeeded;
        Self {
            attempted: details.len() as u32,
            succeeded,
            failed,
            details,
        }
    }

    /// No eligible objects were found.
    pub fn is_empty(&self) -> bool {
        self.succeeded == 0 && self.failed == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BackupRequest {
    pub category: MediaCategory,
    pub limit: u32,
}

/// Response body of the backup endpoint. Field names are fixed by the
/// record-keeping reports that consume it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BackupResponse {
    pub success: bool,
    pub backed_up: u32,
    pub failed: u32,
    #[serde(default)]
    pub details: Vec<BackupItemDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackupResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            backed_up: 0,
            failed: 0,
            details: Vec::new(),
            error: Some(error.into()),
        }
    }
}

impl From<BatchRunResult> for BackupResponse {
    fn from(result: BatchRunResult) -> Self {
        Self {
            success: true,
            backed_up: result.succeeded,
            failed: result.failed,
            details: result.details,
            error: None,
        }
    }
}

impl TryFrom<BackupResponse> for BatchRunResult {
    type Error = anyhow::Error;

    fn try_from(response: BackupResponse) -> Result<Self, Self::Error> {
        if !response.success {
            return Err(anyhow::anyhow!(
                "Backup operation reported failure: {}",
                response.error.as_deref().unwrap_or("no error message")
            ));
        }
        Ok(Self {
            attempted: response.backed_up.saturating_add(response.failed),
            succeeded: response.backed_up,
            failed: response.failed,
            details: response.details,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    BacklogExhausted,
    MaxBatchesReached,
    Cancelled,
}

/// Operator-facing report of one driver run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub category: MediaCategory,
    pub total_backed_up: u64,
    pub total_failed: u64,
    pub batches_executed: u32,
    pub stop_reason: StopReason,
    pub failed_items: Vec<BackupItemDetail>,
    /// Sum of the sizes reported for successfully copied objects.
    pub bytes_transferred: u64,
    /// Backed-up count times the category's average object size.
    pub estimated_bytes: u64,
    pub capacity: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UrlSource {
    Primary,
    Backup,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    PrimaryUnreachable,
    BackupUnreachable,
    NeitherConfigured,
    BothFailed,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::PrimaryUnreachable => "primary_unreachable",
            UnavailableReason::BackupUnreachable => "backup_unreachable",
            UnavailableReason::NeitherConfigured => "neither_configured",
            UnavailableReason::BothFailed => "both_failed",
        }
    }
}

/// The serving location picked for a media object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedUrl {
    pub url: Option<String>,
    pub source: UrlSource,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set on unavailability, and on a backup hit caused by a failed primary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnavailableReason>,
}

impl ResolvedUrl {
    pub fn primary(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            source: UrlSource::Primary,
            available: true,
            error: None,
            reason: None,
        }
    }

    pub fn backup(url: &str, primary_error: Option<String>) -> Self {
        let reason = primary_error
            .as_ref()
            .map(|_| UnavailableReason::PrimaryUnreachable);
        Self {
            url: Some(url.to_string()),
            source: UrlSource::Backup,
            available: true,
            error: primary_error,
            reason,
        }
    }

    pub fn unavailable(reason: UnavailableReason, error: String) -> Self {
        Self {
            url: None,
            source: UrlSource::None,
            available: false,
            error: Some(error),
            reason: Some(reason),
        }
    }
}

/// Backup progress of one category, for capacity reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub category: String,
    pub total: u64,
    pub not_backed_up: u64,
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub backed_up_bytes: u64,
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
