use crate::models::MediaCategory;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Batch policy for one media category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPolicy {
    /// Objects requested per BackupOperation call
    pub batch_size: u32,

    /// Upper bound on calls per run
    pub max_batches: u32,

    /// Pause between two consecutive calls
    pub inter_batch_delay: Duration,

    /// Back-to-back empty batches that end a run
    pub consecutive_empty_threshold: u32,

    /// Typical object size, used for capacity estimates
    pub average_object_bytes: u64,
}

impl CategoryPolicy {
    pub fn new(batch_size: u32, max_batches: u32, inter_batch_delay: Duration) -> Self {
        Self {
            batch_size,
            max_batches,
            inter_batch_delay,
            consecutive_empty_threshold: DEFAULT_EMPTY_THRESHOLD,
            average_object_bytes: 0,
        }
    }

    pub fn with_empty_threshold(mut self, threshold: u32) -> Self {
        self.consecutive_empty_threshold = threshold;
        self
    }

    pub fn with_average_object_bytes(mut self, bytes: u64) -> Self {
        self.average_object_bytes = bytes;
        self
    }

    fn from_env(prefix: &str, default: CategoryPolicy, empty_threshold: u32) -> Self {
        Self {
            batch_size: env_parse(&format!("{}_BATCH_SIZE", prefix), default.batch_size).max(1),
            max_batches: env_parse(&format!("{}_MAX_BATCHES", prefix), default.max_batches),
            inter_batch_delay: Duration::from_millis(env_parse(
                &format!("{}_DELAY_MS", prefix),
                default.inter_batch_delay.as_millis() as u64,
            )),
            consecutive_empty_threshold: empty_threshold.max(1),
            average_object_bytes: env_parse(
                &format!("{}_AVG_BYTES", prefix),
                default.average_object_bytes,
            ),
        }
    }
}

pub const DEFAULT_EMPTY_THRESHOLD: u32 = 3;

const MB: u64 = 1024 * 1024;

/// Configuration of the backup pipeline and the URL resolver
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub image: CategoryPolicy,
    pub video: CategoryPolicy,
    pub upscaled_video: CategoryPolicy,

    /// Time a `failed` object waits before it becomes eligible again (default: 1 hour)
    pub retry_cooldown: Duration,

    /// Interval between scheduled worker runs (default: 1 hour)
    pub schedule_interval: Duration,

    /// Timeout of a single reachability probe (default: 3 s)
    pub probe_timeout: Duration,

    /// Timeout of a source download during a copy (default: 5 min)
    pub download_timeout: Duration,

    /// Remote backup endpoint; the in-process operation is used when unset
    pub operation_url: Option<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            image: CategoryPolicy::new(10, 100, Duration::from_secs(2))
                .with_average_object_bytes(2 * MB),
            video: CategoryPolicy::new(5, 60, Duration::from_secs(5))
                .with_average_object_bytes(25 * MB),
            upscaled_video: CategoryPolicy::new(2, 40, Duration::from_secs(10))
                .with_average_object_bytes(120 * MB),
            retry_cooldown: Duration::from_secs(3600),
            schedule_interval: Duration::from_secs(3600),
            probe_timeout: Duration::from_secs(3),
            download_timeout: Duration::from_secs(300),
            operation_url: None,
        }
    }
}

impl BackupConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();
        let threshold = env_parse("BACKUP_EMPTY_THRESHOLD", DEFAULT_EMPTY_THRESHOLD);

        Self {
            image: CategoryPolicy::from_env("BACKUP_IMAGE", default.image, threshold),
            video: CategoryPolicy::from_env("BACKUP_VIDEO", default.video, threshold),
            upscaled_video: CategoryPolicy::from_env(
                "BACKUP_UPSCALE",
                default.upscaled_video,
                threshold,
            ),
            retry_cooldown: Duration::from_secs(env_parse(
                "BACKUP_RETRY_COOLDOWN_SECS",
                default.retry_cooldown.as_secs(),
            )),
            schedule_interval: Duration::from_secs(env_parse(
                "BACKUP_SCHEDULE_SECS",
                default.schedule_interval.as_secs(),
            )),
            probe_timeout: Duration::from_millis(env_parse(
                "RESOLVER_PROBE_TIMEOUT_MS",
                default.probe_timeout.as_millis() as u64,
            )),
            download_timeout: Duration::from_secs(env_parse(
                "BACKUP_DOWNLOAD_TIMEOUT_SECS",
                default.download_timeout.as_secs(),
            )),
            operation_url: env::var("BACKUP_OPERATION_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }

    /// Create config for development (no inter-batch pauses, quick retries)
    pub fn development() -> Self {
        let mut config = Self::default();
        for category in MediaCategory::ALL {
            config.policy_mut(category).inter_batch_delay = Duration::ZERO;
        }
        config.retry_cooldown = Duration::ZERO;
        config.schedule_interval = Duration::from_secs(60);
        config
    }

    /// Create config for production (conservative pacing toward the backup provider)
    pub fn production() -> Self {
        let mut config = Self::default();
        config.image.inter_batch_delay = Duration::from_secs(3);
        config.video.inter_batch_delay = Duration::from_secs(8);
        config.upscaled_video.inter_batch_delay = Duration::from_secs(15);
        config.retry_cooldown = Duration::from_secs(6 * 3600);
        config
    }

    pub fn policy(&self, category: MediaCategory) -> &CategoryPolicy {
        match category {
            MediaCategory::Image => &self.image,
            MediaCategory::Video => &self.video,
            MediaCategory::UpscaledVideo => &self.upscaled_video,
        }
    }

    pub fn policy_mut(&mut self, category: MediaCategory) -> &mut CategoryPolicy {
        match category {
            MediaCategory::Image => &mut self.image,
            MediaCategory::Video => &mut self.video,
            MediaCategory::UpscaledVideo => &mut self.upscaled_video,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
