//! Configuration types for tweetlikes-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest page the timeline endpoints serve
pub const MAX_PAGE_SIZE: usize = 200;

/// Largest number of ids accepted by one bulk lookup
pub const MAX_LOOKUP_BATCH: usize = 100;

/// Download behavior configuration (destination, existing files, concurrency)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root directory all destinations are relative to (default: "output")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Destination template (default: "{username}/{id}-{filename}")
    #[serde(default = "default_filename_template")]
    pub filename_template: String,

    /// Skip media whose destination already exists (default: false, existing files are replaced)
    #[serde(default)]
    pub ignore_existing: bool,

    /// Maximum concurrent transfers (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Longest wait for a connection, the response headers or the next body
    /// chunk (default: 60 seconds). Transfers have no overall deadline.
    #[serde(default = "default_idle_timeout", with = "duration_serde")]
    pub idle_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            filename_template: default_filename_template(),
            ignore_existing: false,
            max_concurrent_downloads: default_max_concurrent(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

/// Feed service configuration (endpoint, paging, rate limits)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the REST API (default: "https://api.twitter.com/1.1")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Items requested per page (default: 200, clamped to 1..=200)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Ids per bulk lookup (default: 100, clamped to 1..=100)
    #[serde(default = "default_lookup_batch_size")]
    pub lookup_batch_size: usize,

    /// How many consecutive rate-limit waits a single call may perform (default: 15)
    #[serde(default = "default_max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,

    /// Timeout for a single API request (default: 30 seconds)
    #[serde(default = "default_api_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            page_size: default_page_size(),
            lookup_batch_size: default_lookup_batch_size(),
            max_rate_limit_waits: default_max_rate_limit_waits(),
            request_timeout: default_api_timeout(),
        }
    }
}

impl FeedConfig {
    /// Page size clamped to what the service accepts
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Bulk lookup batch size clamped to what the service accepts
    pub fn effective_lookup_batch_size(&self) -> usize {
        self.lookup_batch_size.clamp(1, MAX_LOOKUP_BATCH)
    }
}

/// Retry configuration for transient API and transfer failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per media item, including the first (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration
///
/// Sub-configs are nested in serialized form:
/// - [`download`](DownloadConfig) - destination and transfer settings
/// - [`feed`](FeedConfig) - API endpoint, paging, rate limits
/// - [`retry`](RetryConfig) - retry policy for API calls and transfers
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Feed service settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// Retry settings for API calls and media transfers
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Check settings that would otherwise fail mid-run
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::config(
                "max_concurrent_downloads",
                "must be at least 1",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("max_attempts", "must be at least 1"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier",
                "must be greater than or equal to 1.0",
            ));
        }
        url::Url::parse(&self.feed.api_base_url)
            .map_err(|e| Error::config("api_base_url", format!("invalid URL: {e}")))?;
        Ok(())
    }
}

/// Application and user credentials for the feed service
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Application (consumer) key
    pub consumer_key: String,
    /// Application (consumer) secret
    pub consumer_secret: String,
    /// User access token
    pub access_token: String,
    /// User access token secret
    pub access_token_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Default location: `<user config dir>/tweetlikes-dl/credentials.json`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("tweetlikes-dl").join("credentials.json"))
            .ok_or_else(|| Error::Other("could not determine the user config directory".into()))
    }

    /// Load credentials, failing with [`Error::CredentialsMissing`] if the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CredentialsMissing(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist credentials, creating the parent directory if needed
    ///
    /// On Unix the file is readable by its owner only.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;

        // `mode` only applies on creation; tighten a pre-existing file before writing secrets
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(content.as_bytes())?;

        tracing::debug!(path = %path.display(), "Saved credentials");
        Ok(())
    }
}

// Default value functions
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_filename_template() -> String {
    "{username}/{id}-{filename}".to_string()
}

fn default_max_concurrent() -> usize {
    4
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_api_base_url() -> String {
    "https://api.twitter.com/1.1".to_string()
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_lookup_batch_size() -> usize {
    MAX_LOOKUP_BATCH
}

fn default_max_rate_limit_waits() -> u32 {
    15
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
