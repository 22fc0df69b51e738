//! Test configuration helpers for local media servers and live credentials

use std::path::Path;
use std::time::Duration;
use tweetlikes_dl::{Config, Credentials, DownloadConfig, RetryConfig};

/// Config writing below `output_dir`, with retry delays short enough for tests
pub fn test_config(output_dir: &Path) -> Config {
    Config {
        download: DownloadConfig {
            output_dir: output_dir.to_path_buf(),
            max_concurrent_downloads: 3,
            ..DownloadConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Config::default()
    }
}

/// Load live API credentials from the environment (or a `.env` file)
///
/// Required environment variables:
/// - `TWEETLIKES_CONSUMER_KEY`
/// - `TWEETLIKES_CONSUMER_SECRET`
/// - `TWEETLIKES_ACCESS_TOKEN`
/// - `TWEETLIKES_ACCESS_TOKEN_SECRET`
pub fn load_live_credentials() -> Option<Credentials> {
    dotenvy::dotenv().ok();

    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    Some(Credentials {
        consumer_key: var("TWEETLIKES_CONSUMER_KEY")?,
        consumer_secret: var("TWEETLIKES_CONSUMER_SECRET")?,
        access_token: var("TWEETLIKES_ACCESS_TOKEN")?,
        access_token_secret: var("TWEETLIKES_ACCESS_TOKEN_SECRET")?,
    })
}
