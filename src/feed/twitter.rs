//! REST client for the timeline, likes and lookup endpoints.

use super::oauth::{self, OAuthNonce};
use super::wire::{self, WireErrors, WireProfile, WireStatus};
use super::{FeedKind, FeedSource, PageRequest};
use crate::config::{Credentials, FeedConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;
use crate::types::{FeedItem, PostId};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Header carrying the epoch second at which the rate-limit window resets
const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Wait used when a 429 response carries no reset header
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Public profile of an account
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    /// Numeric account id
    pub id: u64,
    /// Handle without `@`
    pub handle: String,
    /// Display name
    pub name: String,
    /// Number of posts
    pub posts: u64,
    /// Number of liked posts
    pub likes: u64,
    /// Whether the account is private
    pub protected: bool,
}

impl From<WireProfile> for Profile {
    fn from(p: WireProfile) -> Self {
        Self {
            id: p.id,
            handle: p.screen_name,
            name: p.name,
            posts: p.statuses_count,
            likes: p.favourites_count,
            protected: p.protected,
        }
    }
}

/// Signed HTTP client for the feed service
///
/// Rate limits are handled by waiting until the advertised reset time.
/// Network failures and 5xx responses are retried with the configured
/// backoff before surfacing as errors.
pub struct TwitterClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    max_rate_limit_waits: u32,
    retry: RetryConfig,
}

impl TwitterClient {
    /// Create a client for the configured endpoint
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(credentials: Credentials, feed: &FeedConfig, retry: &RetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(feed.request_timeout)
            .user_agent(concat!("tweetlikes-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: feed.api_base_url.trim_end_matches('/').to_string(),
            credentials,
            max_rate_limit_waits: feed.max_rate_limit_waits,
            retry: retry.clone(),
        })
    }

    /// Check the stored credentials and return the authenticated account
    pub async fn verify_credentials(&self) -> Result<Profile> {
        let profile: WireProfile = self
            .get_json("account/verify_credentials.json", Vec::new())
            .await?;
        Ok(profile.into())
    }

    /// Look up the public profile of `handle`
    pub async fn profile(&self, handle: &str) -> Result<Profile> {
        let query = vec![("screen_name".to_string(), handle.to_string())];
        let profile: WireProfile = self.get_json("users/show.json", query).await?;
        Ok(profile.into())
    }

    async fn get_json<T>(&self, endpoint: &str, query: Vec<(String, String)>) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        retry_with_backoff(&self.retry, || self.get_json_once(endpoint, &query)).await
    }

    async fn get_json_once<T>(&self, endpoint: &str, query: &[(String, String)]) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut waits = 0;

        loop {
            let header = oauth::authorization_header(
                &self.credentials,
                "GET",
                &url,
                query,
                &OAuthNonce::generate(),
            )?;

            tracing::debug!(endpoint, "Requesting");
            let response = self
                .http
                .get(&url)
                .query(query)
                .header(AUTHORIZATION, header)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if waits >= self.max_rate_limit_waits {
                    return Err(Error::RateLimited(format!(
                        "{endpoint}: quota still exhausted after {waits} waits"
                    )));
                }
                let wait = rate_limit_wait(response.headers());
                tracing::info!(
                    endpoint,
                    wait_secs = wait.as_secs(),
                    "Rate limit reached, waiting for reset"
                );
                tokio::time::sleep(wait).await;
                waits += 1;
                continue;
            }

            let body = response.bytes().await?;
            if status.is_success() {
                return Ok(serde_json::from_slice(&body)?);
            }

            let message = WireErrors::message_from_body(&String::from_utf8_lossy(&body));
            return Err(status_error(status, endpoint, message));
        }
    }
}

/// Map a non-success, non-429 status to an error
fn status_error(status: StatusCode, endpoint: &str, message: String) -> Error {
    match status.as_u16() {
        401 => Error::Unauthorized(message),
        404 => Error::NotFound(format!("{endpoint}: {message}")),
        code if code >= 500 => Error::Server {
            status: code,
            message,
        },
        code => Error::Api {
            status: code,
            message,
        },
    }
}

/// How long to wait after a 429 response
fn rate_limit_wait(headers: &HeaderMap) -> Duration {
    let reset = headers
        .get(RATE_LIMIT_RESET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok());

    match reset {
        Some(reset_at) => {
            let remaining = reset_at - chrono::Utc::now().timestamp();
            Duration::from_secs(remaining.max(0) as u64)
        }
        None => DEFAULT_RATE_LIMIT_WAIT,
    }
}

fn page_query(request: &PageRequest) -> Vec<(String, String)> {
    let mut query = vec![
        ("count".to_string(), request.count.to_string()),
        ("include_entities".to_string(), "true".to_string()),
        ("tweet_mode".to_string(), "extended".to_string()),
    ];
    if request.kind == FeedKind::Timeline {
        query.push(("include_rts".to_string(), request.include_reposts.to_string()));
    }
    if let Some(handle) = &request.subject {
        query.push(("screen_name".to_string(), handle.clone()));
    }
    if let Some(since_id) = request.since_id {
        query.push(("since_id".to_string(), since_id.to_string()));
    }
    if let Some(max_id) = request.max_id {
        query.push(("max_id".to_string(), max_id.to_string()));
    }
    query
}

#[async_trait::async_trait]
impl FeedSource for TwitterClient {
    async fn list_page(&self, request: &PageRequest) -> Result<Vec<FeedItem>> {
        let endpoint = match request.kind {
            FeedKind::Timeline => "statuses/user_timeline.json",
            FeedKind::Likes => "favorites/list.json",
        };
        let statuses: Vec<WireStatus> = self.get_json(endpoint, page_query(request)).await?;
        tracing::debug!(endpoint, received = statuses.len(), "Fetched page");
        Ok(wire::into_feed_items(statuses))
    }

    async fn lookup_bulk(&self, ids: &[PostId]) -> Result<Vec<FeedItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(PostId::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let query = vec![
            ("id".to_string(), joined),
            ("include_entities".to_string(), "true".to_string()),
            ("tweet_mode".to_string(), "extended".to_string()),
        ];
        let statuses: Vec<WireStatus> = self.get_json("statuses/lookup.json", query).await?;
        tracing::debug!(requested = ids.len(), returned = statuses.len(), "Bulk lookup");
        Ok(wire::into_feed_items(statuses))
    }
}
