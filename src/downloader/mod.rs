//! Media download engine.
//!
//! - [`template`] - destination templates and token substitution
//! - [`transfer`] - streamed single-file transfer into a partial file
//!
//! [`MediaDownloader`] combines both with the existing-file policy and bounded
//! retry, and runs many transfers through a bounded worker pool.

pub mod template;
pub mod transfer;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use template::DestinationTemplate;
pub use transfer::TransferError;

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::{IsRetryable, retry_with_backoff};
use crate::types::{DownloadOutcome, DownloadSummary, Event, MediaDescriptor, PostId};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Downloads media descriptors to templated destinations
pub struct MediaDownloader {
    http: reqwest::Client,
    output_dir: PathBuf,
    template: DestinationTemplate,
    ignore_existing: bool,
    concurrency: usize,
    idle_timeout: Duration,
    retry: RetryConfig,
}

impl MediaDownloader {
    /// Create a downloader from configuration
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the destination template is invalid, so
    /// that a bad template is reported before any network activity.
    pub fn new(config: &Config) -> Result<Self> {
        let template = DestinationTemplate::parse(&config.download.filename_template)?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.download.idle_timeout)
            .user_agent(concat!("tweetlikes-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            output_dir: config.download.output_dir.clone(),
            template,
            ignore_existing: config.download.ignore_existing,
            concurrency: config.download.max_concurrent_downloads.max(1),
            idle_timeout: config.download.idle_timeout,
            retry: config.retry.clone(),
        })
    }

    /// Absolute-or-relative destination path for a descriptor
    pub fn destination(&self, descriptor: &MediaDescriptor) -> PathBuf {
        self.output_dir.join(self.template.render(descriptor))
    }

    /// Download one media item
    ///
    /// Never fails as a whole: every problem is folded into the returned
    /// [`DownloadOutcome`].
    pub async fn download(&self, descriptor: &MediaDescriptor) -> DownloadOutcome {
        let path = self.destination(descriptor);

        if self.ignore_existing && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(post_id = %descriptor.id, path = %path.display(), "Already exists, skipping");
            return DownloadOutcome::SkippedExisting { path };
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create directory");
                return DownloadOutcome::SkippedPermanentError {
                    path,
                    reason: format!("could not create directory: {e}"),
                };
            }
        }

        let mut attempts: u32 = 0;
        let result = retry_with_backoff(&self.retry, || {
            attempts += 1;
            transfer::fetch_to_file(&self.http, &descriptor.url, &path, self.idle_timeout)
        })
        .await;

        match result {
            Ok(bytes) => {
                tracing::info!(
                    post_id = %descriptor.id,
                    path = %path.display(),
                    bytes,
                    attempts,
                    "Downloaded"
                );
                DownloadOutcome::Written {
                    path,
                    bytes,
                    attempts,
                }
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    post_id = %descriptor.id,
                    url = %descriptor.url,
                    attempts,
                    error = %e,
                    "Giving up after repeated failures"
                );
                DownloadOutcome::FailedAfterRetries {
                    path,
                    attempts,
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                tracing::warn!(
                    post_id = %descriptor.id,
                    url = %descriptor.url,
                    error = %e,
                    "Skipping media after permanent error"
                );
                DownloadOutcome::SkippedPermanentError {
                    path,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Download every descriptor through the bounded worker pool
    ///
    /// Descriptors rendering to an already-claimed destination are not
    /// transferred again; once the first copy finishes they share its fate
    /// (skipped-existing if it is on disk, its failure otherwise). Once
    /// `cancel` fires, transfers not yet started are counted as not attempted
    /// while running ones finish.
    pub async fn download_all(
        &self,
        descriptors: Vec<MediaDescriptor>,
        cancel: &CancellationToken,
        events: Option<&broadcast::Sender<Event>>,
    ) -> DownloadSummary {
        let mut summary = DownloadSummary::default();
        let mut finish = |id, outcome: DownloadOutcome| {
            summary.record(&outcome);
            if let Some(tx) = events {
                tx.send(Event::MediaFinished { id, outcome }).ok();
            }
        };

        let mut duplicates: HashMap<PathBuf, Vec<PostId>> = HashMap::new();
        let mut queue = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let path = self.destination(&descriptor);
            match duplicates.entry(path) {
                Entry::Vacant(slot) => {
                    queue.push((slot.key().clone(), descriptor));
                    slot.insert(Vec::new());
                }
                Entry::Occupied(mut slot) => {
                    tracing::debug!(post_id = %descriptor.id, path = %slot.key().display(), "Duplicate destination");
                    slot.get_mut().push(descriptor.id);
                }
            }
        }

        let mut results = stream::iter(queue)
            .map(|(path, descriptor)| async move {
                if cancel.is_cancelled() {
                    return (descriptor.id, path, None);
                }
                let outcome = self.download(&descriptor).await;
                (descriptor.id, path, Some(outcome))
            })
            .buffer_unordered(self.concurrency);

        let mut not_attempted = 0;
        while let Some((id, path, outcome)) = results.next().await {
            let followers = duplicates.remove(&path).unwrap_or_default();
            match outcome {
                Some(outcome) => {
                    let shared = duplicate_outcome(&outcome);
                    finish(id, outcome);
                    for follower in followers {
                        finish(follower, shared.clone());
                    }
                }
                None => not_attempted += 1 + followers.len(),
            }
        }
        summary.not_attempted += not_attempted;

        if summary.not_attempted > 0 {
            tracing::info!(not_attempted = summary.not_attempted, "Downloads cancelled");
        }
        summary
    }
}

/// Outcome reported for a descriptor sharing its destination with `first`
fn duplicate_outcome(first: &DownloadOutcome) -> DownloadOutcome {
    match first {
        DownloadOutcome::Written { path, .. } | DownloadOutcome::SkippedExisting { path } => {
            DownloadOutcome::SkippedExisting { path: path.clone() }
        }
        failed => failed.clone(),
    }
}
