//! # tweetlikes-dl
//!
//! Download the media attached to a bounded window of an account's timeline
//! or likes.
//!
//! A run walks the feed newest first, keeps the items inside an id, time and
//! count window, looks them up again in batches to get their full media, picks
//! the best encoding for videos and downloads every file to a templated path
//! with bounded retry.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tweetlikes_dl::{Config, Credentials, DownloadRequest, Pipeline, TwitterClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let credentials = Credentials::load(&Credentials::default_path()?)?;
//!     let client = TwitterClient::new(credentials, &config.feed, &config.retry)?;
//!
//!     let pipeline = Pipeline::new(Arc::new(client), config)?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let request = DownloadRequest::timeline(Some("rustlang".into()), 100);
//!     let summary = pipeline.run(&request, &CancellationToken::new()).await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Media download engine
pub mod downloader;
/// Error types
pub mod error;
/// Feed service abstraction and client
pub mod feed;
/// Batch metadata lookup
pub mod metadata;
/// Pagination and window filtering
pub mod pagination;
/// End-to-end orchestration
pub mod pipeline;
/// Media resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, Credentials, DownloadConfig, FeedConfig, RetryConfig};
pub use downloader::{DestinationTemplate, MediaDownloader};
pub use error::{Error, Result};
pub use feed::{FeedKind, FeedSource, PageRequest, Profile, TwitterClient};
pub use pagination::{ItemFilter, Window};
pub use pipeline::{DownloadRequest, Pipeline};
pub use types::{
    Author, DownloadOutcome, DownloadSummary, Event, FeedItem, MediaAttachment, MediaDescriptor,
    MediaKind, Post, PostId, VideoVariant,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when a termination signal arrives.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with a Ctrl+C fallback if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// The returned task runs until a signal is received; abort it to stop listening.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Cancelling run, letting in-flight transfers finish");
        token.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            // Without a working handler the run can only end on its own
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
