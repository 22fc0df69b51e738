//! End-to-end run: paginate, look up media, download

use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::{Error, Result};
use crate::feed::{FeedKind, FeedSource, PageRequest};
use crate::metadata;
use crate::pagination::{ItemFilter, Window, paginate};
use crate::types::{DownloadSummary, Event, PostId};
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// What to download in one run
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// Account handle; `None` means the authenticated account
    pub subject: Option<String>,
    /// Timeline or likes
    pub kind: FeedKind,
    /// Id, time and count bounds
    pub window: Window,
    /// Emit reposts alongside original posts
    pub include_reposts: bool,
    /// Emit reposts only (implies `include_reposts`)
    pub reposts_only: bool,
}

impl DownloadRequest {
    /// Timeline of `subject` with only a count limit
    pub fn timeline(subject: Option<String>, limit: usize) -> Self {
        Self {
            subject,
            kind: FeedKind::Timeline,
            window: Window::with_limit(limit),
            include_reposts: false,
            reposts_only: false,
        }
    }

    fn filter(&self) -> ItemFilter {
        if self.reposts_only {
            ItemFilter::reposts_only()
        } else {
            ItemFilter::new(self.include_reposts)
        }
    }
}

/// Orchestrates a bounded download run against a feed
///
/// Progress is published as [`Event`]s; see [`Pipeline::subscribe`].
pub struct Pipeline {
    source: Arc<dyn FeedSource>,
    downloader: MediaDownloader,
    config: Config,
    event_tx: broadcast::Sender<Event>,
}

impl Pipeline {
    /// Create a pipeline
    ///
    /// # Errors
    /// Returns [`Error::Config`] for invalid settings, including a bad
    /// destination template.
    pub fn new(source: Arc<dyn FeedSource>, config: Config) -> Result<Self> {
        config.validate()?;
        let downloader = MediaDownloader::new(&config)?;
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            source,
            downloader,
            config,
            event_tx,
        })
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The downloader used for transfers
    pub fn downloader(&self) -> &MediaDownloader {
        &self.downloader
    }

    /// Walk the feed and return the ids of every item inside the window
    pub async fn collect_ids(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<PostId>> {
        let base = PageRequest {
            subject: request.subject.clone(),
            kind: request.kind,
            since_id: None,
            max_id: None,
            count: self.config.feed.effective_page_size(),
            include_reposts: request.include_reposts || request.reposts_only,
        };

        paginate(
            self.source.as_ref(),
            base,
            request.window,
            request.filter(),
            cancel.clone(),
            Some(self.event_tx.clone()),
        )
        .map_ok(|item| item.id())
        .try_collect()
        .await
    }

    /// Run the whole pipeline
    ///
    /// Fails before any request on a contradictory window. Authorization,
    /// not-found and server errors from the feed abort the run; per-media
    /// failures are only counted in the returned summary. Cancellation during
    /// paging or lookup yields [`Error::Cancelled`]; during downloads it
    /// leaves the remaining items not attempted.
    pub async fn run(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadSummary> {
        if request.window.is_contradictory() {
            return Err(Error::config(
                "window",
                "lower bound lies after upper bound; no item can match",
            ));
        }

        tracing::info!(
            subject = request.subject.as_deref().unwrap_or("<self>"),
            kind = ?request.kind,
            limit = request.window.limit,
            "Collecting feed items"
        );
        let ids = self.collect_ids(request, cancel).await?;
        self.event_tx
            .send(Event::ItemsCollected { count: ids.len() })
            .ok();

        let media = metadata::fetch_media(
            self.source.as_ref(),
            &ids,
            self.config.feed.effective_lookup_batch_size(),
            cancel,
        )
        .await?;
        tracing::info!(items = ids.len(), media = media.len(), "Resolved media");
        self.event_tx
            .send(Event::MediaResolved { count: media.len() })
            .ok();

        let summary = self
            .downloader
            .download_all(media, cancel, Some(&self.event_tx))
            .await;

        tracing::info!(%summary, "Run finished");
        self.event_tx.send(Event::Finished { summary }).ok();
        Ok(summary)
    }
}
